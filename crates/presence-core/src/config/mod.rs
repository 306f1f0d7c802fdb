//! Configuration loading
//!
//! The configuration file is a relaxed JSON object (comments and trailing
//! commas allowed). It is read whole on every load and decoded into an
//! immutable [`ConfigurationSnapshot`], or into nothing at all when the file
//! holds no mapping.
//!
//! Path resolution priority:
//! 1. Command-line flag (passed as a parameter)
//! 2. `PRESENCE_CONFIG` environment variable
//! 3. `config.jsonc` next to the deployment (`<exe dir>/../config.jsonc`)
//! 4. `config.jsonc` in the current directory

mod discovery;
mod snapshot;

pub use discovery::{CONFIG_ENV, CONFIG_FILE_NAME, resolve_config_path};
pub use snapshot::{ConfigError, ConfigFile, ConfigurationSnapshot, SnapshotSource, parse_snapshot};
