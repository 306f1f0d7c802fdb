//! Configuration path discovery

use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "PRESENCE_CONFIG";

/// File name looked up in the deployment and working directories.
pub const CONFIG_FILE_NAME: &str = "config.jsonc";

/// Resolve the configuration file path.
///
/// Priority (highest to lowest):
/// 1. `explicit` (the `--config` flag)
/// 2. `PRESENCE_CONFIG` environment variable, if non-empty
/// 3. `config.jsonc` in the parent of the executable's directory
/// 4. `config.jsonc` in `current_dir`
///
/// Candidates 3 and 4 are picked by existence. When neither exists the
/// deployment path is returned so that the startup error names it.
pub fn resolve_config_path(explicit: Option<&Path>, current_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(value) = std::env::var(CONFIG_ENV)
        && !value.trim().is_empty()
    {
        return PathBuf::from(value);
    }

    let local = current_dir.join(CONFIG_FILE_NAME);
    match deployment_config_path() {
        Some(deployed) if deployed.exists() => deployed,
        Some(_) if local.exists() => local,
        Some(deployed) => deployed,
        None => local,
    }
}

/// `<exe dir>/../config.jsonc`, falling back to `<exe dir>` for a bare binary
/// at the filesystem root.
fn deployment_config_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe_dir = exe.parent()?;
    let base = exe_dir.parent().unwrap_or(exe_dir);
    Some(base.join(CONFIG_FILE_NAME))
}
