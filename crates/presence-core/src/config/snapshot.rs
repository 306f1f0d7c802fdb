//! Configuration snapshot decoding and file-backed loading

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not a valid relaxed-JSON object
    #[error("configuration parse error: {0}")]
    Parse(#[from] json5::Error),

    /// A non-empty mapping is missing a field every snapshot needs
    #[error("configuration is missing required field `{field}`")]
    MissingField { field: &'static str },
}

/// An immutable configuration value, replaced wholesale on every reload.
///
/// Either the whole snapshot is absent or both `application_id` and `name`
/// are populated; [`parse_snapshot`] is the only constructor that reads
/// user input and it enforces that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSnapshot {
    pub application_id: String,
    pub name: String,
    pub details: Option<String>,
    pub state: Option<String>,
    pub large_image_key: Option<String>,
    pub large_image_text: Option<String>,
    pub small_image_key: Option<String>,
    pub small_image_text: Option<String>,
    /// Opaque activity type code, passed through untouched.
    pub activity_type: Option<i64>,
    /// Reset the elapsed-time anchor whenever the file is reloaded.
    pub refresh_time_on_reload: bool,
    /// Absolute start timestamp override (epoch seconds).
    pub manual_timestamp: Option<i64>,
    /// "Active for N seconds" override, re-evaluated at every publish.
    pub manual_duration_seconds: Option<i64>,
}

impl ConfigurationSnapshot {
    /// Minimal snapshot with only the required fields set.
    pub fn new(application_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            name: name.into(),
            details: None,
            state: None,
            large_image_key: None,
            large_image_text: None,
            small_image_key: None,
            small_image_text: None,
            activity_type: None,
            refresh_time_on_reload: true,
            manual_timestamp: None,
            manual_duration_seconds: None,
        }
    }
}

/// On-disk shape. Every field is optional so an empty mapping is
/// distinguishable from an incomplete one.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    application_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    large_image_key: Option<String>,
    #[serde(default)]
    large_image_text: Option<String>,
    #[serde(default)]
    small_image_key: Option<String>,
    #[serde(default)]
    small_image_text: Option<String>,
    #[serde(default, alias = "type")]
    activity_type: Option<i64>,
    #[serde(default, alias = "refreshTime")]
    refresh_time_on_reload: Option<bool>,
    #[serde(default, alias = "manualTime")]
    manual_timestamp: Option<i64>,
    #[serde(default, alias = "manualDuration")]
    manual_duration_seconds: Option<i64>,
}

impl RawConfig {
    fn is_empty(&self) -> bool {
        self.application_id.is_none()
            && self.name.is_none()
            && self.details.is_none()
            && self.state.is_none()
            && self.large_image_key.is_none()
            && self.large_image_text.is_none()
            && self.small_image_key.is_none()
            && self.small_image_text.is_none()
            && self.activity_type.is_none()
            && self.refresh_time_on_reload.is_none()
            && self.manual_timestamp.is_none()
            && self.manual_duration_seconds.is_none()
    }

    fn into_snapshot(self) -> Result<ConfigurationSnapshot, ConfigError> {
        let application_id = self
            .application_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingField {
                field: "applicationId",
            })?;
        let name = self
            .name
            .ok_or(ConfigError::MissingField { field: "name" })?;

        Ok(ConfigurationSnapshot {
            application_id,
            name,
            details: self.details,
            state: self.state,
            large_image_key: self.large_image_key,
            large_image_text: self.large_image_text,
            small_image_key: self.small_image_key,
            small_image_text: self.small_image_text,
            activity_type: self.activity_type,
            refresh_time_on_reload: self.refresh_time_on_reload.unwrap_or(true),
            manual_timestamp: self.manual_timestamp,
            manual_duration_seconds: self.manual_duration_seconds,
        })
    }
}

/// Decode configuration text.
///
/// Returns `Ok(None)` for blank text or an empty mapping. A mapping that has
/// content but lacks `applicationId` or `name` is an error.
pub fn parse_snapshot(text: &str) -> Result<Option<ConfigurationSnapshot>, ConfigError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let raw: RawConfig = json5::from_str(text)?;
    if raw.is_empty() {
        return Ok(None);
    }

    raw.into_snapshot().map(Some)
}

/// Anything the state machine can load a snapshot from.
pub trait SnapshotSource: Send {
    /// Load the current snapshot, surfacing every failure.
    fn try_load(&self) -> Result<Option<ConfigurationSnapshot>, ConfigError>;

    /// Human-readable origin for log lines.
    fn describe(&self) -> String;

    /// Load the current snapshot; failures are logged and read as absence.
    fn load(&self) -> Option<ConfigurationSnapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load configuration from {}: {}", self.describe(), e);
                None
            }
        }
    }
}

/// Configuration backed by a file on disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for ConfigFile {
    fn try_load(&self) -> Result<Option<ConfigurationSnapshot>, ConfigError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("Read {} bytes from {}", contents.len(), self.path.display());
        parse_snapshot(&contents)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
