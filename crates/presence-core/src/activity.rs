//! Activity payload sent to the host

use crate::config::ConfigurationSnapshot;
use serde::Serialize;

/// The activity record published over IPC.
///
/// Display fields are copied verbatim from the snapshot; only the start
/// timestamp is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub timestamps: ActivityTimestamps,
    #[serde(skip_serializing_if = "ActivityAssets::is_empty")]
    pub assets: ActivityAssets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityTimestamps {
    /// Epoch seconds.
    pub start: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

impl ActivityAssets {
    pub fn is_empty(&self) -> bool {
        self.large_image.is_none()
            && self.large_text.is_none()
            && self.small_image.is_none()
            && self.small_text.is_none()
    }
}

impl Activity {
    pub fn from_snapshot(snapshot: &ConfigurationSnapshot, start: i64) -> Self {
        Self {
            name: snapshot.name.clone(),
            activity_type: snapshot.activity_type,
            details: snapshot.details.clone(),
            state: snapshot.state.clone(),
            timestamps: ActivityTimestamps { start },
            assets: ActivityAssets {
                large_image: snapshot.large_image_key.clone(),
                large_text: snapshot.large_image_text.clone(),
                small_image: snapshot.small_image_key.clone(),
                small_text: snapshot.small_image_text.clone(),
            },
        }
    }

    pub fn start_timestamp(&self) -> i64 {
        self.timestamps.start
    }
}
