use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tuning for uploads and the cosmetic progress smoothing.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct UploadConfig {
    /// Minimum wall-clock time an upload row should take to reach 100%.
    #[serde(default = "default_min_visible_ms")]
    pub min_visible_ms: u64,
    /// Floor for the final animation, even when the transfer was slow.
    #[serde(default = "default_min_animation_ms")]
    pub min_animation_ms: u64,
    /// Spacing between animation frames.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Multipart field carrying the file.
    #[serde(default = "default_field_name")]
    pub field_name: String,
}

fn default_min_visible_ms() -> u64 {
    1200
}

fn default_min_animation_ms() -> u64 {
    300
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_field_name() -> String {
    "file".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            min_visible_ms: default_min_visible_ms(),
            min_animation_ms: default_min_animation_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            field_name: default_field_name(),
        }
    }
}

impl UploadConfig {
    pub fn min_visible(&self) -> Duration {
        Duration::from_millis(self.min_visible_ms)
    }

    pub fn min_animation(&self) -> Duration {
        Duration::from_millis(self.min_animation_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}
