use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_IDENTIFY_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_MAX_CANDIDATES: u32 = 1;
pub const DEFAULT_SECONDARY_LABEL_THRESHOLD: f64 = 0.6;
pub const DEFAULT_LOCAL_DETECT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REMOTE_IDENTIFY_INTERVAL_MS: u64 = 3000;

/// When a completed identification should switch the device lights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedTrigger {
    /// At least one face matched a person.
    #[default]
    AnyIdentified,
    /// At least one matched face also resolved to a display name.
    AnyNamed,
    Never,
}

impl LedTrigger {
    pub fn fires(&self, faces: &[crate::detection::domain::detected_face::DetectedFace]) -> bool {
        match self {
            LedTrigger::AnyIdentified => faces.iter().any(|f| f.identity.is_some()),
            LedTrigger::AnyNamed => faces
                .iter()
                .any(|f| f.identity.as_ref().is_some_and(|i| i.name.is_some())),
            LedTrigger::Never => false,
        }
    }
}

/// Thresholds, intervals and triggers that differed between app variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognitionPolicy {
    #[serde(default = "default_identify_confidence")]
    pub identify_confidence_threshold: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: u32,
    #[serde(default = "default_secondary_label_threshold")]
    pub secondary_label_threshold: f64,
    #[serde(default = "default_local_interval")]
    pub local_detect_interval_ms: u64,
    #[serde(default = "default_remote_interval")]
    pub remote_identify_interval_ms: u64,
    #[serde(default)]
    pub led_trigger: LedTrigger,
}

fn default_identify_confidence() -> f64 {
    DEFAULT_IDENTIFY_CONFIDENCE
}

fn default_max_candidates() -> u32 {
    DEFAULT_MAX_CANDIDATES
}

fn default_secondary_label_threshold() -> f64 {
    DEFAULT_SECONDARY_LABEL_THRESHOLD
}

fn default_local_interval() -> u64 {
    DEFAULT_LOCAL_DETECT_INTERVAL_MS
}

fn default_remote_interval() -> u64 {
    DEFAULT_REMOTE_IDENTIFY_INTERVAL_MS
}

impl Default for RecognitionPolicy {
    fn default() -> Self {
        Self {
            identify_confidence_threshold: DEFAULT_IDENTIFY_CONFIDENCE,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            secondary_label_threshold: DEFAULT_SECONDARY_LABEL_THRESHOLD,
            local_detect_interval_ms: DEFAULT_LOCAL_DETECT_INTERVAL_MS,
            remote_identify_interval_ms: DEFAULT_REMOTE_IDENTIFY_INTERVAL_MS,
            led_trigger: LedTrigger::default(),
        }
    }
}

impl RecognitionPolicy {
    pub fn local_detect_interval(&self) -> Duration {
        Duration::from_millis(self.local_detect_interval_ms)
    }

    pub fn remote_identify_interval(&self) -> Duration {
        Duration::from_millis(self.remote_identify_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.identify_confidence_threshold) {
            return Err(format!(
                "identify_confidence_threshold must be between 0.0 and 1.0, got {}",
                self.identify_confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.secondary_label_threshold) {
            return Err(format!(
                "secondary_label_threshold must be between 0.0 and 1.0, got {}",
                self.secondary_label_threshold
            ));
        }
        if self.max_candidates == 0 {
            return Err("max_candidates must be at least 1".to_string());
        }
        Ok(())
    }
}
