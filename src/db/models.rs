use serde::{Deserialize, Serialize};

use crate::config::{Language, RecognitionMode, DEFAULT_ENCODE_QUALITY, DEFAULT_INTERVAL_MS};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslatorSettings {
    pub capture_interval_ms: u64,
    pub encode_quality: f32,
    pub mirror: bool,
    pub recognition_mode: RecognitionMode,
    pub language: Language,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            capture_interval_ms: DEFAULT_INTERVAL_MS,
            encode_quality: DEFAULT_ENCODE_QUALITY,
            mirror: true,
            recognition_mode: RecognitionMode::Letters,
            language: Language::En,
        }
    }
}
