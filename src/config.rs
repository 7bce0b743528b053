use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
/// Must match the upload field the analyze service reads.
pub const DEFAULT_FIELD_NAME: &str = "image";
pub const DEFAULT_INTERVAL_MS: u64 = 2_000;
pub const MIN_INTERVAL_MS: u64 = 2_000;
pub const MAX_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_ENCODE_QUALITY: f32 = 0.9;

const ENV_API_BASE: &str = "MUBSIR_API_BASE";
const ENV_FIELD_NAME: &str = "MUBSIR_FIELD_NAME";
const ENV_REQUEST_TIMEOUT_MS: &str = "MUBSIR_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    Letters,
    Words,
}

impl RecognitionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RecognitionMode::Letters => "letters",
            RecognitionMode::Words => "words",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecognitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "letters" => Ok(RecognitionMode::Letters),
            "words" => Ok(RecognitionMode::Words),
            other => Err(format!("Unknown recognition mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ar,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }

    pub fn speech_locale(self) -> &'static str {
        match self {
            Language::En => "en-US",
            Language::Ar => "ar-SA",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ar" => Ok(Language::Ar),
            other => Err(format!("Unknown language '{}'", other)),
        }
    }
}

/// Per-session capture parameters. Only `interval_ms` may change after the
/// session starts, and only takes effect when the schedule restarts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub interval_ms: u64,
    pub encode_quality: f32,
    pub mirror: bool,
}

impl CaptureConfig {
    pub fn new(interval_ms: u64, encode_quality: f32, mirror: bool) -> Result<Self, String> {
        if interval_ms == 0 {
            return Err("Capture interval must be positive".to_string());
        }
        validate_quality(encode_quality)?;
        Ok(Self {
            interval_ms,
            encode_quality,
            mirror,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            encode_quality: DEFAULT_ENCODE_QUALITY,
            mirror: true,
        }
    }
}

/// Bounds for the user-facing interval setting.
pub fn validate_interval(interval_ms: u64) -> Result<u64, String> {
    if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
        return Err(format!(
            "Capture interval must be between {} and {} ms (got {})",
            MIN_INTERVAL_MS, MAX_INTERVAL_MS, interval_ms
        ));
    }
    Ok(interval_ms)
}

pub fn validate_quality(quality: f32) -> Result<f32, String> {
    if !(quality > 0.0 && quality <= 1.0) {
        return Err(format!("Encode quality must be in (0, 1] (got {})", quality));
    }
    Ok(quality)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base: String,
    pub field_name: String,
    pub capture: CaptureConfig,
    pub recognition: RecognitionMode,
    pub language: Language,
    /// Ceiling for one analyze call. Falls back to the capture interval.
    pub request_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            field_name: DEFAULT_FIELD_NAME.to_string(),
            capture: CaptureConfig::default(),
            recognition: RecognitionMode::Letters,
            language: Language::En,
            request_timeout: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then persisted settings, then environment.
    pub fn load(db_path: &Path) -> Result<Self, String> {
        let mut config = Self::default();
        let settings = db::load_translator_settings(db_path)?;
        config.apply_settings(&settings)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn analyze_endpoint(&self) -> String {
        format!("{}/analyze", self.api_base.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
            .unwrap_or_else(|| self.capture.interval())
    }

    pub fn apply_settings(&mut self, settings: &db::models::TranslatorSettings) -> Result<(), String> {
        self.capture = CaptureConfig::new(
            validate_interval(settings.capture_interval_ms)?,
            settings.encode_quality,
            settings.mirror,
        )?;
        self.recognition = settings.recognition_mode;
        self.language = settings.language;
        Ok(())
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        if let Some(field) = lookup(ENV_FIELD_NAME).filter(|v| !v.trim().is_empty()) {
            self.field_name = field.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|e| format!("{} must be an integer: {}", ENV_REQUEST_TIMEOUT_MS, e))?;
            if ms == 0 {
                return Err(format!("{} must be positive", ENV_REQUEST_TIMEOUT_MS));
            }
            self.request_timeout = Some(Duration::from_millis(ms));
        }
        Ok(())
    }
}
