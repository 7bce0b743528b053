use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{AppConfig, Language, RecognitionMode};
use crate::error::TranslateError;

/// Score reported when the service returns a label without one.
pub const DEFAULT_CONFIDENCE: f32 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    pub label: String,
    pub confidence: f32,
}

impl InferenceResult {
    pub fn empty() -> Self {
        Self {
            label: String::new(),
            confidence: 0.0,
        }
    }
}

/// One outstanding analyze call. At most one exists per session.
#[derive(Debug)]
pub struct InferenceRequest {
    pub payload: Vec<u8>,
    pub created_at: Instant,
}

impl InferenceRequest {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            created_at: Instant::now(),
        }
    }
}

/// Anything that can turn an encoded image into a label.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn infer(&self, payload: Vec<u8>) -> Result<InferenceResult, TranslateError>;
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    label: Option<String>,
    confidence: Option<f64>,
}

pub struct MubsirApi {
    client: Client,
    endpoint: String,
    field_name: String,
    recognition: RecognitionMode,
    language: Language,
}

impl MubsirApi {
    pub fn new(config: &AppConfig) -> Result<Self, TranslateError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TranslateError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.analyze_endpoint(),
            field_name: config.field_name.clone(),
            recognition: config.recognition,
            language: config.language,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn analyze(&self, payload: Vec<u8>) -> Result<InferenceResult, TranslateError> {
        let part = reqwest::multipart::Part::bytes(payload)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| TranslateError::Network(format!("Multipart error: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .part(self.field_name.clone(), part)
            .text("mode", self.recognition.as_str())
            .text("lang", self.language.code());

        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslateError::Network(format!("Analyze request timed out: {}", e))
                } else {
                    TranslateError::Network(format!("Analyze request failed: {}", e))
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TranslateError::Network(format!("Read error: {}", e)))?;

        if !status.is_success() {
            return Err(TranslateError::RemoteRejected {
                status: status.as_u16(),
                body,
            });
        }

        parse_analyze_body(&body, self.recognition).map_err(|reason| {
            log::warn!("Malformed analyze response: {}", reason);
            TranslateError::RemoteRejected {
                status: status.as_u16(),
                body,
            }
        })
    }
}

#[async_trait]
impl InferenceBackend for MubsirApi {
    async fn infer(&self, payload: Vec<u8>) -> Result<InferenceResult, TranslateError> {
        self.analyze(payload).await
    }
}

pub(crate) fn parse_analyze_body(
    body: &str,
    mode: RecognitionMode,
) -> Result<InferenceResult, String> {
    let parsed: AnalyzeResponse =
        serde_json::from_str(body).map_err(|e| format!("Parse error: {}", e))?;

    let label = normalize_label(parsed.label.as_deref().unwrap_or_default(), mode);
    if label.is_empty() {
        return Ok(InferenceResult::empty());
    }

    let confidence = parsed
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(DEFAULT_CONFIDENCE);

    Ok(InferenceResult { label, confidence })
}

/// Letters mode keeps only the first grapheme (a letter with its marks),
/// upper-cased. Words mode keeps the trimmed label.
pub fn normalize_label(raw: &str, mode: RecognitionMode) -> String {
    let trimmed = raw.trim();
    match mode {
        RecognitionMode::Letters => trimmed
            .graphemes(true)
            .next()
            .map(str::to_uppercase)
            .unwrap_or_default(),
        RecognitionMode::Words => trimmed.to_string(),
    }
}
