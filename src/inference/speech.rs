//! Speech-to-text client for Whisper-compatible transcription servers

use super::{build_http_client, check_status, endpoint_url, InferenceResult, SpeechToText};
use crate::config::InferenceConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Transcription over `POST {endpoint}/audio/transcriptions`
pub struct SpeechClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl SpeechClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> InferenceResult<Self> {
        Ok(Self {
            http: build_http_client(std::time::Duration::from_secs(30))?,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
        })
    }

    pub fn from_config(config: &InferenceConfig) -> InferenceResult<Self> {
        Ok(Self {
            http: build_http_client(config.request_timeout())?,
            endpoint: config.speech_endpoint.clone(),
            model: config.speech_model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl SpeechToText for SpeechClient {
    async fn transcribe(&self, audio: &[u8]) -> InferenceResult<String> {
        let file = Part::bytes(audio.to_vec())
            .file_name("challenge.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", "en")
            .text("response_format", "json");

        let mut builder = self
            .http
            .post(endpoint_url(&self.endpoint, "audio/transcriptions"))
            .multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!("Transcribing {} bytes of audio with {}", audio.len(), self.model);
        let response = check_status(builder.send().await?).await?;
        let body: TranscriptionResponse = response.json().await?;
        Ok(body.text)
    }
}
