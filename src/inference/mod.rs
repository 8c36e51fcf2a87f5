//! External inference collaborators
//!
//! The solver reads challenge images and audio through two narrow traits so
//! the model behind them can be swapped freely.
//!
//! # Components
//!
//! - `ImageToText`: image bytes plus an instruction in, free text out
//! - `SpeechToText`: audio bytes in, transcript out
//! - `VisionClient`: OpenAI-compatible chat completion with an inline image
//! - `SpeechClient`: Whisper-compatible transcription endpoint

mod speech;
mod vision;

pub use speech::SpeechClient;
pub use vision::VisionClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from inference calls
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Inference API returned no usable output")]
    EmptyResponse,
}

/// Result type alias for inference operations
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// Reads text out of an image
#[async_trait]
pub trait ImageToText: Send + Sync {
    /// Returns the model's raw answer; callers sanitize it
    async fn read_image(&self, image: &[u8], instruction: &str) -> InferenceResult<String>;
}

/// Transcribes speech
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> InferenceResult<String>;
}

/// Joins a base endpoint and a path without doubling slashes
fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Builds the HTTP client shared by both inference clients
fn build_http_client(timeout: std::time::Duration) -> InferenceResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lex-harvest/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Turns a non-success response into an `InferenceError::Api`
async fn check_status(response: reqwest::Response) -> InferenceResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(InferenceError::Api {
        status: status.as_u16(),
        message: message.chars().take(200).collect(),
    })
}
