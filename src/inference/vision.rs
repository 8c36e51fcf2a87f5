//! Vision-language client speaking the OpenAI chat completions protocol

use super::{build_http_client, check_status, endpoint_url, ImageToText, InferenceError, InferenceResult};
use crate::config::InferenceConfig;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Answers are a handful of characters
const MAX_TOKENS: u32 = 50;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Image-to-text over an OpenAI-compatible endpoint
pub struct VisionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl VisionClient {
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
            endpoint: config.vision_endpoint.clone(),
            model: config.vision_model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Guesses the image MIME type from its magic bytes
fn image_mime(image: &[u8]) -> &'static str {
    if image.starts_with(&[0xff, 0xd8, 0xff]) {
        "image/jpeg"
    } else if image.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "image/png"
    }
}

#[async_trait]
impl ImageToText for VisionClient {
    async fn read_image(&self, image: &[u8], instruction: &str) -> InferenceResult<String> {
        let data_url = format!(
            "data:{};base64,{}",
            image_mime(image),
            base64::engine::general_purpose::STANDARD.encode(image)
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ChatContent::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                    ChatContent::Text {
                        text: instruction.to_string(),
                    },
                ],
            }],
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
        };

        let mut builder = self
            .http
            .post(endpoint_url(&self.endpoint, "chat/completions"))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!("Sending {} byte image to vision model {}", image.len(), self.model);
        let response = check_status(builder.send().await?).await?;
        let body: ChatResponse = response.json().await?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(InferenceError::EmptyResponse)
    }
}
