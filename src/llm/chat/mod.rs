pub mod openai;
pub mod proxy;

use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, StatusCode };
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

use super::{ LlmConfig, LlmType };
use crate::models::chat::CompletionRequest;
use self::openai::OpenAIChatClient;
use self::proxy::ProxyChatClient;

/// Shown as the assistant's reply when the endpoint answers without one.
pub const FALLBACK_REPLY: &str = "Üzgünüm, bir cevap oluşturulamadı.";

/// Localized failure shown to the user for any failed turn.
pub const RETRIEVAL_FAILED: &str = "Yanıt alınırken bir hata oluştu.";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("completion response could not be decoded: {0}")]
    Decode(String),
    #[error("completion client misconfigured: {0}")]
    Configuration(String),
}

impl CompletionError {
    pub fn user_message(&self) -> &'static str {
        RETRIEVAL_FAILED
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One non-streaming round trip. Returns the reply text, or the fallback
    /// reply when the response carries none.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, CompletionError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Proxy => {
            let specific_client = ProxyChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// POSTs `payload` and returns the decoded JSON body. Non-2xx statuses are
/// classified errors; nothing is retried.
pub(crate) async fn post_json(
    http: &HttpClient,
    url: &str,
    payload: &(impl serde::Serialize + Sync)
) -> Result<JsonValue, CompletionError> {
    let resp = http.post(url).json(payload).send().await.map_err(CompletionError::Transport)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        warn!("Completion endpoint {} answered {}", url, status);
        return Err(CompletionError::Status { status, body });
    }

    let bytes = resp.bytes().await.map_err(CompletionError::Transport)?;
    serde_json::from_slice(&bytes).map_err(|e| CompletionError::Decode(e.to_string()))
}

/// Reads the reply at `pointer`; absent, non-string or blank values fall
/// back to [`FALLBACK_REPLY`].
pub(crate) fn reply_at(body: &JsonValue, pointer: &str) -> String {
    match body.pointer(pointer).and_then(JsonValue::as_str) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => {
            debug!("No reply at '{}', using fallback", pointer);
            FALLBACK_REPLY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_at_falls_back_on_missing_or_blank() {
        let body = json!({ "choices": [{ "message": { "content": "Merhaba" } }] });
        assert_eq!(reply_at(&body, "/choices/0/message/content"), "Merhaba");

        assert_eq!(reply_at(&json!({ "choices": [] }), "/choices/0/message/content"), FALLBACK_REPLY);
        assert_eq!(reply_at(&json!({ "response": "" }), "/response"), FALLBACK_REPLY);
        assert_eq!(reply_at(&json!({ "response": 42 }), "/response"), FALLBACK_REPLY);
    }

    #[test]
    fn proxy_requires_endpoint() {
        let config = LlmConfig {
            llm_type: LlmType::Proxy,
            ..Default::default()
        };
        assert!(matches!(new_client(&config), Err(CompletionError::Configuration(_))));
    }

    #[test]
    fn every_failure_has_the_same_user_message() {
        let err = CompletionError::Decode("eof".into());
        assert_eq!(err.user_message(), RETRIEVAL_FAILED);
    }
}
