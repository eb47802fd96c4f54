use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;

use super::{ post_json, reply_at, ChatClient, CompletionError };
use crate::llm::LlmConfig;
use crate::models::chat::{ ChatMessage, CompletionRequest };

const REPLY_POINTER: &str = "/response";

/// Client for a hosted function that owns the model choice and forwards the
/// conversation to the LLM on our behalf.
pub struct ProxyChatClient {
    http: HttpClient,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRequest<'a> {
    system_prompt: &'a str,
    conversation_history: &'a [ChatMessage],
    user_input: &'a str,
}

impl ProxyChatClient {
    pub fn new(url: String, api_key: Option<String>) -> Result<Self, CompletionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let invalid = |e: reqwest::header::InvalidHeaderValue| {
                CompletionError::Configuration(format!("Invalid API key format: {}", e))
            };
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?
            );
            headers.insert(HeaderName::from_static("apikey"), HeaderValue::from_str(&key).map_err(invalid)?);
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CompletionError::Configuration(e.to_string()))?;

        info!("Proxy chat client ready: url={}", url);
        Ok(Self { http, url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let url = config.base_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CompletionError::Configuration("Proxy endpoint URL is required".to_string()))?;
        Self::new(url, config.api_key.clone())
    }
}

#[async_trait]
impl ChatClient for ProxyChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let req = ProxyRequest {
            system_prompt: &request.system_prompt,
            conversation_history: &request.history,
            user_input: &request.user_input,
        };

        let body = post_json(&self.http, &self.url, &req).await?;
        Ok(reply_at(&body, REPLY_POINTER))
    }

    fn get_model(&self) -> String {
        "proxy-managed".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}
