use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::Serialize;

use super::{ post_json, reply_at, ChatClient, CompletionError };
use crate::llm::{ LlmConfig, DEFAULT_MODEL };
use crate::models::chat::{ ChatMessage, CompletionRequest };

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const CHAT_COMPLETIONS_ROUTE: &str = "/v1/chat/completions";
const REPLY_POINTER: &str = "/choices/0/message/content";

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        temperature: f32,
        max_tokens: u32
    ) -> Result<Self, CompletionError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let url = if base.ends_with("/chat/completions") {
            base
        } else {
            format!("{}{}", base.trim_end_matches('/'), CHAT_COMPLETIONS_ROUTE)
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| CompletionError::Configuration(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CompletionError::Configuration(e.to_string()))?;

        info!("OpenAI chat client ready: model={}, url={}", chat_model, url);
        Ok(Self {
            http,
            model: chat_model,
            url,
            temperature,
            max_tokens,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompletionError::Configuration("OpenAI API key is required".to_string()))?;

        Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.temperature,
            config.max_tokens,
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: request.to_messages(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!("Sending {} messages to {}", req.messages.len(), self.url);

        let body = post_json(&self.http, &self.url, &req).await?;
        Ok(reply_at(&body, REPLY_POINTER))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}
