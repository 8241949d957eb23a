use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::AiConfig,
    error::{AppError, AppResult},
    HttpClient,
};

use super::AiResponder;

pub struct OpenAiClient {
    http_client: HttpClient,
    cfg: AiConfig,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    output: Vec<OutputItem>,
}

impl ResponsesApiResponse {
    /// Concatenated text of every output_text content item.
    fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|content| content.kind == "output_text")
            .filter_map(|content| content.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponsesApiResponseOrError {
    Error(ApiErrorResponse),
    Response(ResponsesApiResponse),
}

impl OpenAiClient {
    pub fn new(http_client: HttpClient, cfg: AiConfig) -> Self {
        Self { http_client, cfg }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.api_base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AiResponder for OpenAiClient {
    async fn create_conversation(&self) -> AppResult<String> {
        let resp = self
            .http_client
            .post(self.url("conversations"))
            .bearer_auth(&self.cfg.api_key)
            .json(&json!({}))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        if let Some(error) = resp.get("error") {
            return Err(anyhow!("Error creating conversation: {:?}", error).into());
        }

        let conversation = serde_json::from_value::<ConversationResponse>(resp.clone())
            .context(format!("Could not parse conversation response: {}", resp))?;

        Ok(conversation.id)
    }

    async fn generate_reply(&self, conversation_id: &str, input: &str) -> AppResult<String> {
        let resp = self
            .http_client
            .post(self.url("responses"))
            .bearer_auth(&self.cfg.api_key)
            .json(&json!({
                "model": &self.cfg.model,
                "prompt": { "id": &self.cfg.prompt_id },
                "input": [
                    {
                        "role": "user",
                        "content": input
                    }
                ],
                "conversation": conversation_id
            }))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let parsed = serde_json::from_value::<ResponsesApiResponseOrError>(resp.clone())
            .context(format!("Could not parse responses API reply: {}", resp))?;

        let parsed = match parsed {
            ResponsesApiResponseOrError::Error(error) => {
                return Err(AppError::Internal(anyhow!(
                    "Responses API error: {}",
                    error.error.message
                )));
            }
            ResponsesApiResponseOrError::Response(parsed) => parsed,
        };

        let reply = parsed.output_text();
        if reply.is_empty() {
            return Err(anyhow!("Responses API returned no output text").into());
        }

        Ok(reply)
    }
}
