//! OpenAI-compatible extraction oracle.
//!
//! Talks to any chat-completions endpoint (OpenAI, a proxy, or a local
//! server with the same API). All retry logic lives in the
//! orchestrator; this adapter only classifies failures as transient or
//! permanent through error codes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use graphloom_core::{
    Chunk, Extraction, ExtractionContext, ExtractionOracle, GraphloomError, GraphloomResult,
};

use crate::parser::parse_extraction;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const EXTRACTION_PROMPT: &str = r#"You are an extractor for building a knowledge graph. The input is a single text chunk. Return the entities and relationships it mentions as strict JSON, nothing else.

Return JSON in this format:
{
  "entities": [
    {
      "type": "PERSON|ORGANIZATION|LOCATION|CONCEPT|EVENT",
      "canonical_name": "canonical name",
      "confidence": 0.0-1.0
    }
  ],
  "relations": [
    {
      "subject": "subject canonical_name",
      "predicate": "relationship type (WORKS_FOR, LOCATED_IN, CREATED, etc.)",
      "object": "object canonical_name",
      "confidence": 0.0-1.0
    }
  ]
}"#;

/// Configuration for the OpenAI-compatible oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// API key. Falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL of the chat-completions API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Extraction oracle backed by an OpenAI-compatible chat API.
pub struct OpenAiOracle {
    client: reqwest::Client,
    config: OracleConfig,
    api_key: String,
}

impl OpenAiOracle {
    pub fn new(config: OracleConfig) -> GraphloomResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                GraphloomError::Configuration(
                    "OpenAI API key not found. Set OPENAI_API_KEY environment variable or provide api_key in config.".to_string(),
                )
            })?;

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn user_message(chunk: &Chunk, context: &ExtractionContext) -> String {
        match &context.article_title {
            Some(title) => format!("ARTICLE: {title}\nCHUNK: {}", chunk.text),
            None => format!("CHUNK: {}", chunk.text),
        }
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    async fn extract(
        &self,
        chunk: &Chunk,
        context: &ExtractionContext,
    ) -> GraphloomResult<Extraction> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: EXTRACTION_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_message(chunk, context),
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GraphloomError::oracle_timeout(format!("oracle request timed out: {e}"))
                } else {
                    GraphloomError::oracle_unavailable(
                        format!("oracle request failed: {e}"),
                        Some(Box::new(e)),
                    )
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GraphloomError::oracle_rate_limited(format!(
                "oracle rate limited (chunk {})",
                chunk.id
            )));
        }
        if status.is_server_error() {
            // 5xx: transient, the orchestrator retries
            return Err(GraphloomError::oracle_unavailable(
                format!("oracle server error: {status}"),
                None,
            ));
        }
        if !status.is_success() {
            // 4xx: permanent, retrying would not help
            let body = response.text().await.unwrap_or_default();
            return Err(GraphloomError::oracle(format!(
                "oracle client error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            GraphloomError::oracle(format!("malformed oracle response envelope: {e}"))
        })?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| GraphloomError::oracle("oracle response has no content"))?;

        debug!(chunk_id = %chunk.id, model = %self.config.model, "oracle responded");
        parse_extraction(content, &chunk.id)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
