use super::outbound::{build_client, error_body, send_with_retry, SendError};
use crate::domain::GeneratedIdea;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const IDEA_PROMPT: &str = "Generate a creative and viable SaaS product idea. \
Return ONLY a single, valid JSON object with the requested schema. \
Do not include markdown formatting.";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    RequestFailed(String),
    #[error("Generator rate limited")]
    RateLimited,
    #[error("Generator returned an unusable idea: {0}")]
    InvalidOutput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<SendError> for GenerationError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::RateLimited => GenerationError::RateLimited,
            SendError::Transport(msg) => GenerationError::RequestFailed(msg),
        }
    }
}

#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    async fn generate(&self) -> Result<GeneratedIdea, GenerationError>;
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self, GenerationError> {
        let mut headers = header::HeaderMap::new();
        let key_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| GenerationError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert("x-goog-api-key", key_value);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = build_client(headers, timeout).map_err(|e| {
            GenerationError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: GEMINI_API_BASE.to_string(),
            model,
        })
    }
}

fn request_body() -> Value {
    let string = json!({ "type": "STRING" });
    let string_list = json!({ "type": "ARRAY", "items": { "type": "STRING" } });

    json!({
        "contents": [{ "parts": [{ "text": IDEA_PROMPT }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "title": string,
                    "description": string,
                    "problem": string,
                    "solution": string,
                    "targetAudience": string,
                    "techStack": string_list,
                    "features": string_list,
                    "monetization": string,
                    "marketSize": string,
                    "competitors": string_list,
                    "score": { "type": "NUMBER" },
                },
                "required": ["title", "description", "score"],
            },
        },
    })
}

/// Pulls the JSON text out of the first candidate and decodes it.
fn parse_response(body: &Value) -> Result<GeneratedIdea, GenerationError> {
    let text = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| GenerationError::InvalidOutput("Missing candidate text".to_string()))?;

    let idea: GeneratedIdea = serde_json::from_str(text.trim())
        .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;
    idea.check_output()
        .map_err(|errors| GenerationError::InvalidOutput(errors.join("; ")))?;

    Ok(idea)
}

#[async_trait]
impl IdeaGenerator for GeminiClient {
    async fn generate(&self) -> Result<GeneratedIdea, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = request_body();

        let resp = send_with_retry(|| self.client.post(&url).json(&body)).await?;
        if !resp.status().is_success() {
            return Err(GenerationError::RequestFailed(error_body(resp).await));
        }

        let json_response: Value = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;

        parse_response(&json_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn parses_candidate_text() {
        let body = wrap(
            r#"{"title":"Invoicely","description":"Invoices for freelancers","techStack":["Rust"],"score":72}"#,
        );
        let idea = parse_response(&body).unwrap();
        assert_eq!(idea.title, "Invoicely");
        assert_eq!(idea.score, 72.0);
    }

    #[test]
    fn rejects_empty_candidates() {
        let err = parse_response(&json!({ "candidates": [] })).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
    }

    #[test]
    fn rejects_non_json_text() {
        let err = parse_response(&wrap("```json\nnope```")).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
    }

    #[test]
    fn rejects_out_of_range_score() {
        let err = parse_response(&wrap(r#"{"title":"a","description":"b","score":140}"#))
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(msg) if msg.contains("score")));
    }

    #[test]
    fn schema_requires_core_fields() {
        let body = request_body();
        let required = body
            .pointer("/generationConfig/responseSchema/required")
            .unwrap();
        assert_eq!(required, &json!(["title", "description", "score"]));
    }
}
