//! Generation client
//!
//! Sends composed requests to an OpenAI-compatible chat completion endpoint
//! and returns the raw model text. The pipeline consumes generation through
//! the `SqlGenerator` trait so tests can script responses.

use crate::config::ServiceConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Produce raw model output for one composed request.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.api_base_url.clone(),
        )
    }

    pub async fn call_llm(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::new();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You translate questions into SQL. Reply with a single SQL statement."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
        });

        // Newer models take max_completion_tokens; older ones take max_tokens.
        if self.model.starts_with("gpt-5") || self.model.starts_with("gpt-4") {
            body["max_completion_tokens"] = serde_json::json!(1000);
        } else {
            body["max_tokens"] = serde_json::json!(1000);
        }

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Generation(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(error) = response_json.get("error") {
            return Err(PipelineError::Generation(format!(
                "LLM API error: {}",
                error
            )));
        }

        let choices = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                PipelineError::Generation(format!(
                    "No choices in LLM response: {}",
                    response_json
                ))
            })?;

        if let Some(finish_reason) = choices[0].get("finish_reason").and_then(|r| r.as_str()) {
            if finish_reason == "length" {
                warn!("LLM response was truncated by the length limit");
            } else if finish_reason == "content_filter" {
                return Err(PipelineError::Generation(
                    "LLM response was filtered by content policy".to_string(),
                ));
            }
        }

        let content = choices[0]["message"]["content"].as_str().ok_or_else(|| {
            PipelineError::Generation(format!(
                "No content in LLM response: {}",
                response_json
            ))
        })?;

        if content.is_empty() {
            return Err(PipelineError::Generation(
                "Empty content in LLM response".to_string(),
            ));
        }

        Ok(content.to_string())
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.call_llm(prompt).await
    }
}
