//! Generation backend collaborator.
//!
//! The backend receives role-tagged context entries plus a model identifier
//! and returns text. Failures carry a transient/fatal classification; the
//! orchestrator walks its shuffled model list on failure and degrades to a
//! fixed fallback phrase if every candidate fails.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    System,
    User,
    Assistant,
}

/// One role-tagged entry of assembled context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub role: EntryRole,
    pub content: String,
}

impl ContextEntry {
    pub fn new(role: EntryRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenError {
    /// Worth trying the next model identifier.
    #[error("transient generation failure: {0}")]
    Transient(String),
    /// Misconfiguration or rejection; the next model may still differ.
    #[error("generation failure: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait GenBackend: Send + Sync {
    async fn complete(&self, model: &str, entries: &[ContextEntry]) -> Result<String, GenError>;
}

/// Try each model in order; the first non-blank completion wins. Returns the
/// text and the model that produced it, or None when every candidate failed.
pub async fn complete_with_fallback(
    backend: &dyn GenBackend,
    models: &[String],
    entries: &[ContextEntry],
) -> Option<(String, String)> {
    for model in models {
        match backend.complete(model, entries).await {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    tracing::warn!("model {} returned a blank completion, trying next", model);
                    continue;
                }
                return Some((text, model.clone()));
            }
            Err(GenError::Transient(e)) => {
                tracing::warn!("model {} failed transiently: {}, trying next", model, e);
            }
            Err(GenError::Fatal(e)) => {
                tracing::warn!("model {} rejected the request: {}, trying next", model, e);
            }
        }
    }
    tracing::warn!("all {} candidate models failed", models.len());
    None
}

// ============================================================================
// OpenAI-compatible HTTP client (Groq-style chat completions)
// ============================================================================

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatClient {
    /// Reads `GROQ_API_KEY` from the environment.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let api_key = env::var("GROQ_API_KEY").unwrap_or_default();
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GenBackend for OpenAiCompatClient {
    async fn complete(&self, model: &str, entries: &[ContextEntry]) -> Result<String, GenError> {
        let body = serde_json::json!({
            "model": model,
            "messages": entries,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let summary: String = text.chars().take(200).collect();
            return if status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::REQUEST_TIMEOUT
            {
                Err(GenError::Transient(format!("{}: {}", status, summary)))
            } else {
                Err(GenError::Fatal(format!("{}: {}", status, summary)))
            };
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenError::Transient(format!("invalid response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenError::Transient("empty choices".to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
