//! Answer generation capability and implementations.
//!
//! An [`AnswerGenerator`] makes exactly one completion attempt per call and
//! classifies its failure as transient or permanent. Retries, backoff, and
//! the per-attempt timeout are applied by [`generate_with_retry`], so every
//! implementation gets the same policy.
//!
//! | Config Value | Generator |
//! |-------------|----------|
//! | `"openai"` | [`OpenAIGenerator`] (chat completions) |
//! | `"ollama"` | [`OllamaGenerator`] (`/api/chat`) |
//! | `"extractive"` | [`ExtractiveGenerator`] (no model; quotes the best passage) |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::GenerationConfig;
use crate::context::AssembledContext;
use crate::embedding::{http_client, post_json};
use crate::error::{RagError, Result};
use crate::retry::{retry, AttemptError, RetryPolicy};

const INSTRUCTIONS: &str = "You are a helpful assistant that answers questions based on the provided context. \
Use the following pieces of context to answer the question at the end. \
Each passage starts with a bracketed source number; cite those numbers in your answer. \
If you don't know the answer based on the context provided, just say that you don't know, don't try to make up an answer.";

/// Everything a generator sees for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub question: String,
    /// Citation-marked context text.
    pub context: String,
    /// The passages making up `context`, best first.
    pub passages: Vec<String>,
}

impl Prompt {
    pub fn new(question: &str, context: &AssembledContext) -> Self {
        Self {
            question: question.trim().to_string(),
            context: context.text.clone(),
            passages: context.passages.clone(),
        }
    }

    /// The full prompt text sent to a language model.
    pub fn render(&self) -> String {
        format!(
            "{}\n\nContext:\n{}\nQuestion: {}\n\nHelpful Answer:",
            INSTRUCTIONS,
            self.context.trim_end(),
            self.question
        )
    }
}

/// One opaque text-completion attempt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Short identifier for logs (e.g. the model name).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> std::result::Result<String, AttemptError>;
}

/// Run `generator` under `policy`, failing with [`RagError::Generator`] once
/// the policy is exhausted. An empty completion counts as a transient failure.
pub async fn generate_with_retry(
    generator: &dyn AnswerGenerator,
    policy: &RetryPolicy,
    prompt: &Prompt,
) -> Result<String> {
    retry(policy, generator.name(), |_| async move {
        let text = generator.generate(prompt).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AttemptError::Transient("empty completion".to_string()));
        }
        Ok(text.to_string())
    })
    .await
    .map_err(|e| RagError::Generator {
        attempts: e.attempts,
        reason: e.reason,
    })
}

// ============ OpenAI ============

/// Generator using the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> std::result::Result<String, AttemptError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt.render() }
            ],
        });
        let auth = format!("Bearer {}", self.api_key);
        let endpoint = format!("{}/chat/completions", self.url.trim_end_matches('/'));

        let json = post_json(&self.client, &endpoint, Some(auth.as_str()), &body).await?;
        parse_openai_completion(&json)
    }
}

fn parse_openai_completion(json: &Value) -> std::result::Result<String, AttemptError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AttemptError::Permanent("invalid OpenAI response: missing message content".into())
        })
}

// ============ Ollama ============

/// Generator using a local Ollama instance's `/api/chat` endpoint.
pub struct OllamaGenerator {
    model: String,
    temperature: f32,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> std::result::Result<String, AttemptError> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": [
                { "role": "user", "content": prompt.render() }
            ],
        });
        let endpoint = format!("{}/api/chat", self.url.trim_end_matches('/'));

        let json = post_json(&self.client, &endpoint, None, &body).await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                AttemptError::Permanent("invalid Ollama response: missing message content".into())
            })
    }
}

// ============ Extractive ============

/// Offline generator that answers with the highest-ranked passage verbatim.
///
/// Useful without network access and in tests; it never paraphrases.
#[derive(Debug, Default)]
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, prompt: &Prompt) -> std::result::Result<String, AttemptError> {
        match prompt.passages.first() {
            Some(passage) => Ok(format!("Most relevant passage:\n{}", passage.trim_end())),
            None => Ok("I don't know based on the provided documents.".to_string()),
        }
    }
}

/// Create the [`AnswerGenerator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "extractive" => Ok(Arc::new(ExtractiveGenerator)),
        other => Err(RagError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}
