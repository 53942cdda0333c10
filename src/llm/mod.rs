//! LLM integration module for OpenAI-compatible chat models
//! Provides signal analysis and retrieval-grounded answers with explicit error handling

pub mod prompts;

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

pub use prompts::{AnalysisPrompts, MarketAnalysis, SYSTEM_PROMPT};

use crate::trading::CombinedSignal;
use crate::vector::SearchResult;

/// LLM response with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// LLM client configuration
#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub advanced_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl LLMConfig {
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        let api_key = config
            .apis
            .openai_api_key
            .clone()
            .context("OPENAI_API_KEY is required for LLM analysis")?;

        Ok(Self {
            api_key,
            api_base: config.endpoints.openai.clone(),
            model: config.llm.model.clone(),
            advanced_model: config.llm.advanced_model.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            timeout_seconds: config.collection.timeout_seconds,
            max_retries: config.collection.max_retries.max(1),
        })
    }
}

/// Chat client that turns signals and retrieved documents into analysis
pub struct LlmAnalyst {
    client: OpenAIClient<OpenAIConfig>,
    config: LLMConfig,
}

impl LlmAnalyst {
    pub fn new(config: LLMConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base);

        Self {
            client: OpenAIClient::with_config(openai_config),
            config,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Ok(Self::new(LLMConfig::from_config(config)?))
    }

    /// Generate text using specified model with retries and a per-attempt timeout
    pub async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<LLMResponse> {
        let model_name = model.unwrap_or(&self.config.model);

        info!(
            "Generating text with model '{}' (prompt length: {} chars)",
            model_name,
            prompt.len()
        );

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model_name)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .messages(messages)
            .build()?;

        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            match timeout(
                Duration::from_secs(self.config.timeout_seconds),
                self.client.chat().create(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.message.content)
                        .ok_or_else(|| anyhow::anyhow!("Model returned no content"))?;

                    let usage = response.usage;
                    info!("Generated {} chars with model '{}'", content.len(), model_name);

                    return Ok(LLMResponse {
                        content,
                        model: model_name.to_string(),
                        prompt_tokens: usage.as_ref().map(|u| u.prompt_tokens),
                        completion_tokens: usage.as_ref().map(|u| u.completion_tokens),
                        total_tokens: usage.as_ref().map(|u| u.total_tokens),
                    });
                }
                Ok(Err(e)) => {
                    error!("Chat API error on attempt {}: {}", attempt, e);
                    last_error = Some(anyhow::anyhow!("Chat API error: {}", e));
                }
                Err(_) => {
                    error!(
                        "Timeout on attempt {} after {} seconds",
                        attempt, self.config.timeout_seconds
                    );
                    last_error = Some(anyhow::anyhow!(
                        "Request timeout after {} seconds",
                        self.config.timeout_seconds
                    ));
                }
            }

            if attempt < self.config.max_retries {
                let backoff = retry_backoff(attempt);
                warn!(
                    "Retrying in {} seconds (attempt {}/{})",
                    backoff.as_secs(),
                    attempt,
                    self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!(
                "Failed to generate text after {} attempts",
                self.config.max_retries
            )
        }))
    }

    /// Generate text with structured JSON output
    pub async fn generate_json<T>(&self, prompt: &str, model: Option<&str>) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.generate(prompt, model).await?;

        let json_content = extract_json_from_text(&response.content)
            .ok_or_else(|| anyhow::anyhow!("No valid JSON found in response"))?;

        serde_json::from_str(&json_content).context("Failed to parse JSON response")
    }

    /// Structured outlook for a signal; `think_harder` switches to the advanced model
    pub async fn analyze(
        &self,
        signal: &CombinedSignal,
        retrieved: &[SearchResult],
        memory_context: Option<&str>,
        think_harder: bool,
    ) -> Result<MarketAnalysis> {
        let prompt = AnalysisPrompts::signal_analysis(signal, retrieved, memory_context);
        let model = think_harder.then_some(self.config.advanced_model.as_str());

        let mut analysis: MarketAnalysis = self.generate_json(&prompt, model).await?;
        analysis.direction = analysis.direction.trim().to_ascii_uppercase();
        analysis.confidence = analysis.confidence.clamp(0.0, 1.0);
        Ok(analysis)
    }

    /// Free-text answer grounded in retrieved documents
    pub async fn ask(
        &self,
        question: &str,
        retrieved: &[SearchResult],
        memory_context: Option<&str>,
    ) -> Result<String> {
        let prompt = AnalysisPrompts::question(question, retrieved, memory_context);
        Ok(self.generate(&prompt, None).await?.content)
    }
}

/// Longest pause between chat attempts
const MAX_BACKOFF_SECS: u64 = 30;

/// Doubling backoff after `attempt` failures: 1s, 2s, 4s, ... capped
fn retry_backoff(attempt: u32) -> Duration {
    let seconds = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(seconds.min(MAX_BACKOFF_SECS))
}

/// Extract JSON from text that might contain markdown or other formatting
pub fn extract_json_from_text(text: &str) -> Option<String> {
    // First try to find JSON wrapped in markdown code blocks
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return Some(text[start + 7..start + 7 + end].trim().to_string());
        }
    }

    // Try to find JSON wrapped in regular code blocks
    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let potential_json = text[start + 3..start + 3 + end].trim();
            if potential_json.starts_with('{') || potential_json.starts_with('[') {
                return Some(potential_json.to_string());
            }
        }
    }

    // Look for JSON-like content (starts with {)
    if let Some(start) = text.find('{') {
        let mut brace_count = 0;
        let mut end_pos = start;

        for (i, c) in text[start..].char_indices() {
            match c {
                '{' => brace_count += 1,
                '}' => {
                    brace_count -= 1;
                    if brace_count == 0 {
                        end_pos = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }

        if brace_count == 0 {
            return Some(text[start..end_pos].to_string());
        }
    }

    let trimmed = text.trim();
    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    {
        return Some(trimmed.to_string());
    }

    None
}
