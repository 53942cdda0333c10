//! Embeddings module using an OpenAI-compatible API
//! Provides cached text embeddings for the knowledge base

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;

/// Text embedder with an in-memory cache keyed by the exact text
pub struct Embedder {
    client: OpenAIClient<OpenAIConfig>,
    model_name: String,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
}

impl Embedder {
    pub fn new(api_key: &str, api_base: &str, model_name: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            client: OpenAIClient::with_config(config),
            model_name: model_name.to_string(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .apis
            .openai_api_key
            .as_deref()
            .context("OPENAI_API_KEY is required for embeddings")?;

        info!("Initializing embeddings ({})", config.llm.embedding_model);
        Ok(Self::new(
            api_key,
            &config.endpoints.openai,
            &config.llm.embedding_model,
        ))
    }

    /// Generate embeddings for text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        {
            let cache = self.cache.read().await;
            if let Some(embedding) = cache.get(text) {
                return Ok(embedding.clone());
            }
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model_name)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .context("Embedding request failed")?;

        let embedding: Vec<f32> = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))?
            .embedding;

        debug!(
            "Generated embedding with {} dimensions for: {}",
            embedding.len(),
            text.chars().take(50).collect::<String>()
        );

        self.cache
            .write()
            .await
            .insert(text.to_string(), embedding.clone());

        Ok(embedding)
    }

    /// Embed many texts in one request; cached texts are not sent again.
    /// Output order matches input order.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let missing: Vec<String> = {
            let cache = self.cache.read().await;
            let mut missing: Vec<String> = texts
                .iter()
                .filter(|t| !cache.contains_key(**t))
                .map(|t| t.to_string())
                .collect();
            missing.dedup();
            missing
        };

        if !missing.is_empty() {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model_name)
                .input(EmbeddingInput::StringArray(missing.clone()))
                .build()?;

            let mut response = self
                .client
                .embeddings()
                .create(request)
                .await
                .context("Batch embedding request failed")?;
            response.data.sort_by_key(|d| d.index);

            if response.data.len() != missing.len() {
                anyhow::bail!(
                    "Expected {} embeddings, got {}",
                    missing.len(),
                    response.data.len()
                );
            }

            info!("Generated {} embeddings", response.data.len());

            let mut cache = self.cache.write().await;
            for (text, data) in missing.into_iter().zip(response.data) {
                cache.insert(text, data.embedding);
            }
        }

        let cache = self.cache.read().await;
        texts
            .iter()
            .map(|t| {
                cache
                    .get(*t)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("Missing embedding for text"))
            })
            .collect()
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Clear the embedding cache
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        info!("Embedding cache cleared");
    }
}
