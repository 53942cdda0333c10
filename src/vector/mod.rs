// In-process vector index for retrieval
// Documents are derived from collected signals and persisted to a JSON file

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::trading::CombinedSignal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub similarity: f32,
}

/// Content-derived id, so the same text always maps to the same document
pub fn document_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

/// Cosine similarity; zero-norm or mismatched vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Texts and metadata worth indexing from one signal
pub fn signal_documents(signal: &CombinedSignal) -> Vec<(String, Value)> {
    let mut docs = Vec::new();

    if let Some(market) = &signal.market_data {
        docs.push((market.to_embedding_text(), market.to_vector_metadata()));
    }
    for item in &signal.news_items {
        docs.push((item.to_embedding_text(), item.to_vector_metadata()));
    }
    if let Some(sentiment) = &signal.sentiment {
        docs.push((sentiment.to_embedding_text(), sentiment.to_vector_metadata()));
    }

    docs
}

pub struct KnowledgeBase {
    path: PathBuf,
    documents: Vec<Document>,
}

impl KnowledgeBase {
    /// Load from `path`; a missing file starts an empty index
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let documents = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read knowledge base {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt knowledge base {}", path.display()))?
        } else {
            Vec::new()
        };

        Ok(Self { path, documents })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, serde_json::to_string(&self.documents)?)
            .with_context(|| format!("Failed to write knowledge base {}", self.path.display()))?;
        debug!("Saved {} documents to {}", self.documents.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.iter().any(|d| d.id == id)
    }

    /// Returns false when a document with the same text already exists
    pub fn add(&mut self, text: String, metadata: Value, embedding: Vec<f32>) -> bool {
        let id = document_id(&text);
        if self.contains(&id) {
            return false;
        }

        self.documents.push(Document {
            id,
            text,
            metadata,
            embedding,
            added_at: Utc::now(),
        });
        true
    }

    /// Embed and index the documents of a signal that are not stored yet
    pub async fn add_signal_documents(
        &mut self,
        signal: &CombinedSignal,
        embedder: &Embedder,
    ) -> Result<usize> {
        let pending: Vec<(String, Value)> = signal_documents(signal)
            .into_iter()
            .filter(|(text, _)| !self.contains(&document_id(text)))
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = pending.iter().map(|(t, _)| t.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let mut added = 0;
        for ((text, metadata), embedding) in pending.into_iter().zip(embeddings) {
            if self.add(text, metadata, embedding) {
                added += 1;
            }
        }

        info!("Added {} documents for {} to knowledge base", added, signal.symbol);
        Ok(added)
    }

    /// Top `k` documents by cosine similarity, most similar first
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<(f32, &Document)> = self
            .documents
            .iter()
            .map(|d| (cosine_similarity(query_embedding, &d.embedding), d))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(k)
            .map(|(similarity, d)| SearchResult {
                id: d.id.clone(),
                text: d.text.clone(),
                metadata: d.metadata.clone(),
                similarity,
            })
            .collect()
    }

    /// Embed a free-text query and search
    pub async fn retrieve(
        &self,
        query: &str,
        embedder: &Embedder,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        if self.documents.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = embedder.embed(query).await?;
        Ok(self.search(&query_embedding, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{market, news, sentiment};
    use crate::data::ImpactLevel;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let mut kb = KnowledgeBase::load(dir.path().join("knowledge.json")).unwrap();
        kb.add("east".to_string(), json!({}), vec![1.0, 0.0]);
        kb.add("north".to_string(), json!({}), vec![0.0, 1.0]);
        kb.add("north-east".to_string(), json!({}), vec![0.7, 0.7]);
        kb.add("zero".to_string(), json!({}), vec![0.0, 0.0]);

        let results = kb.search(&[0.9, 0.1], 3);
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["east", "north-east", "north"]);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[test]
    fn test_duplicate_text_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut kb = KnowledgeBase::load(dir.path().join("knowledge.json")).unwrap();
        assert!(kb.add("same".to_string(), json!({}), vec![1.0]));
        assert!(!kb.add("same".to_string(), json!({"other": true}), vec![2.0]));
        assert_eq!(kb.len(), 1);
        assert_eq!(document_id("same").len(), 16);
    }

    #[test]
    fn test_signal_documents() {
        let signal = CombinedSignal::from_components(
            "BTC",
            Some(market("BTC", 50_000.0, 1.0)),
            vec![
                news("A", 0.5, ImpactLevel::Low),
                news("B", -0.5, ImpactLevel::High),
            ],
            Some(sentiment(50)),
            None,
        );
        let docs = signal_documents(&signal);
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].1["data_type"], "market_data");
        assert_eq!(docs[1].1["data_type"], "news");
        assert_eq!(docs[3].1["data_type"], "sentiment");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_db").join("knowledge.json");

        let mut kb = KnowledgeBase::load(&path).unwrap();
        kb.add("doc".to_string(), json!({"data_type": "news"}), vec![0.1, 0.2]);
        kb.save().unwrap();

        let reloaded = KnowledgeBase::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains(&document_id("doc")));
    }
}
