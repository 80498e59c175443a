use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::join_all;
use lru::LruCache;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Output dimension of the embedding model.
pub const EMBEDDING_DIM: usize = 1536;
/// Embedding model identifier.
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Inputs per request batch.
const BATCH_SIZE: usize = 10;
/// Pause between batches to stay inside provider rate limits.
const BATCH_PAUSE_MS: u64 = 1000;
/// Single-input vector cache bound.
const CACHE_CAP: usize = 1000;

/// Batched, rate-limit-aware vectorizer.
///
/// A failed input yields `None` and the batch continues — callers keep the
/// chunk and treat it as excluded from similarity search.
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: crate::http_client(),
            api_key,
            base_url,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAP).expect("cap is non-zero"),
            )),
        }
    }

    /// Vectorize `texts`, preserving order. Processes batches of 10 with a
    /// 1 s pause in between; calls within a batch run concurrently.
    pub async fn embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(Duration::from_millis(BATCH_PAUSE_MS)).await;
            }

            let calls = batch.iter().map(|text| self.embed_one(text));
            let results = join_all(calls).await;
            debug!(
                batch = batch_index,
                size = batch.len(),
                failed = results.iter().filter(|r| r.is_none()).count(),
                "embedding batch done"
            );
            out.extend(results);
        }
        out
    }

    /// Vectorize a single query string.
    pub async fn embed_query(&self, text: &str) -> Option<Vec<f32>> {
        self.embed_one(text).await
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        if let Some(hit) = self.cache.lock().unwrap().get(text) {
            return Some(hit.clone());
        }

        match self.request_embedding(text).await {
            Ok(vector) => {
                self.cache
                    .lock()
                    .unwrap()
                    .put(text.to_string(), vector.clone());
                Some(vector)
            }
            Err(e) => {
                warn!(error = %e, "embedding call failed; storing null vector");
                None
            }
        }
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": EMBEDDING_MODEL,
                "input": text,
            }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(ProviderError::Api {
                status,
                message: format!("embedding request failed with status {status}"),
            });
        }

        let body: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Parse("empty embedding response".to_string()))?;

        if vector.len() != EMBEDDING_DIM {
            return Err(ProviderError::Parse(format!(
                "expected {EMBEDDING_DIM}-dim vector, got {}",
                vector.len()
            )));
        }
        Ok(vector)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_evicts_oldest_on_overflow() {
        let client = EmbeddingClient::new("k".to_string(), "http://unused".to_string());
        {
            let mut cache = client.cache.lock().unwrap();
            for i in 0..CACHE_CAP + 1 {
                cache.put(format!("text-{i}"), vec![i as f32]);
            }
            assert_eq!(cache.len(), CACHE_CAP);
            assert!(!cache.contains("text-0"));
            assert!(cache.contains(&format!("text-{CACHE_CAP}")));
        }
    }

    #[test]
    fn embedding_response_parses() {
        let body = r#"{"data":[{"embedding":[0.1,0.2]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }
}
