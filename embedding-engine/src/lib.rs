pub mod clustering;
pub mod embedder;
pub mod similarity;

pub use clustering::ward_clusters;
pub use embedder::{BertEmbedder, Embedder};
pub use similarity::{cosine_similarity, max_similarity, mean_similarity, DiversityFilter, Verdict};

use keyharvest_core::{CoreError, EmbeddingConfig, EmbeddingError};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared handle to the embedding model.
///
/// Constructed once per process and passed to every stage that needs vectors.
/// Inference runs on the blocking pool in chunks of `batch_size`.
#[derive(Clone)]
pub struct EmbeddingEngine {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingEngine {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Load the BERT model described by `config`.
    pub async fn load(config: &EmbeddingConfig) -> Result<Self, CoreError> {
        info!("Loading embedding model from {}", config.model_dir.display());
        let owned = config.clone();
        let embedder = tokio::task::spawn_blocking(move || BertEmbedder::load(&owned))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("Embedding model loader panicked: {}", e),
            })??;
        Ok(Self::new(Arc::new(embedder), config.batch_size))
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed `texts` in order. An empty input yields an empty output.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let embedder = Arc::clone(&self.embedder);
            let chunk = chunk.to_vec();
            let embedded = tokio::task::spawn_blocking(move || embedder.embed(&chunk))
                .await
                .map_err(|e| CoreError::Internal {
                    message: format!("Embedding task panicked: {}", e),
                })??;
            vectors.extend(embedded);
        }

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InferenceFailed {
                reason: format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            }
            .into());
        }
        let expected = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            }
            .into());
        }

        debug!("Embedded {} texts", texts.len());
        Ok(vectors)
    }

    /// Embed seeds and candidates, scoring each candidate by its closest seed.
    pub async fn similarity_to_seeds(
        &self,
        seeds: &[String],
        candidates: &[String],
    ) -> Result<SeedSimilarity, CoreError> {
        let seed_vectors = self.embed_batch(seeds).await?;
        let candidate_vectors = self.embed_batch(candidates).await?;
        let similarities = candidate_vectors
            .iter()
            .map(|vector| max_similarity(vector, &seed_vectors))
            .collect();
        Ok(SeedSimilarity {
            seed_vectors,
            candidate_vectors,
            similarities,
        })
    }
}

/// Vectors from [`EmbeddingEngine::similarity_to_seeds`], kept for the
/// diversity check and clustering.
#[derive(Debug, Clone)]
pub struct SeedSimilarity {
    pub seed_vectors: Vec<Vec<f32>>,
    pub candidate_vectors: Vec<Vec<f32>>,
    /// Highest similarity of each candidate to any seed.
    pub similarities: Vec<f64>,
}

impl std::fmt::Debug for EmbeddingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingEngine")
            .field("dimension", &self.embedder.dimension())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Looks vectors up by text; unknown texts map to the last axis.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 3])]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for TableEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| self.table.get(t).cloned().unwrap_or(vec![0.0, 0.0, 1.0]))
                .collect())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_embed_batch_chunks_and_preserves_order() {
        let embedder = Arc::new(TableEmbedder::new(&[
            ("a", [1.0, 0.0, 0.0]),
            ("b", [0.0, 1.0, 0.0]),
        ]));
        let engine = EmbeddingEngine::new(embedder.clone(), 2);

        let vectors = engine
            .embed_batch(&strings(&["a", "b", "c", "a", "b"]))
            .await
            .unwrap();
        assert_eq!(vectors.len(), 5);
        assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(vectors[2], vec![0.0, 0.0, 1.0]);
        assert_eq!(vectors[4], vec![0.0, 1.0, 0.0]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_model() {
        let embedder = Arc::new(TableEmbedder::new(&[]));
        let engine = EmbeddingEngine::new(embedder.clone(), 8);
        assert!(engine.embed_batch(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_similarity_to_seeds_takes_maximum() {
        let engine = EmbeddingEngine::new(
            Arc::new(TableEmbedder::new(&[
                ("cloud gaming", [1.0, 0.0, 0.0]),
                ("ai ethics", [0.0, 1.0, 0.0]),
                ("cloud gaming pc", [0.8, 0.6, 0.0]),
            ])),
            16,
        );

        let result = engine
            .similarity_to_seeds(
                &strings(&["cloud gaming", "ai ethics"]),
                &strings(&["cloud gaming pc", "unrelated"]),
            )
            .await
            .unwrap();
        assert_eq!(result.seed_vectors.len(), 2);
        assert_eq!(result.candidate_vectors[0], vec![0.8, 0.6, 0.0]);
        assert!((result.similarities[0] - 0.8).abs() < 1e-6);
        assert_eq!(result.similarities[1], 0.0);
    }

    struct WrongDimension;

    impl Embedder for WrongDimension {
        fn dimension(&self) -> usize {
            4
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let engine = EmbeddingEngine::new(Arc::new(WrongDimension), 4);
        let result = engine.embed_batch(&strings(&["x"])).await;
        assert!(matches!(
            result,
            Err(CoreError::Embedding(EmbeddingError::DimensionMismatch {
                expected: 4,
                actual: 2
            }))
        ));
    }
}
