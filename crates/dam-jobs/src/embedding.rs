//! Embedding stage: a fixed-dimension vector for the extracted text.
//!
//! Two explicit modes. `Provider` calls the configured [`EmbeddingBackend`];
//! `Simulated` fabricates a deterministic pseudo-random vector so local runs
//! and tests work without a provider.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use dam_core::{defaults, EmbeddingBackend, Error, StageOutcome, Vector};

use crate::guard::contained;

/// How the embedding stage produces vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingMode {
    Provider,
    #[default]
    Simulated,
}

impl EmbeddingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Simulated => "simulated",
        }
    }
}

impl FromStr for EmbeddingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "provider" => Ok(Self::Provider),
            "simulated" => Ok(Self::Simulated),
            other => Err(Error::Config(format!(
                "unknown embedding mode '{}' (expected provider or simulated)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Source {
    Provider {
        backend: Arc<dyn EmbeddingBackend>,
        call_timeout: Duration,
    },
    Simulated {
        dimension: usize,
    },
}

/// Produces one embedding per document.
pub struct EmbeddingStage {
    source: Source,
}

impl EmbeddingStage {
    /// Embed through `backend`, whose advertised dimension is enforced.
    pub fn provider(backend: Arc<dyn EmbeddingBackend>, call_timeout: Duration) -> Self {
        Self {
            source: Source::Provider {
                backend,
                call_timeout,
            },
        }
    }

    /// Fabricate vectors of the document schema's dimension.
    pub fn simulated() -> Self {
        Self::simulated_with_dimension(defaults::EMBED_DIMENSION)
    }

    pub fn simulated_with_dimension(dimension: usize) -> Self {
        Self {
            source: Source::Simulated { dimension },
        }
    }

    pub fn mode(&self) -> EmbeddingMode {
        match self.source {
            Source::Provider { .. } => EmbeddingMode::Provider,
            Source::Simulated { .. } => EmbeddingMode::Simulated,
        }
    }

    /// Embedding for `text`. Never fails past this boundary.
    pub async fn embed(&self, text: &str) -> StageOutcome<Vector> {
        match &self.source {
            Source::Simulated { dimension } => {
                debug!(text_len = text.len(), "Simulating embedding");
                StageOutcome::Ok(simulate(text, *dimension))
            }
            Source::Provider {
                backend,
                call_timeout,
            } => {
                let outcome = embed_with(backend.as_ref(), *call_timeout, text).await;
                if let Some(reason) = outcome.reason() {
                    warn!(model = backend.model_name(), error = %reason, "Embedding failed");
                }
                outcome
            }
        }
    }
}

async fn embed_with(
    backend: &dyn EmbeddingBackend,
    call_timeout: Duration,
    text: &str,
) -> StageOutcome<Vector> {
    if text.trim().is_empty() {
        return StageOutcome::Failed("no text to embed".to_string());
    }

    let input = [text.to_string()];
    let vectors = match contained("embedding", Some(call_timeout), backend.embed_texts(&input))
        .await
    {
        Ok(vectors) => vectors,
        Err(reason) => return StageOutcome::Failed(reason),
    };

    let Some(vector) = vectors.into_iter().next() else {
        return StageOutcome::Failed("provider returned no embedding".to_string());
    };
    let expected = backend.dimension();
    let actual = vector.as_slice().len();
    if actual != expected {
        return StageOutcome::Failed(format!(
            "dimension mismatch: expected {}, got {}",
            expected, actual
        ));
    }
    debug!(model = backend.model_name(), dimension = actual, "Embedding generated");
    StageOutcome::Ok(vector)
}

/// Deterministic pseudo-random vector with components in `[-1, 1]`.
///
/// The generator is seeded from the BLAKE3 hash of `text`, so equal inputs
/// always produce equal vectors across processes and platforms.
pub fn simulate(text: &str, dimension: usize) -> Vector {
    let seed = *blake3::hash(text.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);
    Vector::from(
        (0..dimension)
            .map(|_| rng.gen_range(-1.0f32..=1.0))
            .collect::<Vec<f32>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_inference::mock::MockEmbeddingBackend;

    fn provider(backend: MockEmbeddingBackend) -> (Arc<MockEmbeddingBackend>, EmbeddingStage) {
        let backend = Arc::new(backend);
        let stage = EmbeddingStage::provider(backend.clone(), Duration::from_secs(30));
        (backend, stage)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("provider".parse::<EmbeddingMode>().unwrap(), EmbeddingMode::Provider);
        assert_eq!(" Simulated ".parse::<EmbeddingMode>().unwrap(), EmbeddingMode::Simulated);
        assert!("openai".parse::<EmbeddingMode>().is_err());
        assert_eq!(EmbeddingMode::default(), EmbeddingMode::Simulated);
    }

    #[test]
    fn test_simulated_is_deterministic_and_bounded() {
        let a = simulate("hello world", 1536);
        let b = simulate("hello world", 1536);
        let c = simulate("hello there", 1536);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_slice().len(), 1536);
        assert!(a.as_slice().iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[tokio::test]
    async fn test_simulated_embeds_empty_text() {
        let stage = EmbeddingStage::simulated();
        assert_eq!(stage.mode(), EmbeddingMode::Simulated);
        let outcome = stage.embed("").await;
        assert_eq!(outcome.value().unwrap().as_slice().len(), 1536);
    }

    #[tokio::test]
    async fn test_provider_success() {
        let (backend, stage) = provider(MockEmbeddingBackend::new());
        assert_eq!(stage.mode(), EmbeddingMode::Provider);

        let outcome = stage.embed("hello world").await;
        assert_eq!(
            outcome,
            StageOutcome::Ok(MockEmbeddingBackend::vector_for("hello world", 1536))
        );
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_skips_empty_text() {
        let (backend, stage) = provider(MockEmbeddingBackend::new());
        let outcome = stage.embed("   ").await;
        assert_eq!(outcome.reason(), Some("no text to embed"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_is_failed() {
        let (_, stage) = provider(MockEmbeddingBackend::failing("rate limited"));
        let outcome = stage.embed("hello").await;
        assert!(outcome.reason().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_failed() {
        let (_, stage) = provider(MockEmbeddingBackend::with_wrong_dimension(768));
        let outcome = stage.embed("hello").await;
        assert_eq!(
            outcome.reason(),
            Some("dimension mismatch: expected 1536, got 768")
        );
    }
}
