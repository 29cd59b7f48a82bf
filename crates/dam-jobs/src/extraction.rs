//! Extraction router: picks the adapter for a file extension and folds every
//! fault into a [`StageOutcome`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use dam_core::{defaults, ExtractionAdapter, ExtractionStrategy, OutcomeKind, StageOutcome};

use crate::guard::contained;

/// Registry of extraction adapters keyed by strategy.
pub struct ExtractionRouter {
    adapters: HashMap<ExtractionStrategy, Arc<dyn ExtractionAdapter>>,
    call_timeout: Duration,
}

impl Default for ExtractionRouter {
    fn default() -> Self {
        Self::new(Duration::from_secs(defaults::CALL_TIMEOUT_SECS))
    }
}

impl ExtractionRouter {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            call_timeout,
        }
    }

    /// Register an adapter. Replaces any adapter for the same strategy.
    pub fn register(&mut self, adapter: Arc<dyn ExtractionAdapter>) {
        self.adapters.insert(adapter.strategy(), adapter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_adapter(mut self, adapter: Arc<dyn ExtractionAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn has_adapter(&self, strategy: ExtractionStrategy) -> bool {
        self.adapters.contains_key(&strategy)
    }

    pub fn available_strategies(&self) -> Vec<ExtractionStrategy> {
        self.adapters.keys().copied().collect()
    }

    /// PDF jobs bound themselves by their polling schedule; everything else
    /// gets the per-call timeout.
    fn deadline(&self, strategy: ExtractionStrategy) -> Option<Duration> {
        match strategy {
            ExtractionStrategy::PdfOcr => None,
            _ => Some(self.call_timeout),
        }
    }

    /// Extract text from the object at `storage_key`.
    ///
    /// Never fails: unknown extensions yield the unsupported-format notice as
    /// a successful outcome, and adapter errors, timeouts and panics become
    /// [`StageOutcome::Failed`].
    pub async fn extract_text(&self, storage_key: &str, extension: &str) -> StageOutcome<String> {
        let extension = extension.to_ascii_lowercase();
        let Some(strategy) = ExtractionStrategy::from_extension(&extension) else {
            debug!(storage_key, extension = %extension, "No extraction strategy for extension");
            return StageOutcome::Ok(defaults::UNSUPPORTED_FORMAT_TEXT.to_string());
        };
        let Some(adapter) = self.adapters.get(&strategy) else {
            warn!(
                storage_key,
                strategy = strategy.as_str(),
                "No extraction adapter registered"
            );
            return StageOutcome::Failed(format!(
                "no adapter registered for {}",
                strategy.as_str()
            ));
        };

        let start = Instant::now();
        let result = contained(
            adapter.name(),
            self.deadline(strategy),
            adapter.extract(storage_key),
        )
        .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(text) => {
                debug!(
                    storage_key,
                    adapter = adapter.name(),
                    text_len = text.len(),
                    duration_ms,
                    "Extraction complete"
                );
                StageOutcome::Ok(text)
            }
            Err(reason) => {
                warn!(
                    storage_key,
                    adapter = adapter.name(),
                    duration_ms,
                    error = %reason,
                    "Extraction failed"
                );
                StageOutcome::Failed(reason)
            }
        }
    }
}

/// Display form of an extraction outcome.
///
/// A failed extraction still has a human-readable text, the read-error
/// placeholder, but no usable text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub kind: OutcomeKind,
}

impl ExtractedText {
    /// Text fit for persistence and embedding, `None` after a failure.
    pub fn usable(&self) -> Option<&str> {
        match self.kind {
            OutcomeKind::Failed => None,
            _ => Some(&self.text),
        }
    }
}

impl From<StageOutcome<String>> for ExtractedText {
    fn from(outcome: StageOutcome<String>) -> Self {
        let kind = outcome.kind();
        let text = match outcome {
            StageOutcome::Ok(text) | StageOutcome::Partial(text, _) => text,
            StageOutcome::Failed(reason) => {
                format!("{}{}", defaults::EXTRACTION_ERROR_PREFIX, reason)
            }
        };
        Self { text, kind }
    }
}

impl std::fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
