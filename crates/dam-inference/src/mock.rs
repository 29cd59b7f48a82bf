//! Deterministic test doubles for the remote collaborators.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dam_inference::mock::{MockLabelDetector, MockTranslator};
//!
//! let labels = MockLabelDetector::with_labels(&[("Bottle", 99.1), ("Perfume", 95.0)]);
//! let translator = MockTranslator::new().with_entry("Bottle", "Botella");
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dam_core::{
    defaults, EmbeddingBackend, Error, Label, LabelDetector, Result, TextBlock, TextDetectionJob,
    TextDetectionJobs, TextDetectionStatus, TextDetector, Translator, Vector,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
enum Behavior<T> {
    Return(T),
    Fail(String),
    Panic,
}

// =============================================================================
// TEXT DETECTION
// =============================================================================

/// Synchronous OCR double.
pub struct MockTextDetector {
    behavior: Behavior<Vec<TextBlock>>,
    calls: AtomicUsize,
}

impl MockTextDetector {
    /// Detect the given lines, in order.
    pub fn with_lines(lines: &[&str]) -> Self {
        Self::with_blocks(lines.iter().map(|l| TextBlock::line(*l)).collect())
    }

    pub fn with_blocks(blocks: Vec<TextBlock>) -> Self {
        Self {
            behavior: Behavior::Return(blocks),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextDetector for MockTextDetector {
    async fn detect_text(&self, _storage_key: &str) -> Result<Vec<TextBlock>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Return(blocks) => Ok(blocks.clone()),
            Behavior::Fail(msg) => Err(Error::Ocr(msg.clone())),
            Behavior::Panic => panic!("mock text detector panicked"),
        }
    }
}

/// Asynchronous OCR double that replays a scripted sequence of poll results.
///
/// Once the script is exhausted the last entry repeats.
pub struct MockTextDetectionJobs {
    start: Behavior<String>,
    script: Vec<TextDetectionJob>,
    polls: AtomicUsize,
}

impl MockTextDetectionJobs {
    pub fn with_script(script: Vec<TextDetectionJob>) -> Self {
        Self {
            start: Behavior::Return("job-1".to_string()),
            script,
            polls: AtomicUsize::new(0),
        }
    }

    /// `running_polls` running snapshots, then success with `lines`.
    pub fn succeeding_after(running_polls: usize, lines: &[&str]) -> Self {
        let mut script = vec![Self::running(); running_polls];
        script.push(TextDetectionJob {
            status: TextDetectionStatus::Succeeded,
            blocks: lines.iter().map(|l| TextBlock::line(*l)).collect(),
            message: None,
        });
        Self::with_script(script)
    }

    /// A job that never leaves `running`.
    pub fn never_finishing() -> Self {
        Self::with_script(vec![Self::running()])
    }

    /// A job that reports failure on the first poll.
    pub fn failing_job(message: &str) -> Self {
        Self::with_script(vec![TextDetectionJob {
            status: TextDetectionStatus::Failed,
            blocks: vec![],
            message: Some(message.to_string()),
        }])
    }

    /// Starting the job fails.
    pub fn failing_start(message: impl Into<String>) -> Self {
        Self {
            start: Behavior::Fail(message.into()),
            script: vec![],
            polls: AtomicUsize::new(0),
        }
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn running() -> TextDetectionJob {
        TextDetectionJob {
            status: TextDetectionStatus::Running,
            blocks: vec![],
            message: None,
        }
    }
}

#[async_trait]
impl TextDetectionJobs for MockTextDetectionJobs {
    async fn start_job(&self, _storage_key: &str) -> Result<String> {
        match &self.start {
            Behavior::Return(id) => Ok(id.clone()),
            Behavior::Fail(msg) => Err(Error::Ocr(msg.clone())),
            Behavior::Panic => panic!("mock text job start panicked"),
        }
    }

    async fn poll(&self, _job_id: &str) -> Result<TextDetectionJob> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        self.script
            .get(n)
            .or_else(|| self.script.last())
            .cloned()
            .ok_or_else(|| Error::Ocr("no scripted poll result".into()))
    }
}

// =============================================================================
// LABELS & TRANSLATION
// =============================================================================

/// Label detection double. Records the parameters of every call.
pub struct MockLabelDetector {
    behavior: Behavior<Vec<Label>>,
    calls: Mutex<Vec<(String, u32, f32)>>,
}

impl MockLabelDetector {
    pub fn with_labels(labels: &[(&str, f32)]) -> Self {
        Self::new(Behavior::Return(
            labels
                .iter()
                .map(|(name, confidence)| Label {
                    name: name.to_string(),
                    confidence: *confidence,
                })
                .collect(),
        ))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(Behavior::Fail(message.into()))
    }

    /// Panics when called, for exercising fault containment.
    pub fn panicking() -> Self {
        Self::new(Behavior::Panic)
    }

    fn new(behavior: Behavior<Vec<Label>>) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(storage_key, max_labels, min_confidence)` per call.
    pub fn calls(&self) -> Vec<(String, u32, f32)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LabelDetector for MockLabelDetector {
    async fn detect_labels(
        &self,
        storage_key: &str,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<Label>> {
        lock(&self.calls).push((storage_key.to_string(), max_labels, min_confidence));
        match &self.behavior {
            Behavior::Return(labels) => Ok(labels
                .iter()
                .filter(|l| l.confidence >= min_confidence)
                .take(max_labels as usize)
                .cloned()
                .collect()),
            Behavior::Fail(msg) => Err(Error::Vision(msg.clone())),
            Behavior::Panic => panic!("mock label detector panicked"),
        }
    }
}

/// Dictionary translator; unknown words fail.
#[derive(Default)]
pub struct MockTranslator {
    entries: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, from: &str, to: &str) -> Self {
        self.entries.insert(from.to_string(), to.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries.get(text).cloned().ok_or_else(|| {
            Error::Translation(format!(
                "no translation for '{}' ({} -> {})",
                text, source_lang, target_lang
            ))
        })
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Embedding double producing deterministic unit-range vectors.
pub struct MockEmbeddingBackend {
    behavior: Behavior<()>,
    dimension: usize,
    output_dimension: usize,
    calls: AtomicUsize,
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self {
            behavior: Behavior::Return(()),
            dimension: defaults::EMBED_DIMENSION,
            output_dimension: defaults::EMBED_DIMENSION,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behavior: Behavior::Fail(message.into()),
            ..Self::default()
        }
    }

    /// Advertise the standard dimension but return vectors of `actual` length.
    pub fn with_wrong_dimension(actual: usize) -> Self {
        Self {
            output_dimension: actual,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deterministic vector for `text`.
    pub fn vector_for(text: &str, dimension: usize) -> Vector {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        Vector::from(
            (0..dimension)
                .map(|_| rng.gen_range(-1.0f32..=1.0))
                .collect::<Vec<f32>>(),
        )
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Return(()) => Ok(texts
                .iter()
                .map(|t| Self::vector_for(t, self.output_dimension))
                .collect()),
            Behavior::Fail(msg) => Err(Error::Embedding(msg.clone())),
            Behavior::Panic => panic!("mock embedding backend panicked"),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_label_detector_applies_thresholds() {
        let detector = MockLabelDetector::with_labels(&[
            ("Bottle", 99.0),
            ("Blur", 50.0),
            ("Perfume", 95.0),
        ]);
        let labels = detector.detect_labels("k.png", 1, 90.0).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name, "Bottle");
        assert_eq!(detector.calls(), vec![("k.png".to_string(), 1, 90.0)]);
    }

    #[tokio::test]
    async fn test_translator_unknown_word_fails() {
        let translator = MockTranslator::new().with_entry("Bottle", "Botella");
        assert_eq!(
            translator.translate("Bottle", "en", "es").await.unwrap(),
            "Botella"
        );
        assert!(matches!(
            translator.translate("Perfume", "en", "es").await,
            Err(Error::Translation(_))
        ));
        assert_eq!(translator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_job_script_repeats_last_entry() {
        let jobs = MockTextDetectionJobs::succeeding_after(2, &["a"]);
        let id = jobs.start_job("k.pdf").await.unwrap();
        for _ in 0..2 {
            assert_eq!(
                jobs.poll(&id).await.unwrap().status,
                TextDetectionStatus::Running
            );
        }
        for _ in 0..2 {
            assert_eq!(
                jobs.poll(&id).await.unwrap().status,
                TextDetectionStatus::Succeeded
            );
        }
        assert_eq!(jobs.poll_count(), 4);
    }

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let backend = MockEmbeddingBackend::new();
        let a = backend.embed_texts(&["same".into()]).await.unwrap();
        let b = backend.embed_texts(&["same".into()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].as_slice().len(), 1536);
        assert!(a[0].as_slice().iter().all(|x| (-1.0..=1.0).contains(x)));
    }
}
