//! Visual analysis stage: label detection with optional translation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use dam_core::{defaults, LabelDetector, StageOutcome, Translator};

use crate::guard::contained;

/// Language pair for label translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationConfig {
    pub source_lang: String,
    pub target_lang: String,
}

/// Tuning for [`VisualStage`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisualConfig {
    /// Labels below this confidence (percent) are dropped.
    pub min_confidence: f32,
    pub max_labels: u32,
    pub call_timeout: Duration,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            min_confidence: defaults::LABEL_MIN_CONFIDENCE,
            max_labels: defaults::LABEL_MAX_COUNT,
            call_timeout: Duration::from_secs(defaults::CALL_TIMEOUT_SECS),
        }
    }
}

/// Detects labels on images and optionally translates each of them.
pub struct VisualStage {
    detector: Arc<dyn LabelDetector>,
    translation: Option<(Arc<dyn Translator>, TranslationConfig)>,
    config: VisualConfig,
}

impl VisualStage {
    pub fn new(detector: Arc<dyn LabelDetector>, config: VisualConfig) -> Self {
        Self {
            detector,
            translation: None,
            config,
        }
    }

    /// Translate every detected label from `languages.source_lang` to
    /// `languages.target_lang`.
    pub fn with_translation(
        mut self,
        translator: Arc<dyn Translator>,
        languages: TranslationConfig,
    ) -> Self {
        self.translation = Some((translator, languages));
        self
    }

    /// Whether label detection runs for this extension.
    pub fn applies_to(extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        defaults::LABEL_IMAGE_EXTENSIONS.contains(&ext.as_str())
    }

    /// Label names for the image at `storage_key`.
    ///
    /// A failed translation keeps the original name and downgrades the
    /// outcome to `Partial`. Only a failed detection is `Failed`.
    pub async fn detect_labels(&self, storage_key: &str) -> StageOutcome<Vec<String>> {
        let detected = contained(
            "label detection",
            Some(self.config.call_timeout),
            self.detector.detect_labels(
                storage_key,
                self.config.max_labels,
                self.config.min_confidence,
            ),
        )
        .await;

        let labels = match detected {
            Ok(labels) => labels,
            Err(reason) => {
                warn!(storage_key, error = %reason, "Label detection failed");
                return StageOutcome::Failed(reason);
            }
        };

        let names: Vec<String> = labels
            .into_iter()
            .filter(|l| l.confidence >= self.config.min_confidence)
            .take(self.config.max_labels as usize)
            .map(|l| l.name)
            .collect();
        debug!(storage_key, label_count = names.len(), "Labels detected");

        match &self.translation {
            Some((translator, languages)) => {
                self.translate_all(translator.as_ref(), languages, names)
                    .await
            }
            None => StageOutcome::Ok(names),
        }
    }

    async fn translate_all(
        &self,
        translator: &dyn Translator,
        languages: &TranslationConfig,
        names: Vec<String>,
    ) -> StageOutcome<Vec<String>> {
        let mut translated = Vec::with_capacity(names.len());
        let mut warnings = Vec::new();

        for name in names {
            let result = contained(
                "translation",
                Some(self.config.call_timeout),
                translator.translate(&name, &languages.source_lang, &languages.target_lang),
            )
            .await;
            match result {
                Ok(text) => translated.push(text),
                Err(reason) => {
                    warn!(label = %name, error = %reason, "Label translation failed, keeping original");
                    warnings.push(format!("translation of '{}' failed: {}", name, reason));
                    translated.push(name);
                }
            }
        }

        if warnings.is_empty() {
            StageOutcome::Ok(translated)
        } else {
            StageOutcome::Partial(translated, warnings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_core::OutcomeKind;
    use dam_inference::mock::{MockLabelDetector, MockTranslator};

    const KEY: &str = "documents/u/shelf.png";

    fn spanish() -> TranslationConfig {
        TranslationConfig {
            source_lang: "en".into(),
            target_lang: "es".into(),
        }
    }

    #[test]
    fn test_applies_only_to_label_images() {
        for ext in ["jpg", "jpeg", "png", "PNG"] {
            assert!(VisualStage::applies_to(ext), "{ext}");
        }
        for ext in ["tiff", "tif", "pdf", "txt", "docx", ""] {
            assert!(!VisualStage::applies_to(ext), "{ext}");
        }
    }

    #[tokio::test]
    async fn test_labels_without_translation() {
        let detector = Arc::new(MockLabelDetector::with_labels(&[
            ("Bottle", 99.1),
            ("Perfume", 95.0),
            ("Cosmetics", 42.0),
        ]));
        let stage = VisualStage::new(detector.clone(), VisualConfig::default());

        let outcome = stage.detect_labels(KEY).await;
        assert_eq!(
            outcome,
            StageOutcome::Ok(vec!["Bottle".to_string(), "Perfume".to_string()])
        );
        assert_eq!(detector.calls(), vec![(KEY.to_string(), 5, 90.0)]);
    }

    #[tokio::test]
    async fn test_failed_translation_keeps_original() {
        let detector = Arc::new(MockLabelDetector::with_labels(&[
            ("Bottle", 99.0),
            ("Perfume", 97.0),
        ]));
        let translator = Arc::new(MockTranslator::new().with_entry("Bottle", "Botella"));
        let stage = VisualStage::new(detector, VisualConfig::default())
            .with_translation(translator.clone(), spanish());

        let outcome = stage.detect_labels(KEY).await;
        assert_eq!(outcome.kind(), OutcomeKind::Partial);
        assert_eq!(
            outcome.value().unwrap(),
            &vec!["Botella".to_string(), "Perfume".to_string()]
        );
        assert_eq!(outcome.warnings().len(), 1);
        assert!(outcome.warnings()[0].contains("Perfume"));
        assert_eq!(translator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_all_translated_is_ok() {
        let detector = Arc::new(MockLabelDetector::with_labels(&[("Bottle", 99.0)]));
        let translator = Arc::new(MockTranslator::new().with_entry("Bottle", "Botella"));
        let stage = VisualStage::new(detector, VisualConfig::default())
            .with_translation(translator, spanish());

        assert_eq!(
            stage.detect_labels(KEY).await,
            StageOutcome::Ok(vec!["Botella".to_string()])
        );
    }

    #[tokio::test]
    async fn test_no_labels_is_ok_and_empty() {
        let detector = Arc::new(MockLabelDetector::with_labels(&[]));
        let stage = VisualStage::new(detector, VisualConfig::default());
        assert_eq!(stage.detect_labels(KEY).await, StageOutcome::Ok(vec![]));
    }

    #[tokio::test]
    async fn test_max_labels_is_respected() {
        let detector = Arc::new(MockLabelDetector::with_labels(&[
            ("A", 99.0),
            ("B", 98.0),
            ("C", 97.0),
        ]));
        let stage = VisualStage::new(
            detector,
            VisualConfig {
                max_labels: 2,
                ..VisualConfig::default()
            },
        );
        assert_eq!(stage.detect_labels(KEY).await.value().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_detection_failure_is_failed() {
        let stage = VisualStage::new(
            Arc::new(MockLabelDetector::failing("access denied")),
            VisualConfig::default(),
        );
        let outcome = stage.detect_labels(KEY).await;
        assert!(outcome.is_failed());
        assert!(outcome.reason().unwrap().contains("access denied"));
    }

    #[tokio::test]
    async fn test_detector_panic_is_failed() {
        let stage = VisualStage::new(
            Arc::new(MockLabelDetector::panicking()),
            VisualConfig::default(),
        );
        assert!(stage.detect_labels(KEY).await.is_failed());
    }
}
