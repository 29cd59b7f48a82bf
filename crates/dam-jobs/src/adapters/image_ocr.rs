//! ImageOcr extraction adapter - synchronous text detection on one image.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use dam_core::{join_lines, ExtractionAdapter, ExtractionStrategy, Result, TextDetector};

/// Runs text detection on the stored image and joins the `LINE` blocks.
pub struct ImageOcrAdapter {
    detector: Arc<dyn TextDetector>,
}

impl ImageOcrAdapter {
    pub fn new(detector: Arc<dyn TextDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl ExtractionAdapter for ImageOcrAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::ImageOcr
    }

    async fn extract(&self, storage_key: &str) -> Result<String> {
        let blocks = self.detector.detect_text(storage_key).await?;
        debug!(storage_key, blocks = blocks.len(), "Text detected");
        Ok(join_lines(&blocks))
    }

    fn name(&self) -> &str {
        "image_ocr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_core::{BlockType, Error, TextBlock};
    use dam_inference::mock::MockTextDetector;

    #[tokio::test]
    async fn test_only_line_blocks_in_order() {
        let detector = Arc::new(MockTextDetector::with_blocks(vec![
            TextBlock {
                block_type: BlockType::Page,
                text: None,
            },
            TextBlock::line("EAU DE PARFUM"),
            TextBlock {
                block_type: BlockType::Word,
                text: Some("EAU".into()),
            },
            TextBlock::line("100 ml"),
        ]));
        let adapter = ImageOcrAdapter::new(detector.clone());

        let text = adapter.extract("documents/u/a.png").await.unwrap();
        assert_eq!(text, "EAU DE PARFUM\n100 ml");
        assert_eq!(detector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_lines_is_empty_text() {
        let adapter = ImageOcrAdapter::new(Arc::new(MockTextDetector::with_lines(&[])));
        assert_eq!(adapter.extract("documents/u/a.png").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_detector_error_propagates() {
        let adapter = ImageOcrAdapter::new(Arc::new(MockTextDetector::failing("throttled")));
        let err = adapter.extract("documents/u/a.png").await.unwrap_err();
        assert!(matches!(err, Error::Ocr(_)));
    }
}
