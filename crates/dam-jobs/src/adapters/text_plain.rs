//! PlainText extraction adapter - strict UTF-8 read of `.txt` objects.

use std::sync::Arc;

use async_trait::async_trait;

use dam_core::{Error, ExtractionAdapter, ExtractionStrategy, ObjectStorage, Result};

/// Reads the stored object and decodes it as UTF-8.
///
/// Invalid sequences are an error rather than being replaced, so a binary
/// file misnamed `.txt` surfaces as a failed extraction instead of garbage.
pub struct PlainTextAdapter {
    storage: Arc<dyn ObjectStorage>,
}

impl PlainTextAdapter {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ExtractionAdapter for PlainTextAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::PlainText
    }

    async fn extract(&self, storage_key: &str) -> Result<String> {
        let bytes = self.storage.get_object(storage_key).await?;
        String::from_utf8(bytes).map_err(|e| Error::Parse(format!("invalid UTF-8: {}", e)))
    }

    fn name(&self) -> &str {
        "plain_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_db::InMemoryObjectStorage;

    fn adapter(data: &[u8]) -> PlainTextAdapter {
        PlainTextAdapter::new(Arc::new(
            InMemoryObjectStorage::new().with_object("documents/u/a.txt", data),
        ))
    }

    #[tokio::test]
    async fn test_reads_utf8() {
        let text = adapter(b"hello world")
            .extract("documents/u/a.txt")
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_multibyte_is_preserved() {
        let text = adapter("Crème brûlée\n".as_bytes())
            .extract("documents/u/a.txt")
            .await
            .unwrap();
        assert_eq!(text, "Crème brûlée\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_error() {
        let err = adapter(&[0x68, 0xff, 0xfe])
            .extract("documents/u/a.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_object_is_error() {
        let err = adapter(b"")
            .extract("documents/u/missing.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
