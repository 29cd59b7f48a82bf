//! Docx extraction adapter - text runs from the OOXML main document part.

use std::io::{Cursor, Read};
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use dam_core::{defaults, Error, ExtractionAdapter, ExtractionStrategy, ObjectStorage, Result};

/// Element holding a run of visible text.
const TEXT_ELEMENT: &[u8] = b"w:t";

/// Unzips a `.docx` and returns the text of every `w:t` element, in document
/// order, joined with `\n`.
pub struct DocxAdapter {
    storage: Arc<dyn ObjectStorage>,
}

impl DocxAdapter {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ExtractionAdapter for DocxAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Docx
    }

    async fn extract(&self, storage_key: &str) -> Result<String> {
        let bytes = self.storage.get_object(storage_key).await?;
        let xml = read_document_part(bytes)?;
        let runs = text_runs(&xml)?;
        debug!(storage_key, runs = runs.len(), "Parsed docx body");
        Ok(runs.join("\n"))
    }

    fn name(&self) -> &str {
        "docx"
    }
}

fn read_document_part(bytes: Vec<u8>) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Parse(format!("not a docx archive: {}", e)))?;
    let mut part = archive
        .by_name(defaults::DOCX_BODY_ENTRY)
        .map_err(|e| Error::Parse(format!("{}: {}", defaults::DOCX_BODY_ENTRY, e)))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Text content of each `w:t` element that has any. Empty and self-closing
/// elements contribute nothing.
fn text_runs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut runs = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == TEXT_ELEMENT => {
                current = Some(String::new());
            }
            Ok(Event::Text(t)) => {
                if let Some(run) = current.as_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::Parse(format!("bad text run: {}", e)))?;
                    run.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(run) = current.as_mut() {
                    run.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == TEXT_ELEMENT => {
                if let Some(run) = current.take().filter(|r| !r.is_empty()) {
                    runs.push(run);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Parse(format!(
                    "malformed document XML at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_db::InMemoryObjectStorage;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const KEY: &str = "documents/u/brief.docx";

    fn body(runs: &[&str]) -> String {
        let paragraphs: String = runs
            .iter()
            .map(|r| format!(r#"<w:p><w:r><w:t xml:space="preserve">{r}</w:t></w:r></w:p>"#))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraphs}</w:body></w:document>"#
        )
    }

    fn docx(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn adapter(data: Vec<u8>) -> DocxAdapter {
        DocxAdapter::new(Arc::new(InMemoryObjectStorage::new().with_object(KEY, data)))
    }

    #[tokio::test]
    async fn test_runs_joined_with_newline() {
        let data = docx(&[
            ("[Content_Types].xml", "<Types/>"),
            ("word/document.xml", &body(&["Hello", "World"])),
        ]);
        assert_eq!(adapter(data).extract(KEY).await.unwrap(), "Hello\nWorld");
    }

    #[tokio::test]
    async fn test_entities_are_unescaped() {
        let data = docx(&[("word/document.xml", &body(&["Salt &amp; Pepper"]))]);
        assert_eq!(adapter(data).extract(KEY).await.unwrap(), "Salt & Pepper");
    }

    #[tokio::test]
    async fn test_missing_body_part_is_error() {
        let data = docx(&[("word/styles.xml", "<w:styles/>")]);
        let err = adapter(data).extract(KEY).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_not_a_zip_is_error() {
        let err = adapter(b"plain text, not a zip".to_vec())
            .extract(KEY)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_ignores_text_outside_runs() {
        let xml = r#"<w:document><w:body><w:p><w:pPr>style</w:pPr><w:r><w:t>Only</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(text_runs(xml).unwrap(), vec!["Only".to_string()]);
    }

    #[test]
    fn test_empty_runs_are_skipped() {
        let xml = concat!(
            "<w:document><w:body>",
            "<w:p><w:r><w:t>Hello</w:t></w:r></w:p>",
            "<w:p><w:r><w:t/></w:r></w:p>",
            "<w:p><w:r><w:t></w:t></w:r></w:p>",
            "<w:p><w:r><w:t>World</w:t></w:r></w:p>",
            "</w:body></w:document>"
        );
        assert_eq!(text_runs(xml).unwrap().join("\n"), "Hello\nWorld");
    }

    #[test]
    fn test_unclosed_tag_is_error() {
        assert!(text_runs("<w:document><w:t>dangling</w:document>").is_err());
    }
}
