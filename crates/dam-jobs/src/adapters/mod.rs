//! Extraction adapter implementations, one per [`dam_core::ExtractionStrategy`].

pub mod docx;
pub mod image_ocr;
pub mod pdf_ocr;
pub mod text_plain;

pub use docx::DocxAdapter;
pub use image_ocr::ImageOcrAdapter;
pub use pdf_ocr::{PdfOcrAdapter, PollConfig};
pub use text_plain::PlainTextAdapter;
