//! Probe a PDF for embedded text with `pdftotext` from `poppler-utils`.
//!
//! This misses any "non-searchable" text in a PDF, but when a PDF was
//! generated digitally it's far faster and more accurate than OCR.

use crate::{
    prelude::*,
    tools::{Tool, ToolRunner, tool_args},
};

/// How much embedded text we need before we skip OCR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddedTextPolicy {
    /// Any non-whitespace text at all is good enough.
    AnyText,
    /// We need more than this many characters. Short text is often just a
    /// watermark or a page header on an otherwise scanned document.
    MoreThan(usize),
}

/// The threshold used when we OCR rasterized pages ourselves.
pub const MIN_EMBEDDED_TEXT_CHARS: usize = 100;

impl EmbeddedTextPolicy {
    /// Is `text` (already trimmed) good enough to return without OCR?
    pub fn accepts(self, text: &str) -> bool {
        match self {
            Self::AnyText => !text.is_empty(),
            Self::MoreThan(min) => text.chars().count() > min,
        }
    }
}

/// Extract embedded text from `pdf`, preserving layout.
///
/// Returns the trimmed text. Any failure just gives us an empty string,
/// which tells the caller to fall back to OCR.
#[instrument(level = "debug", skip_all, fields(pdf = %pdf.display()))]
pub async fn extract_embedded_text(runner: &dyn ToolRunner, pdf: &Path) -> String {
    let output = runner
        .run(Tool::PdfToText, &tool_args!["-layout", pdf, "-"])
        .await;
    let text = output.stdout.trim();
    if Tool::PdfToText.classify(&output, !text.is_empty()).is_usable() {
        debug!(chars = text.chars().count(), "Found embedded text");
        text.to_owned()
    } else {
        debug!(
            status = output.status,
            "pdftotext failed; treating document as having no embedded text"
        );
        String::new()
    }
}
