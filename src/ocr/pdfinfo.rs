//! PDF metadata, via `pdfinfo` from `poppler-utils`.

use std::collections::BTreeMap;

use crate::{
    prelude::*,
    tools::{Tool, ToolRunner, tool_args},
};

/// The bits of `pdfinfo` output we care about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PdfInfo {
    /// The document title, if it has a non-empty one.
    pub title: Option<String>,
    /// The number of pages, if `pdfinfo` reported one.
    pub pages: Option<usize>,
}

impl PdfInfo {
    /// Parse `Key: value` lines.
    pub fn parse(output: &str) -> Self {
        let mut properties = BTreeMap::new();
        for line in output.lines() {
            let mut parts = line.splitn(2, ':');
            let key = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();
            properties.insert(key.to_string(), value.to_string());
        }
        Self {
            title: properties
                .get("Title")
                .filter(|title| !title.is_empty())
                .cloned(),
            pages: properties.get("Pages").and_then(|pages| pages.parse().ok()),
        }
    }
}

/// Read metadata from `pdf`.
///
/// Metadata is only ever decoration for us, so failures are logged and
/// reported as `None`.
#[instrument(level = "debug", skip_all, fields(pdf = %pdf.display()))]
pub async fn read_pdf_info(runner: &dyn ToolRunner, pdf: &Path) -> Option<PdfInfo> {
    let output = runner.run(Tool::PdfInfo, &tool_args![pdf]).await;
    if Tool::PdfInfo.classify(&output, false).is_usable() {
        Some(PdfInfo::parse(&output.stdout))
    } else {
        debug!(status = output.status, "pdfinfo failed; ignoring metadata");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_page_count() {
        let output = "\
Title:           Quarterly Report: Q3
Producer:        LibreOffice 7.3
Pages:           12
Encrypted:       no
";
        let info = PdfInfo::parse(output);
        // Only the first colon splits key from value.
        assert_eq!(info.title.as_deref(), Some("Quarterly Report: Q3"));
        assert_eq!(info.pages, Some(12));
    }

    #[test]
    fn blank_title_and_garbage_pages_are_missing() {
        let info = PdfInfo::parse("Title:\nPages: lots\n");
        assert_eq!(info, PdfInfo::default());
    }
}
