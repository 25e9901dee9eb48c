//! OCR pipelines built from external tools.
//!
//! The components, leaves first:
//!
//! - [`image`]: OCR a single image with Tesseract, as text or hOCR.
//! - [`embedded`]: pull text already present in a PDF with `pdftotext`.
//! - [`pdfinfo`]: read PDF metadata.
//! - [`rasterize`]: turn a PDF into one PNG per page.
//! - [`pages`]: OCR many page images in parallel, keeping page order.
//! - [`hocr`]: merge per-page hOCR into a single document.
//! - [`delegate`]: hand a whole PDF to `ocrmypdf`.
//! - [`service`]: decide which of the above to run for each kind of request.

use std::fs;

use crate::{prelude::*, scratch::Scratch};

pub mod delegate;
pub mod embedded;
pub mod hocr;
pub mod image;
pub mod pages;
pub mod pdfinfo;
pub mod rasterize;
pub mod service;

pub use self::service::OcrService;

/// Tesseract settings for one recognition run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionParams {
    /// Tesseract language code(s), such as `tur` or `eng+deu`.
    pub lang: String,
    /// Page segmentation mode (`--psm`).
    pub psm: u32,
    /// OCR engine mode (`--oem`), if we want to override Tesseract's default.
    pub oem: Option<u32>,
}

impl RecognitionParams {
    /// Build a new set of parameters.
    pub fn new(lang: impl Into<String>, psm: u32, oem: Option<u32>) -> Self {
        Self {
            lang: lang.into(),
            psm,
            oem,
        }
    }
}

/// One rasterized page of a PDF.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub index: usize,
    /// Where the image lives. It is deleted along with the request's scratch
    /// space.
    pub path: PathBuf,
}

/// Where the text in an [`OcrResult`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextSource {
    /// Text which was already embedded in the PDF.
    EmbeddedText,
    /// Text recognized from page images.
    Ocr,
}

/// The result of OCRing a PDF as plain text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    /// The extracted text.
    pub text: String,
    /// Where the text came from.
    pub source: TextSource,
    /// How many pages were rasterized, when we did the rasterizing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}

/// A file uploaded by a client.
#[derive(Clone, Debug, Default)]
pub struct UploadedDocument {
    /// The filename the client declared, if any.
    pub filename: Option<String>,
    /// The content type the client declared, if any.
    pub content_type: Option<String>,
    /// The file contents.
    pub data: Vec<u8>,
}

impl UploadedDocument {
    /// Load a local file, as if it had been uploaded.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("cannot read {:?}", path.display()))?;
        Ok(Self {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            content_type: None,
            data,
        })
    }

    /// Does this look like a PDF?
    pub fn is_pdf(&self) -> bool {
        infer::is(&self.data, "pdf")
            || self
                .filename
                .as_deref()
                .and_then(|name| Path::new(name).extension())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    }

    /// Pick a file suffix (like `.png`) for staging this upload on disk.
    ///
    /// Tesseract's image loader cares about extensions for some formats, so
    /// we try the declared filename, then the declared content type, then the
    /// bytes themselves.
    pub fn suffix(&self) -> String {
        let from_filename = self
            .filename
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .map(|ext| ext.to_string_lossy().into_owned());
        let from_content_type = || {
            self.content_type
                .as_deref()
                .and_then(mime_guess::get_mime_extensions_str)
                .and_then(|exts| exts.first())
                .map(|&ext| ext.to_owned())
        };
        let from_data = || infer::get(&self.data).map(|kind| kind.extension().to_owned());
        from_filename
            .or_else(from_content_type)
            .or_else(from_data)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_else(|| ".bin".to_owned())
    }

    /// Write this upload into `scratch`, with the given suffix.
    pub async fn stage(&self, scratch: &mut Scratch, suffix: &str) -> Result<PathBuf> {
        let path = scratch.file(suffix)?;
        tokio::fs::write(&path, &self.data)
            .await
            .with_context(|| format!("cannot write upload to {:?}", path.display()))?;
        Ok(path)
    }
}
