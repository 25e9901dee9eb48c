//! The `ocr` subcommand.

use clap::Args;

use crate::{
    config::OcrOpts,
    ocr::{RecognitionParams, UploadedDocument},
    prelude::*,
    server::routes::{
        DEFAULT_DPI, DEFAULT_HOCR_PSM, DEFAULT_LANG, DEFAULT_OEM, DEFAULT_TEXT_PSM,
    },
};

use super::system_service;

/// OCR a local image or PDF, using the same pipelines as the HTTP service.
#[derive(Args, Clone, Debug)]
pub struct OcrFileOpts {
    /// The image or PDF to OCR.
    pub path: PathBuf,

    /// Tesseract language code(s), such as `tur` or `eng+deu`.
    #[clap(long, default_value = DEFAULT_LANG)]
    pub lang: String,

    /// Tesseract page segmentation mode for images. Defaults to 6 for text
    /// and 3 for hOCR.
    #[clap(long)]
    pub psm: Option<u32>,

    /// Tesseract OCR engine mode for images, when printing text.
    #[clap(long, default_value_t = DEFAULT_OEM)]
    pub oem: u32,

    /// Resolution at which to rasterize PDF pages.
    #[clap(long, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// OCR PDFs even if they have embedded text.
    #[clap(long)]
    pub force_ocr: bool,

    /// Print an hOCR document instead of JSON.
    #[clap(long)]
    pub hocr: bool,

    #[clap(flatten)]
    pub ocr: OcrOpts,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.path.display()))]
pub async fn cmd_ocr(opts: &OcrFileOpts) -> Result<()> {
    let service = system_service(&opts.ocr);
    let upload = UploadedDocument::from_path(&opts.path)?;

    let output = if upload.is_pdf() {
        if opts.hocr {
            service.pdf_hocr(&upload, &opts.lang, opts.dpi).await?
        } else {
            let result = service
                .pdf_text(&upload, &opts.lang, opts.force_ocr, opts.dpi)
                .await?;
            serde_json::to_string_pretty(&result)?
        }
    } else if opts.hocr {
        let params = RecognitionParams::new(
            &opts.lang,
            opts.psm.unwrap_or(DEFAULT_HOCR_PSM),
            None,
        );
        service.image_hocr(&upload, &params).await?
    } else {
        let params = RecognitionParams::new(
            &opts.lang,
            opts.psm.unwrap_or(DEFAULT_TEXT_PSM),
            Some(opts.oem),
        );
        let text = service.image_text(&upload, &params).await?;
        serde_json::to_string_pretty(&serde_json::json!({ "text": text }))?
    };
    println!("{}", output);
    Ok(())
}
