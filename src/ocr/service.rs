//! Choosing and running a pipeline for each kind of request.

use std::sync::Arc;

use crate::{
    config::{OcrOpts, PdfStrategy},
    cpu_limit::CpuLimit,
    error::OcrError,
    prelude::*,
    scratch::Scratch,
    tools::ToolRunner,
};

use super::{
    OcrResult, RecognitionParams, TextSource, UploadedDocument,
    delegate::{PageSelection, ocr_with_delegate},
    embedded::{EmbeddedTextPolicy, MIN_EMBEDDED_TEXT_CHARS, extract_embedded_text},
    hocr::merge_page_hocr,
    image::{recognize_hocr, recognize_text},
    pages::recognize_pages,
    pdfinfo::read_pdf_info,
    rasterize::{PageDiscovery, rasterize_pdf},
};

/// Runs OCR pipelines. Cheap to clone, and shared by every request.
///
/// Every public method allocates its own [`Scratch`] space and releases it
/// before returning, whether the pipeline succeeded or not.
#[derive(Clone)]
pub struct OcrService {
    opts: OcrOpts,
    runner: Arc<dyn ToolRunner>,
    cpu_limit: CpuLimit,
}

impl OcrService {
    /// Create a new service which runs tools using `runner`.
    pub fn new(opts: OcrOpts, runner: Arc<dyn ToolRunner>) -> Self {
        let cpu_limit = CpuLimit::new(opts.worker_count());
        Self {
            opts,
            runner,
            cpu_limit,
        }
    }

    fn scratch(&self) -> Result<Scratch, OcrError> {
        Ok(Scratch::new(&self.opts.scratch_root())?)
    }

    /// OCR a single image as plain text.
    #[instrument(level = "debug", skip_all, fields(filename = ?upload.filename))]
    pub async fn image_text(
        &self,
        upload: &UploadedDocument,
        params: &RecognitionParams,
    ) -> Result<String, OcrError> {
        let mut scratch = self.scratch()?;
        let result: Result<String, OcrError> = async {
            let image = upload.stage(&mut scratch, &upload.suffix()).await?;
            recognize_text(self.runner.as_ref(), &image, params).await
        }
        .await;
        scratch.release();
        result
    }

    /// OCR a single image as an hOCR document.
    #[instrument(level = "debug", skip_all, fields(filename = ?upload.filename))]
    pub async fn image_hocr(
        &self,
        upload: &UploadedDocument,
        params: &RecognitionParams,
    ) -> Result<String, OcrError> {
        let mut scratch = self.scratch()?;
        let result: Result<String, OcrError> = async {
            let image = upload.stage(&mut scratch, &upload.suffix()).await?;
            // Tesseract adds `.hocr` to this itself.
            let output_base = image.with_extension("");
            recognize_hocr(self.runner.as_ref(), &image, &output_base, params).await
        }
        .await;
        scratch.release();
        result
    }

    /// Extract the text of a PDF, using embedded text when it looks good
    /// enough and OCR otherwise.
    #[instrument(level = "debug", skip_all, fields(filename = ?upload.filename, lang = %lang, force_ocr = force_ocr, dpi = dpi))]
    pub async fn pdf_text(
        &self,
        upload: &UploadedDocument,
        lang: &str,
        force_ocr: bool,
        dpi: u32,
    ) -> Result<OcrResult, OcrError> {
        let mut scratch = self.scratch()?;
        let result: Result<OcrResult, OcrError> = async {
            let pdf = upload.stage(&mut scratch, ".pdf").await?;
            match self.opts.pdf_strategy {
                PdfStrategy::Rasterize => {
                    self.pdf_text_by_rasterizing(&mut scratch, &pdf, lang, force_ocr, dpi)
                        .await
                }
                PdfStrategy::Delegate => {
                    self.pdf_text_by_delegating(&mut scratch, &pdf, lang, force_ocr)
                        .await
                }
            }
        }
        .await;
        scratch.release();
        result
    }

    /// Rasterize the PDF and OCR the pages ourselves.
    async fn pdf_text_by_rasterizing(
        &self,
        scratch: &mut Scratch,
        pdf: &Path,
        lang: &str,
        force_ocr: bool,
        dpi: u32,
    ) -> Result<OcrResult, OcrError> {
        let runner = self.runner.as_ref();
        if !force_ocr
            && let Some(text) =
                self.embedded_text(pdf, EmbeddedTextPolicy::MoreThan(MIN_EMBEDDED_TEXT_CHARS)).await
        {
            return Ok(text);
        }

        let pages = rasterize_pdf(
            runner,
            &self.cpu_limit,
            scratch,
            pdf,
            dpi,
            PageDiscovery::ProbePrefix,
        )
        .await?;
        if pages.is_empty() {
            return Err(OcrError::NoPages);
        }
        let recognized = recognize_pages(
            runner,
            &self.cpu_limit,
            &pages,
            lang,
            self.opts.worker_count(),
        )
        .await?;
        info!(
            pages = recognized.page_count,
            pages_with_text = recognized.pages_with_text,
            "OCRed PDF"
        );
        Ok(OcrResult {
            text: recognized.text,
            source: TextSource::Ocr,
            pages: Some(recognized.page_count),
        })
    }

    /// Let `ocrmypdf` do all the work.
    async fn pdf_text_by_delegating(
        &self,
        scratch: &mut Scratch,
        pdf: &Path,
        lang: &str,
        force_ocr: bool,
    ) -> Result<OcrResult, OcrError> {
        let selection = if force_ocr {
            PageSelection::AllPages
        } else if let Some(text) = self.embedded_text(pdf, EmbeddedTextPolicy::AnyText).await {
            return Ok(text);
        } else {
            PageSelection::PagesWithoutText
        };
        let text = ocr_with_delegate(
            self.runner.as_ref(),
            &self.cpu_limit,
            scratch,
            pdf,
            lang,
            selection,
        )
        .await?;
        Ok(OcrResult {
            text,
            source: TextSource::Ocr,
            pages: None,
        })
    }

    /// Return the PDF's embedded text, if `policy` says it's good enough.
    async fn embedded_text(&self, pdf: &Path, policy: EmbeddedTextPolicy) -> Option<OcrResult> {
        let text = extract_embedded_text(self.runner.as_ref(), pdf).await;
        if policy.accepts(&text) {
            info!(chars = text.chars().count(), "Using embedded PDF text");
            Some(OcrResult {
                text,
                source: TextSource::EmbeddedText,
                pages: None,
            })
        } else {
            debug!(
                chars = text.chars().count(),
                ?policy,
                "Embedded PDF text is not good enough; running OCR"
            );
            None
        }
    }

    /// OCR every page of a PDF as hOCR, and merge the pages into one
    /// document.
    #[instrument(level = "debug", skip_all, fields(filename = ?upload.filename, lang = %lang, dpi = dpi))]
    pub async fn pdf_hocr(
        &self,
        upload: &UploadedDocument,
        lang: &str,
        dpi: u32,
    ) -> Result<String, OcrError> {
        let mut scratch = self.scratch()?;
        let result: Result<String, OcrError> = async {
            let runner = self.runner.as_ref();
            let pdf = upload.stage(&mut scratch, ".pdf").await?;
            let info = read_pdf_info(runner, &pdf).await.unwrap_or_default();

            let pages = rasterize_pdf(
                runner,
                &self.cpu_limit,
                &mut scratch,
                &pdf,
                dpi,
                PageDiscovery::SortedListing,
            )
            .await?;
            if pages.is_empty() {
                return Err(OcrError::NoPages);
            }
            if let Some(expected) = info.pages
                && expected > pages.len()
            {
                warn!(
                    expected,
                    rasterized = pages.len(),
                    "rasterizer produced fewer pages than the PDF claims to have"
                );
            }

            let output_dir = scratch.dir("-hocr")?;
            merge_page_hocr(
                runner,
                &self.cpu_limit,
                &pages,
                &output_dir,
                lang,
                info.title.as_deref(),
                self.opts.worker_count(),
            )
            .await
        }
        .await;
        scratch.release();
        result
    }
}
