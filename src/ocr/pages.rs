//! OCR a list of page images in parallel, keeping them in page order.

use futures::{FutureExt as _, StreamExt as _, stream};

use crate::{
    cpu_limit::CpuLimit, error::OcrError, prelude::*, tools::ToolRunner,
};

use super::{PageImage, RecognitionParams, image::recognize_text};

/// Page segmentation mode for whole pages: fully automatic layout analysis.
pub const FULL_PAGE_PSM: u32 = 3;

/// OCR engine mode for whole pages: the LSTM engine.
pub const FULL_PAGE_OEM: u32 = 1;

/// Text recognized from a multi-page document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagesText {
    /// Text of every page which had any, separated by blank lines.
    pub text: String,
    /// How many pages we tried to OCR.
    pub page_count: usize,
    /// How many of those pages produced text.
    pub pages_with_text: usize,
}

/// OCR every page in `pages`, running up to `concurrency_limit` at once.
///
/// Pages which fail or have no text are dropped, but if _every_ page comes
/// back empty we return [`OcrError::NoText`].
#[instrument(level = "debug", skip_all, fields(pages = pages.len(), lang = %lang))]
pub async fn recognize_pages(
    runner: &dyn ToolRunner,
    cpu_limit: &CpuLimit,
    pages: &[PageImage],
    lang: &str,
    concurrency_limit: usize,
) -> Result<PagesText, OcrError> {
    let params = RecognitionParams::new(lang, FULL_PAGE_PSM, Some(FULL_PAGE_OEM));
    let futures = pages
        .iter()
        .map(|page| {
            let params = &params;
            async move {
                let result = cpu_limit
                    .run(|| recognize_text(runner, &page.path, params))
                    .await;
                match result {
                    Ok(Ok(text)) => Some(text.trim().to_owned()),
                    Ok(Err(err)) => {
                        warn!(page = page.index, "failed to OCR page: {}", err);
                        None
                    }
                    Err(err) => {
                        warn!(page = page.index, "failed to OCR page: {:?}", err);
                        None
                    }
                }
            }
            .boxed()
        })
        .collect::<Vec<_>>();
    // Process pages concurrently, up to the limit, but yield results in the
    // original order.
    let page_texts = stream::iter(futures)
        .buffered(concurrency_limit.max(1))
        .collect::<Vec<_>>()
        .await;

    let texts = page_texts
        .into_iter()
        .flatten()
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();
    if texts.is_empty() {
        return Err(OcrError::NoText);
    }
    Ok(PagesText {
        pages_with_text: texts.len(),
        text: texts.join("\n\n"),
        page_count: pages.len(),
    })
}
