//! Merge per-page hOCR documents into one multi-page hOCR document.
//!
//! Tesseract only ever sees one image at a time, so every page it produces
//! claims to be `page_1`, with `block_1_1`, `line_1_4` and so on inside it.
//! We cut the `ocr_page` element out of each page's document, renumber it
//! for its real page index, and wrap the results in a single shell.

use std::sync::LazyLock;

use futures::{FutureExt as _, StreamExt as _, stream};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use regex::Regex;

use crate::{
    cpu_limit::CpuLimit,
    error::OcrError,
    prelude::*,
    tools::ToolRunner,
};

use super::{PageImage, RecognitionParams, image::recognize_hocr};

/// Page segmentation mode for hOCR of whole pages.
pub const HOCR_PAGE_PSM: u32 = 3;

/// The opening tag of a page element.
static OCR_PAGE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div\s[^>]*class=['"]ocr_page['"][^>]*>"#)
        .expect("failed to compile regex")
});

/// Any `<div ...>` or `</div>` tag.
static DIV_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<div\b[^>]*>|</div\s*>").expect("failed to compile regex"));

/// The page's own id.
static PAGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^page_\d+$").expect("failed to compile regex"));

/// Ids of nested elements, such as `block_1_2` or `word_1_17`.
static NESTED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+)_\d+_(\d+)$").expect("failed to compile regex")
});

/// The zero-based page number in the page's `title` properties.
static PPAGENO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bppageno \d+").expect("failed to compile regex"));

/// Extract the first `ocr_page` element from an hOCR document.
pub fn extract_page_fragment(hocr: &str) -> Option<&str> {
    let start = OCR_PAGE_START.find(hocr)?;
    let mut depth = 0usize;
    for tag in DIV_TAG.find_iter(&hocr[start.start()..]) {
        let text = tag.as_str();
        if text.starts_with("</") {
            depth = depth.checked_sub(1)?;
        } else if !text.ends_with("/>") {
            depth += 1;
        }
        if depth == 0 {
            return Some(&hocr[start.start()..start.start() + tag.end()]);
        }
    }
    None
}

/// The id an element should have on page `index`, if it needs a new one.
fn renumber_id(id: &str, index: usize) -> Option<String> {
    if PAGE_ID.is_match(id) {
        Some(format!("page_{index}"))
    } else {
        NESTED_ID
            .captures(id)
            .map(|caps| format!("{}_{index}_{}", &caps[1], &caps[2]))
    }
}

/// Rewrite ids and page numbers in a fragment for page `index` (1-based).
///
/// Only `id` attributes and the page's own `title` are touched. Recognized
/// text passes through unchanged, even when it looks like an id.
pub fn renumber_page_fragment(fragment: &str, index: usize) -> Result<String> {
    let ppageno = format!("ppageno {}", index.saturating_sub(1));
    rewrite_str(
        fragment,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("[id]", |el| {
                    if let Some(id) = el.get_attribute("id")
                        && let Some(new_id) = renumber_id(&id, index)
                    {
                        el.set_attribute("id", &new_id)?;
                    }
                    Ok(())
                }),
                element!(".ocr_page[title]", |el| {
                    if let Some(title) = el.get_attribute("title") {
                        let title = PPAGENO.replace(&title, ppageno.as_str());
                        el.set_attribute("title", &title)?;
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .with_context(|| format!("cannot renumber hOCR for page {index}"))
}

/// Wrap renumbered page fragments in a complete hOCR document.
pub fn hocr_document(title: Option<&str>, pages: &[String]) -> String {
    let title = html_escape::encode_text(title.unwrap_or_default());
    let mut out = String::new();
    out.push_str(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\"\n",
        "    \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n",
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"en\" lang=\"en\">\n",
        " <head>\n",
    ));
    out.push_str(&format!("  <title>{title}</title>\n"));
    out.push_str(concat!(
        "  <meta http-equiv=\"Content-Type\" content=\"text/html;charset=utf-8\"/>\n",
        "  <meta name='ocr-system' content='tesseract' />\n",
        "  <meta name='ocr-capabilities' content='ocr_page ocr_carea ocr_par ocr_line ocrx_word ocrp_wconf'/>\n",
    ));
    out.push_str(&format!(
        "  <meta name='ocr-number-of-pages' content='{}'/>\n",
        pages.len()
    ));
    out.push_str(" </head>\n <body>\n");
    for page in pages {
        out.push_str("  ");
        out.push_str(page.trim());
        out.push('\n');
    }
    out.push_str(" </body>\n</html>\n");
    out
}

/// Run hOCR on every page and merge the results.
///
/// Pages are processed concurrently, up to `concurrency_limit`, but ids come
/// from each page's index, never from completion order. Pages whose hOCR
/// fails, or which contain no page element, are left out.
#[instrument(level = "debug", skip_all, fields(pages = pages.len(), lang = %lang))]
pub async fn merge_page_hocr(
    runner: &dyn ToolRunner,
    cpu_limit: &CpuLimit,
    pages: &[PageImage],
    output_dir: &Path,
    lang: &str,
    title: Option<&str>,
    concurrency_limit: usize,
) -> Result<String, OcrError> {
    let params = RecognitionParams::new(lang, HOCR_PAGE_PSM, None);
    let futures = pages
        .iter()
        .map(|page| {
            let params = &params;
            async move {
                let output_base = output_dir.join(format!("page-{}", page.index));
                let result = cpu_limit
                    .run(|| recognize_hocr(runner, &page.path, &output_base, params))
                    .await;
                let hocr = match result {
                    Ok(Ok(hocr)) => hocr,
                    Ok(Err(err)) => {
                        warn!(page = page.index, "failed to generate hOCR: {}", err);
                        return None;
                    }
                    Err(err) => {
                        warn!(page = page.index, "failed to generate hOCR: {:?}", err);
                        return None;
                    }
                };
                let Some(fragment) = extract_page_fragment(&hocr) else {
                    warn!(page = page.index, "hOCR output has no ocr_page element");
                    return None;
                };
                match renumber_page_fragment(fragment, page.index) {
                    Ok(fragment) => Some(fragment),
                    Err(err) => {
                        warn!(page = page.index, "{:?}", err);
                        None
                    }
                }
            }
            .boxed()
        })
        .collect::<Vec<_>>();
    let fragments = stream::iter(futures)
        .buffered(concurrency_limit.max(1))
        .collect::<Vec<_>>()
        .await;

    let fragments = fragments.into_iter().flatten().collect::<Vec<_>>();
    debug!(merged = fragments.len(), "Merged hOCR pages");
    Ok(hocr_document(title, &fragments))
}
