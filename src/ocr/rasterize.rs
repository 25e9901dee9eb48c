//! Rasterize PDFs into one PNG per page, using Poppler's `pdftoppm`, falling
//! back to `pdftocairo`.
//!
//! Both tools take an output prefix and add a page number to it. How that
//! number is padded depends on the tool, its version, and the page count
//! (`page-1.png`, `page-01.png`, `page-001.png`, and in some builds without
//! the dash). We give each attempt its own empty directory, so the only files
//! we can find are the ones that attempt wrote.

use std::fs;

use crate::{
    cpu_limit::CpuLimit,
    error::OcrError,
    prelude::*,
    scratch::Scratch,
    tools::{Tool, ToolRunner, tool_args},
};

use super::PageImage;

/// The output prefix we hand to the rasterizers.
const PAGE_PREFIX: &str = "page";

/// The rasterizers we try, in order.
const RASTERIZERS: &[Tool] = &[Tool::PdfToPpm, Tool::PdfToCairo];

/// How to find the pages a rasterizer wrote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageDiscovery {
    /// Probe `page-001.png`, `page-01.png`, ... for pages 1, 2, 3, ... and
    /// stop at the first page number with no file.
    ProbePrefix,
    /// List every PNG in the output directory and sort by name. This works
    /// because both tools pad page numbers to the width of the page count.
    SortedListing,
}

/// Rasterize `pdf` at `dpi`.
///
/// Returns the pages in order. Returns [`OcrError::Conversion`] if both
/// rasterizers fail, and an empty list if a rasterizer succeeded without
/// writing anything.
#[instrument(level = "debug", skip_all, fields(pdf = %pdf.display(), dpi = dpi))]
pub async fn rasterize_pdf(
    runner: &dyn ToolRunner,
    cpu_limit: &CpuLimit,
    scratch: &mut Scratch,
    pdf: &Path,
    dpi: u32,
    discovery: PageDiscovery,
) -> Result<Vec<PageImage>, OcrError> {
    let mut last_stderr = String::new();
    for &tool in RASTERIZERS {
        let out_dir = scratch.dir(&format!("-{}", tool.program()))?;
        let args = rasterizer_args(tool, pdf, dpi, &out_dir.join(PAGE_PREFIX));

        // We use the CPU limit because rasterizers will use _at least_ 100%
        // of a CPU, and we don't want to run 200 copies at once by mistake.
        let output = cpu_limit.run(|| runner.run(tool, &args)).await?;
        if tool.classify(&output, false).is_usable() {
            let pages = discover_pages(&out_dir, discovery)?;
            debug!(rasterizer = %tool, pages = pages.len(), "Rasterized PDF");
            return Ok(pages);
        }

        warn!(
            rasterizer = %tool,
            status = output.status,
            "rasterizer failed; trying the next one"
        );
        last_stderr = output.stderr.trim().to_owned();
    }
    Err(OcrError::Conversion(format!(
        "PDF conversion failed: {last_stderr}"
    )))
}

/// Arguments for a rasterizer. The two tools accept the same flags, but
/// `pdftocairo` wants the format first.
fn rasterizer_args(tool: Tool, pdf: &Path, dpi: u32, prefix: &Path) -> Vec<std::ffi::OsString> {
    match tool {
        Tool::PdfToCairo => tool_args!["-png", "-r", dpi.to_string(), pdf, prefix],
        _ => tool_args!["-r", dpi.to_string(), "-png", pdf, prefix],
    }
}

/// Find the page images in `dir`.
pub fn discover_pages(dir: &Path, discovery: PageDiscovery) -> Result<Vec<PageImage>> {
    match discovery {
        PageDiscovery::ProbePrefix => Ok(probe_pages(dir)),
        PageDiscovery::SortedListing => list_sorted_pages(dir),
    }
}

/// Filenames a rasterizer might have used for page `index`.
fn page_file_candidates(index: usize) -> [String; 6] {
    [
        format!("{PAGE_PREFIX}-{index:03}.png"),
        format!("{PAGE_PREFIX}-{index:02}.png"),
        format!("{PAGE_PREFIX}-{index}.png"),
        format!("{PAGE_PREFIX}{index:03}.png"),
        format!("{PAGE_PREFIX}{index:02}.png"),
        format!("{PAGE_PREFIX}{index}.png"),
    ]
}

/// Probe for pages 1, 2, 3, ... until one is missing.
fn probe_pages(dir: &Path) -> Vec<PageImage> {
    let mut pages = vec![];
    for index in 1.. {
        let found = page_file_candidates(index)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file());
        match found {
            Some(path) => pages.push(PageImage { index, path }),
            None => break,
        }
    }
    pages
}

/// List all the PNG files in `dir`, in lexical order.
fn list_sorted_pages(dir: &Path) -> Result<Vec<PageImage>> {
    let mut dir_paths = dir
        .read_dir()
        .with_context(|| format!("failed to read page directory {:?}", dir.display()))?
        .map(|entry| {
            let entry = entry.with_context(|| {
                format!("failed to read entry in page directory {:?}", dir.display())
            })?;
            Ok(entry.path())
        })
        .collect::<Result<Vec<_>>>()?;
    dir_paths.retain(|path| {
        path.extension().is_some_and(|ext| ext == "png")
            && fs::metadata(path).is_ok_and(|meta| meta.is_file())
    });
    dir_paths.sort();
    Ok(dir_paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| PageImage { index: i + 1, path })
        .collect())
}
