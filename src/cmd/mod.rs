//! Command-line entry points.

use std::sync::Arc;

use crate::{config::OcrOpts, ocr::OcrService, tools::SystemToolRunner};

pub mod ocr;
pub mod serve;

/// Build an [`OcrService`] which runs the real tools.
fn system_service(opts: &OcrOpts) -> OcrService {
    let runner = SystemToolRunner::new(opts.tool_timeout());
    OcrService::new(opts.clone(), Arc::new(runner))
}
