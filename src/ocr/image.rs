//! OCR a single image with the `tesseract` CLI tool.

use std::ffi::OsString;

use crate::{
    error::OcrError,
    prelude::*,
    tools::{Tool, ToolOutcome, ToolRunner, tool_args},
};

use super::RecognitionParams;

/// The extension Tesseract adds to hOCR output files.
pub const HOCR_EXTENSION: &str = "hocr";

/// Build the Tesseract arguments shared by every output format.
fn tesseract_args(
    image: &Path,
    output_target: impl Into<OsString>,
    params: &RecognitionParams,
) -> Vec<OsString> {
    let mut args = tool_args![image, output_target.into(), "-l", &params.lang];
    if let Some(oem) = params.oem {
        args.extend(tool_args!["--oem", oem.to_string()]);
    }
    args.extend(tool_args!["--psm", params.psm.to_string()]);
    args
}

/// Where Tesseract writes hOCR when given `output_base`.
///
/// Tesseract appends its own extension to the base name, so
/// `/tmp/x/page-3` becomes `/tmp/x/page-3.hocr`.
pub fn hocr_artifact_path(output_base: &Path) -> PathBuf {
    let mut path = output_base.as_os_str().to_owned();
    path.push(".");
    path.push(HOCR_EXTENSION);
    PathBuf::from(path)
}

/// Recognize the text in an image, returning whatever Tesseract printed.
///
/// A non-zero exit with text on standard output is treated as a success,
/// because Tesseract exits with errors for things like missing DPI metadata
/// while still recognizing the page.
#[instrument(level = "debug", skip_all, fields(image = %image.display(), lang = %params.lang))]
pub async fn recognize_text(
    runner: &dyn ToolRunner,
    image: &Path,
    params: &RecognitionParams,
) -> Result<String, OcrError> {
    let args = tesseract_args(image, "stdout", params);
    let output = runner.run(Tool::Tesseract, &args).await;
    let has_text = !output.stdout.trim().is_empty();
    match Tool::Tesseract.classify(&output, has_text) {
        ToolOutcome::Success => Ok(output.stdout),
        ToolOutcome::SoftSuccess => {
            warn!(
                status = output.status,
                stderr = %output.stderr.trim(),
                "tesseract reported an error but produced text; keeping it"
            );
            Ok(output.stdout)
        }
        ToolOutcome::Failed => Err(OcrError::Recognition {
            stderr: output.stderr.trim().to_owned(),
        }),
    }
}

/// Recognize an image as hOCR.
///
/// Tesseract writes the markup to `output_base` plus [`HOCR_EXTENSION`]. If
/// that file doesn't exist afterwards, we report
/// [`OcrError::ArtifactMissing`] with whatever Tesseract printed.
#[instrument(level = "debug", skip_all, fields(image = %image.display(), lang = %params.lang))]
pub async fn recognize_hocr(
    runner: &dyn ToolRunner,
    image: &Path,
    output_base: &Path,
    params: &RecognitionParams,
) -> Result<String, OcrError> {
    let mut args = tesseract_args(image, output_base, params);
    args.push(HOCR_EXTENSION.into());
    let output = runner.run(Tool::Tesseract, &args).await;

    let artifact = hocr_artifact_path(output_base);
    let exists = tokio::fs::try_exists(&artifact).await.unwrap_or(false);
    match Tool::Tesseract.classify(&output, exists) {
        ToolOutcome::Failed => {
            return Err(OcrError::ArtifactMissing {
                stderr: output.stderr.trim().to_owned(),
            });
        }
        ToolOutcome::SoftSuccess => warn!(
            status = output.status,
            stderr = %output.stderr.trim(),
            "tesseract reported an error but wrote hOCR; keeping it"
        ),
        ToolOutcome::Success => {}
    }
    if !exists {
        return Err(OcrError::ArtifactMissing {
            stderr: output.stderr.trim().to_owned(),
        });
    }

    let bytes = tokio::fs::read(&artifact)
        .await
        .with_context(|| format!("cannot read hOCR output {:?}", artifact.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
