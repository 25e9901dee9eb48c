//! Hand a whole PDF to `ocrmypdf`, and read back the text it recognized.
//!
//! `ocrmypdf` decides for itself which pages need OCR, rasterizes them, and
//! writes all the page text to a "sidecar" file next to the OCRed PDF. We
//! only want the sidecar. The output PDF is written to scratch and thrown
//! away.

use crate::{
    cpu_limit::CpuLimit,
    error::OcrError,
    prelude::*,
    scratch::Scratch,
    tools::{Tool, ToolOutcome, ToolRunner, tool_args},
};

/// Which pages `ocrmypdf` should OCR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSelection {
    /// Only pages without text (`--skip-text`).
    PagesWithoutText,
    /// Every page, replacing any existing text (`--force-ocr`).
    AllPages,
}

impl PageSelection {
    fn flag(self) -> &'static str {
        match self {
            PageSelection::PagesWithoutText => "--skip-text",
            PageSelection::AllPages => "--force-ocr",
        }
    }
}

/// Build the `ocrmypdf` command line.
fn ocrmypdf_args(
    pdf: &Path,
    sidecar: &Path,
    output_pdf: &Path,
    lang: &str,
    selection: PageSelection,
) -> Vec<std::ffi::OsString> {
    tool_args![
        "--language",
        lang,
        "--sidecar",
        sidecar,
        selection.flag(),
        // One worker per run, since each run holds a single CPU permit.
        "--jobs",
        "1",
        // Optimizing the output PDF is slow, and we never look at it.
        "--optimize",
        "0",
        pdf,
        output_pdf,
    ]
}

/// OCR `pdf` with `ocrmypdf` and return the sidecar text, untrimmed.
///
/// If `ocrmypdf` exits with an error but still wrote a non-empty sidecar, we
/// keep the text. Otherwise failures are reported as
/// [`OcrError::Conversion`] with its diagnostic output.
#[instrument(level = "debug", skip_all, fields(pdf = %pdf.display(), lang = %lang, ?selection))]
pub async fn ocr_with_delegate(
    runner: &dyn ToolRunner,
    cpu_limit: &CpuLimit,
    scratch: &mut Scratch,
    pdf: &Path,
    lang: &str,
    selection: PageSelection,
) -> Result<String, OcrError> {
    let sidecar = scratch.file(".txt")?;
    let output_pdf = scratch.file(".pdf")?;
    let args = ocrmypdf_args(pdf, &sidecar, &output_pdf, lang, selection);

    let output = cpu_limit.run(|| runner.run(Tool::OcrMyPdf, &args)).await?;
    let text = match tokio::fs::read(&sidecar).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("cannot read sidecar {:?}", sidecar.display()))
                .into());
        }
    };

    match Tool::OcrMyPdf.classify(&output, !text.trim().is_empty()) {
        ToolOutcome::Success => Ok(text),
        ToolOutcome::SoftSuccess => {
            warn!(
                status = output.status,
                stderr = %output.stderr.trim(),
                "ocrmypdf reported an error but wrote sidecar text; keeping it"
            );
            Ok(text)
        }
        ToolOutcome::Failed => Err(OcrError::Conversion(output.stderr.trim().to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;
    use crate::tools::ToolOutput;

    /// Pretends to be `ocrmypdf`, writing `sidecar` (if any) and exiting with
    /// `status`.
    struct FakeOcrMyPdf {
        status: i32,
        sidecar: Option<&'static str>,
    }

    #[async_trait]
    impl ToolRunner for FakeOcrMyPdf {
        async fn run(&self, tool: Tool, args: &[OsString]) -> ToolOutput {
            assert_eq!(tool, Tool::OcrMyPdf);
            let sidecar_at = args
                .iter()
                .position(|arg| arg == "--sidecar")
                .expect("sidecar flag");
            if let Some(text) = self.sidecar {
                std::fs::write(&args[sidecar_at + 1], text).expect("write sidecar");
            }
            ToolOutput {
                status: self.status,
                stdout: String::new(),
                stderr: "PriorOcrFoundError: page already has text!\n".to_owned(),
            }
        }
    }

    async fn run_fake(
        status: i32,
        sidecar: Option<&'static str>,
        selection: PageSelection,
    ) -> Result<Result<String, OcrError>> {
        let parent = tempfile::tempdir()?;
        let mut scratch = Scratch::new(parent.path())?;
        let runner = FakeOcrMyPdf { status, sidecar };
        let result = ocr_with_delegate(
            &runner,
            &CpuLimit::new(1),
            &mut scratch,
            Path::new("in.pdf"),
            "tur",
            selection,
        )
        .await;
        scratch.release();
        Ok(result)
    }

    #[test]
    fn args_select_pages() {
        let args = ocrmypdf_args(
            Path::new("in.pdf"),
            Path::new("out.txt"),
            Path::new("out.pdf"),
            "tur+eng",
            PageSelection::AllPages,
        );
        assert_eq!(
            args,
            tool_args![
                "--language",
                "tur+eng",
                "--sidecar",
                "out.txt",
                "--force-ocr",
                "--jobs",
                "1",
                "--optimize",
                "0",
                "in.pdf",
                "out.pdf",
            ]
        );
        let args = ocrmypdf_args(
            Path::new("in.pdf"),
            Path::new("out.txt"),
            Path::new("out.pdf"),
            "tur",
            PageSelection::PagesWithoutText,
        );
        assert!(args.contains(&OsString::from("--skip-text")));
    }

    #[tokio::test]
    async fn clean_exit_returns_sidecar() -> Result<()> {
        let text = run_fake(0, Some("Sayfa 1\n\x0c"), PageSelection::PagesWithoutText).await??;
        assert_eq!(text, "Sayfa 1\n\x0c");
        Ok(())
    }

    #[tokio::test]
    async fn failure_with_sidecar_text_is_kept() -> Result<()> {
        let text = run_fake(6, Some("partial"), PageSelection::AllPages).await??;
        assert_eq!(text, "partial");
        Ok(())
    }

    #[tokio::test]
    async fn failure_without_sidecar_text_is_an_error() -> Result<()> {
        for sidecar in [None, Some("  \n")] {
            let result = run_fake(2, sidecar, PageSelection::PagesWithoutText).await?;
            match result {
                Err(OcrError::Conversion(message)) => {
                    assert_eq!(message, "PriorOcrFoundError: page already has text!");
                }
                other => panic!("expected conversion error, got {other:?}"),
            }
        }
        Ok(())
    }
}
