//! Running external command-line tools.
//!
//! All the real work in this service is done by Tesseract, Poppler and
//! OCRmyPDF. This module runs them, captures what they print, and decides
//! (per tool, not per call site) whether a given run should count as a
//! success.
//!
//! Running a tool never fails: a tool which cannot be started, or which is
//! killed for running too long, is reported as a [`ToolOutput`] with a
//! non-zero status and a diagnostic message in `stderr`. Callers must always
//! look at the result.

use std::{
    ffi::OsString,
    fmt,
    process::{Output, Stdio},
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;
use tokio::process::Command;

use crate::prelude::*;

/// Exit status we report when a tool could not be run, or was killed.
pub const NOT_RUN_STATUS: i32 = -1;

/// The external tools we know how to call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Tesseract OCR engine.
    Tesseract,
    /// Poppler's embedded text extractor.
    PdfToText,
    /// Poppler's primary PDF rasterizer.
    PdfToPpm,
    /// Poppler's Cairo-based rasterizer, used as a fallback.
    PdfToCairo,
    /// Poppler's PDF metadata reader.
    PdfInfo,
    /// All-in-one "scan and OCR" tool.
    OcrMyPdf,
}

impl Tool {
    /// The program name to look up on `PATH`.
    pub fn program(self) -> &'static str {
        match self {
            Tool::Tesseract => "tesseract",
            Tool::PdfToText => "pdftotext",
            Tool::PdfToPpm => "pdftoppm",
            Tool::PdfToCairo => "pdftocairo",
            Tool::PdfInfo => "pdfinfo",
            Tool::OcrMyPdf => "ocrmypdf",
        }
    }

    /// Extra environment variables for this tool.
    ///
    /// Tesseract starts one OpenMP thread per core unless told otherwise, and
    /// each run already holds a CPU permit of its own.
    pub fn env(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Tool::Tesseract => &[("OMP_THREAD_LIMIT", "1")],
            _ => &[],
        }
    }

    /// Does this tool sometimes exit with an error even though its output is
    /// perfectly usable?
    ///
    /// Tesseract does this when it prints warnings about image resolution,
    /// `pdftotext` when it recovers from a damaged xref table, and `ocrmypdf`
    /// when a single page fails but the sidecar text is still written.
    fn tolerates_failure_with_output(self) -> bool {
        matches!(self, Tool::Tesseract | Tool::PdfToText | Tool::OcrMyPdf)
    }

    /// Classify a run of this tool.
    ///
    /// `has_usable_output` is the caller's judgement of whether the tool
    /// produced what it was asked for (non-empty text on standard output, an
    /// output file which exists, a non-empty sidecar).
    pub fn classify(self, output: &ToolOutput, has_usable_output: bool) -> ToolOutcome {
        if output.success() {
            ToolOutcome::Success
        } else if has_usable_output && self.tolerates_failure_with_output() {
            ToolOutcome::SoftSuccess
        } else {
            ToolOutcome::Failed
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// How a tool run should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool exited normally.
    Success,
    /// The tool reported an error, but produced usable output anyway.
    SoftSuccess,
    /// The tool failed.
    Failed,
}

impl ToolOutcome {
    /// Should the caller use the output?
    pub fn is_usable(self) -> bool {
        self != ToolOutcome::Failed
    }
}

/// What a tool printed, and how it exited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// The raw exit code, or [`NOT_RUN_STATUS`].
    pub status: i32,
    /// Standard output, decoded lossily.
    pub stdout: String,
    /// Standard error, decoded lossily.
    pub stderr: String,
}

impl ToolOutput {
    /// Build from a finished process.
    pub fn from_process(output: &Output) -> Self {
        Self {
            status: output.status.code().unwrap_or(NOT_RUN_STATUS),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// A run which never produced any output of its own.
    pub fn not_run(diagnostic: impl Into<String>) -> Self {
        Self {
            status: NOT_RUN_STATUS,
            stdout: String::new(),
            stderr: diagnostic.into(),
        }
    }

    /// Did the tool exit with status 0?
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Lines of standard error which look like real errors.
    pub fn error_lines(&self) -> impl Iterator<Item = &str> {
        self.stderr.lines().filter(|line| is_error_line(line))
    }
}

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler complains about broken xref tables it has already repaired.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Something which can run external tools.
///
/// The service only ever talks to tools through this trait, which lets tests
/// substitute a scripted implementation.
#[async_trait]
pub trait ToolRunner: Send + Sync + 'static {
    /// Run `tool` with `args` and wait for it to finish.
    async fn run(&self, tool: Tool, args: &[OsString]) -> ToolOutput;
}

/// Runs tools as real child processes.
#[derive(Clone, Debug, Default)]
pub struct SystemToolRunner {
    /// Kill any tool which takes longer than this.
    timeout: Option<Duration>,
}

impl SystemToolRunner {
    /// Create a runner with an optional per-invocation deadline.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for SystemToolRunner {
    #[instrument(level = "debug", skip_all, fields(tool = %tool))]
    async fn run(&self, tool: Tool, args: &[OsString]) -> ToolOutput {
        let mut cmd = Command::new(tool.program());
        cmd.args(args)
            .envs(tool.env().iter().copied())
            .stdin(Stdio::null())
            // If we time out, or our request is cancelled, dropping the future
            // kills the child.
            .kill_on_drop(true);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(command_name = %tool, ?limit, "Command timed out");
                    return ToolOutput::not_run(format!(
                        "{} timed out after {} seconds",
                        tool,
                        limit.as_secs()
                    ));
                }
            },
            None => cmd.output().await,
        };

        match result {
            Ok(output) => {
                let output = ToolOutput::from_process(&output);
                log_tool_output(tool, &output);
                output
            }
            Err(err) => {
                error!(command_name = %tool, "Could not run command: {}", err);
                ToolOutput::not_run(format!("cannot run {}: {}", tool, err))
            }
        }
    }
}

/// Log the output of a command at appropriate levels.
fn log_tool_output(tool: Tool, output: &ToolOutput) {
    trace!(
        command_name = %tool,
        output = %output.stdout,
        "Standard output from command"
    );
    if !output.success() {
        warn!(
            command_name = %tool,
            status = output.status,
            output = %output.stderr,
            "Command exited with an error",
        );
    } else if output.error_lines().next().is_some() {
        warn!(
            command_name = %tool,
            output = %output.stderr,
            "Command succeeded but printed error output",
        );
    } else if !output.stderr.is_empty() {
        debug!(
            command_name = %tool,
            output = %output.stderr,
            "Standard error from command",
        );
    }
}

/// Build an argument list from anything path- or string-like.
macro_rules! tool_args {
    ($($arg:expr),* $(,)?) => {
        vec![$(::std::ffi::OsString::from($arg)),*]
    };
}
pub(crate) use tool_args;
