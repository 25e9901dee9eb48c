//! Runtime configuration, from command-line flags and environment variables.

use std::{env, net::SocketAddr, time::Duration};

use clap::{Args, ValueEnum};

use crate::prelude::*;

/// How `/ocr-pdf` turns a PDF without usable embedded text into text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PdfStrategy {
    /// Rasterize every page and OCR the pages in parallel.
    #[default]
    Rasterize,
    /// Hand the whole document to `ocrmypdf` and read its text sidecar.
    Delegate,
}

/// Options shared by everything that runs OCR pipelines.
#[derive(Args, Clone, Debug)]
pub struct OcrOpts {
    /// Maximum number of pages to OCR at once, and the size of the shared
    /// pool of CPU permits for external tools. Defaults to the number of
    /// CPUs.
    #[clap(long, env = "OCR_API_WORKERS")]
    pub workers: Option<usize>,

    /// Kill any external tool which runs longer than this many seconds. Use
    /// 0 to wait forever.
    #[clap(long = "tool-timeout", env = "OCR_API_TOOL_TIMEOUT", default_value = "300")]
    pub tool_timeout_secs: u64,

    /// Directory in which to create per-request scratch directories.
    /// Defaults to the system temporary directory.
    #[clap(long, env = "OCR_API_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// How to OCR PDFs which lack usable embedded text.
    #[clap(
        long,
        env = "OCR_API_PDF_STRATEGY",
        value_enum,
        default_value_t = PdfStrategy::Rasterize
    )]
    pub pdf_strategy: PdfStrategy,
}

impl Default for OcrOpts {
    fn default() -> Self {
        Self {
            workers: None,
            tool_timeout_secs: 300,
            scratch_dir: None,
            pdf_strategy: PdfStrategy::default(),
        }
    }
}

impl OcrOpts {
    /// How many pages may be processed concurrently.
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&workers| workers > 0)
            .unwrap_or_else(num_cpus::get)
    }

    /// The deadline for a single external tool invocation, if any.
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }

    /// The parent directory for scratch space.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

/// Options for the HTTP server.
#[derive(Args, Clone, Debug)]
pub struct ServeOpts {
    /// Address to listen on.
    #[clap(long, env = "OCR_API_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Largest accepted request body, in megabytes.
    #[clap(long, env = "OCR_API_MAX_UPLOAD_MB", default_value = "100")]
    pub max_upload_mb: usize,

    #[clap(flatten)]
    pub ocr: OcrOpts,
}

impl ServeOpts {
    /// The request body limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[clap(flatten)]
        serve: ServeOpts,
    }

    #[test]
    fn zero_workers_falls_back_to_cpu_count() {
        let opts = OcrOpts {
            workers: Some(0),
            ..OcrOpts::default()
        };
        assert_eq!(opts.worker_count(), num_cpus::get());

        let opts = OcrOpts {
            workers: Some(3),
            ..OcrOpts::default()
        };
        assert_eq!(opts.worker_count(), 3);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let opts = OcrOpts {
            tool_timeout_secs: 0,
            ..OcrOpts::default()
        };
        assert_eq!(opts.tool_timeout(), None);
        assert_eq!(
            OcrOpts::default().tool_timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn serve_opts_parse_from_flags() {
        let cli = TestCli::try_parse_from([
            "ocr-api",
            "--bind",
            "127.0.0.1:9000",
            "--max-upload-mb",
            "5",
            "--workers",
            "2",
            "--pdf-strategy",
            "delegate",
        ])
        .expect("flags should parse");
        assert_eq!(cli.serve.bind, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.serve.max_upload_bytes(), 5 * 1024 * 1024);
        assert_eq!(cli.serve.ocr.worker_count(), 2);
        assert_eq!(cli.serve.ocr.pdf_strategy, PdfStrategy::Delegate);
    }
}
