use std::str::FromStr;

use clap::{Parser, Subcommand};
use ocr_api::{cmd, config::ServeOpts, prelude::*};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

/// OCR images and PDFs with Tesseract and Poppler.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OCR_API_BIND, OCR_API_MAX_UPLOAD_MB: Server settings.
  - OCR_API_WORKERS, OCR_API_TOOL_TIMEOUT, OCR_API_SCRATCH_DIR,
    OCR_API_PDF_STRATEGY: OCR settings.
  - RUST_LOG: Log filter, such as `ocr_api=debug`.

  These variables may be set in a standard `.env` file.

  `tesseract`, `pdftotext`, `pdftoppm`, `pdftocairo`, `pdfinfo` and
  (with `--pdf-strategy delegate`) `ocrmypdf` must be on the PATH.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the HTTP service.
    Serve(ServeOpts),
    /// OCR a single local image or PDF and print the result.
    Ocr(cmd::ocr::OcrFileOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Serve(serve_opts) => {
            cmd::serve::cmd_serve(serve_opts).await?;
        }
        Cmd::Ocr(ocr_opts) => {
            cmd::ocr::cmd_ocr(ocr_opts).await?;
        }
    }
    Ok(())
}
