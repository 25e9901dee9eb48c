//! The `serve` subcommand.

use crate::{config::ServeOpts, prelude::*, server};

use super::system_service;

/// The `serve` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_serve(opts: &ServeOpts) -> Result<()> {
    let service = system_service(&opts.ocr);
    server::serve(opts, service).await
}
