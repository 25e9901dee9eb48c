//! The HTTP service.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;

use crate::{config::ServeOpts, ocr::OcrService, prelude::*};

pub mod form;
pub mod routes;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The OCR pipelines.
    pub service: OcrService,
}

/// Build our router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(routes::health))
        .route("/ocr", post(routes::ocr_image))
        .route("/ocr-hocr", post(routes::ocr_image_hocr))
        .route("/ocr-pdf", post(routes::ocr_pdf))
        .route("/ocr-pdf-hocr", post(routes::ocr_pdf_hocr))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Listen on `opts.bind` until we receive Ctrl-C or SIGTERM.
#[instrument(level = "debug", skip_all, fields(bind = %opts.bind))]
pub async fn serve(opts: &ServeOpts, service: OcrService) -> Result<()> {
    let app = router(AppState { service }, opts.max_upload_bytes());
    let listener = TcpListener::bind(opts.bind)
        .await
        .with_context(|| format!("cannot listen on {}", opts.bind))?;
    info!(
        address = %opts.bind,
        workers = opts.ocr.worker_count(),
        pdf_strategy = ?opts.ocr.pdf_strategy,
        "OCR service listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("OCR service stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("cannot listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
