//! HTTP handlers.

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::{
    error::OcrError,
    ocr::{OcrResult, RecognitionParams},
    prelude::*,
};

use super::{AppState, form::OcrForm};

/// Language used when the client doesn't ask for one.
pub const DEFAULT_LANG: &str = "tur";

/// Page segmentation mode for `/ocr`: a single uniform block of text.
pub const DEFAULT_TEXT_PSM: u32 = 6;

/// Page segmentation mode for `/ocr-hocr`: fully automatic.
pub const DEFAULT_HOCR_PSM: u32 = 3;

/// OCR engine mode for `/ocr`: LSTM only.
pub const DEFAULT_OEM: u32 = 1;

/// Rasterization resolution for PDFs.
pub const DEFAULT_DPI: u32 = 200;

/// Response body for `GET /`.
#[derive(Debug, Serialize)]
pub struct Health {
    ok: bool,
}

/// Response body for `POST /ocr`.
#[derive(Debug, Serialize)]
pub struct TextResponse {
    text: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
}

impl OcrError {
    /// The HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OcrError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            OcrError::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            OcrError::MissingFile | OcrError::InvalidField { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            OcrError::Recognition { .. }
            | OcrError::ArtifactMissing { .. }
            | OcrError::Conversion(_)
            | OcrError::NoPages
            | OcrError::NoText
            | OcrError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match &self {
            // Include the whole context chain.
            OcrError::Internal(err) => format!("{err:#}"),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!(%status, "Request failed: {}", error);
        } else {
            debug!(%status, "Rejected request: {}", error);
        }
        let body = ErrorBody {
            error,
            stderr: self.stderr().map(str::to_owned),
        };
        (status, Json(body)).into_response()
    }
}

/// `GET /`: liveness probe.
pub async fn health() -> Json<Health> {
    Json(Health { ok: true })
}

/// `POST /ocr`: OCR a single image as plain text.
#[instrument(level = "debug", skip_all)]
pub async fn ocr_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TextResponse>, OcrError> {
    let mut form = OcrForm::from_multipart(multipart).await?;
    let upload = form.take_file()?;
    let params = RecognitionParams::new(
        form.text("lang", DEFAULT_LANG),
        form.number("psm", DEFAULT_TEXT_PSM)?,
        Some(form.number("oem", DEFAULT_OEM)?),
    );
    let text = state.service.image_text(&upload, &params).await?;
    Ok(Json(TextResponse { text }))
}

/// `POST /ocr-hocr`: OCR a single image as hOCR.
#[instrument(level = "debug", skip_all)]
pub async fn ocr_image_hocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Html<String>, OcrError> {
    let mut form = OcrForm::from_multipart(multipart).await?;
    let upload = form.take_file()?;
    let params = RecognitionParams::new(
        form.text("lang", DEFAULT_LANG),
        form.number("psm", DEFAULT_HOCR_PSM)?,
        None,
    );
    let hocr = state.service.image_hocr(&upload, &params).await?;
    Ok(Html(hocr))
}

/// `POST /ocr-pdf`: extract or recognize the text of a PDF.
#[instrument(level = "debug", skip_all)]
pub async fn ocr_pdf(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<OcrResult>, OcrError> {
    let mut form = OcrForm::from_multipart(multipart).await?;
    let upload = form.take_file()?;
    let lang = form.text("lang", DEFAULT_LANG);
    let force_ocr = form.flag("force_ocr", false)?;
    let dpi = form.number("dpi", DEFAULT_DPI)?;
    let result = state
        .service
        .pdf_text(&upload, &lang, force_ocr, dpi)
        .await?;
    Ok(Json(result))
}

/// `POST /ocr-pdf-hocr`: OCR every page of a PDF into one hOCR document.
#[instrument(level = "debug", skip_all)]
pub async fn ocr_pdf_hocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Html<String>, OcrError> {
    let mut form = OcrForm::from_multipart(multipart).await?;
    let upload = form.take_file()?;
    let lang = form.text("lang", DEFAULT_LANG);
    let dpi = form.number("dpi", DEFAULT_DPI)?;
    let hocr = state.service.pdf_hocr(&upload, &lang, dpi).await?;
    Ok(Html(hocr))
}
