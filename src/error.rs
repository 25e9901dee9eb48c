//! Errors reported by the OCR pipelines.
//!
//! Every pipeline resolves its own failures into either a fallback or one of
//! these variants. The HTTP layer turns each variant into a JSON body with an
//! `error` field (see `server::routes`).

use thiserror::Error;

/// An error which ends a single OCR request.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The recognition engine exited with an error and printed no text.
    #[error("{stderr}")]
    Recognition {
        /// Diagnostic output captured from the engine.
        stderr: String,
    },

    /// The engine finished, but the hOCR file it should have written is missing.
    #[error("hOCR generation failed")]
    ArtifactMissing {
        /// Diagnostic output captured from the engine.
        stderr: String,
    },

    /// Rasterization or the all-in-one OCR tool failed outright.
    #[error("{0}")]
    Conversion(String),

    /// The PDF was converted, but no page images were produced.
    #[error("no pages extracted from PDF")]
    NoPages,

    /// Every page was recognized, but none of them contained text.
    #[error("no text extracted from any page")]
    NoText,

    /// The multipart request body could not be read.
    #[error("malformed upload: {0}")]
    MalformedUpload(String),

    /// The request body was larger than the configured limit.
    #[error("upload is too large")]
    UploadTooLarge,

    /// The request did not include a `file` part.
    #[error("missing required file upload `file`")]
    MissingFile,

    /// A form field could not be parsed.
    #[error("invalid value for `{field}`: {message}")]
    InvalidField {
        /// The name of the form field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Anything else, usually local I/O on scratch files.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OcrError {
    /// Build an [`OcrError::InvalidField`].
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    /// Captured tool diagnostics which should be returned alongside the
    /// error message, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ArtifactMissing { stderr } => Some(stderr),
            _ => None,
        }
    }
}
