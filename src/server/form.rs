//! Multipart form parsing.

use std::{collections::HashMap, str::FromStr};

use axum::{
    extract::{Multipart, multipart::MultipartError},
    http::StatusCode,
};

use crate::{error::OcrError, ocr::UploadedDocument, prelude::*};

/// The name of the form part holding the uploaded file.
const FILE_FIELD: &str = "file";

/// A parsed OCR request form: one uploaded file plus text fields.
#[derive(Debug, Default)]
pub struct OcrForm {
    file: Option<UploadedDocument>,
    fields: HashMap<String, String>,
}

impl OcrForm {
    /// Read every part of a multipart request.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, OcrError> {
        let mut form = OcrForm::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_owned();
            if name == FILE_FIELD {
                let filename = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let data = field.bytes().await.map_err(multipart_error)?;
                debug!(
                    ?filename,
                    ?content_type,
                    bytes = data.len(),
                    "Received upload"
                );
                form.file = Some(UploadedDocument {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Take the uploaded file.
    pub fn take_file(&mut self) -> Result<UploadedDocument, OcrError> {
        self.file.take().ok_or(OcrError::MissingFile)
    }

    /// Look up a field. Blank fields count as missing.
    fn raw(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// A text field, or `default`.
    pub fn text(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or(default).to_owned()
    }

    /// A numeric field, or `default`.
    pub fn number<T>(&self, name: &str, default: T) -> Result<T, OcrError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(name) {
            Some(value) => value
                .parse()
                .map_err(|err| OcrError::invalid_field(name, format!("{value:?}: {err}"))),
            None => Ok(default),
        }
    }

    /// A boolean field, or `default`.
    pub fn flag(&self, name: &str, default: bool) -> Result<bool, OcrError> {
        match self.raw(name) {
            Some(value) => parse_bool(value).ok_or_else(|| {
                OcrError::invalid_field(name, format!("{value:?} is not a boolean"))
            }),
            None => Ok(default),
        }
    }
}

/// Parse the usual spellings of a form boolean.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn multipart_error(err: MultipartError) -> OcrError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OcrError::UploadTooLarge
    } else {
        OcrError::MalformedUpload(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> OcrForm {
        OcrForm {
            file: None,
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for value in ["true", "TRUE", "1", "yes", "On"] {
            assert_eq!(parse_bool(value), Some(true), "{value}");
        }
        for value in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(value), Some(false), "{value}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn missing_and_blank_fields_use_defaults() -> Result<()> {
        let form = form(&[("lang", "  "), ("dpi", "")]);
        assert_eq!(form.text("lang", "tur"), "tur");
        assert_eq!(form.number("dpi", 200u32)?, 200);
        assert!(!form.flag("force_ocr", false)?);
        Ok(())
    }

    #[test]
    fn fields_are_parsed() -> Result<()> {
        let form = form(&[("lang", "eng+deu"), ("psm", "11"), ("force_ocr", "yes")]);
        assert_eq!(form.text("lang", "tur"), "eng+deu");
        assert_eq!(form.number("psm", 6u32)?, 11);
        assert!(form.flag("force_ocr", false)?);
        Ok(())
    }

    #[test]
    fn bad_fields_are_rejected() {
        let form = form(&[("psm", "six"), ("force_ocr", "sometimes")]);
        assert!(matches!(
            form.number("psm", 6u32),
            Err(OcrError::InvalidField { ref field, .. }) if field == "psm"
        ));
        assert!(matches!(
            form.flag("force_ocr", false),
            Err(OcrError::InvalidField { ref field, .. }) if field == "force_ocr"
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            OcrForm::default().take_file(),
            Err(OcrError::MissingFile)
        ));
    }
}
