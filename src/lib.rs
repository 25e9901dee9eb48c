//! An HTTP service which OCRs images and PDFs by orchestrating Tesseract,
//! Poppler and OCRmyPDF.

pub mod cmd;
pub mod config;
pub mod cpu_limit;
pub mod error;
pub mod ocr;
pub mod prelude;
pub mod scratch;
pub mod server;
pub mod tools;
