//! Text extractor: plain text from uploaded PDF bytes.

use thiserror::Error;
use tracing::debug;

/// Upload ceiling for résumé PDFs.
pub const MAX_PDF_BYTES: usize = 20 * 1024 * 1024;
pub const PDF_MEDIA_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File is empty")]
    Empty,

    #[error("File exceeds the {} MB limit", MAX_PDF_BYTES / (1024 * 1024))]
    TooLarge,

    #[error("File is not a PDF")]
    NotPdf,

    #[error("Could not read PDF: {0}")]
    Unreadable(String),

    #[error("PDF contains no extractable text")]
    NoText,
}

/// Validates the upload and extracts its text on the blocking pool.
pub async fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    validate_pdf(&bytes)?;

    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| ExtractionError::Unreadable(e.to_string()))?
        .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;

    let text = clean_extracted_text(&raw);
    if text.is_empty() {
        return Err(ExtractionError::NoText);
    }
    debug!("Extracted {} chars of resume text", text.len());
    Ok(text)
}

pub fn validate_pdf(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }
    if bytes.len() > MAX_PDF_BYTES {
        return Err(ExtractionError::TooLarge);
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ExtractionError::NotPdf);
    }
    Ok(())
}

/// Trims each line and collapses runs of blank lines into one.
fn clean_extracted_text(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
