use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Encrypted PDF could not be opened: {0}")]
    Encrypted(String),

    #[error("Unsupported chart image: {0}")]
    ImageError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}
