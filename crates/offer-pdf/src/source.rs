//! Loading of documents that get appended to a base document

use lopdf::Document;
use tracing::debug;

use crate::error::PdfError;

/// A parsed, decrypted document that is ready to be merged
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub label: String,
    pub(crate) doc: Document,
    page_count: u32,
}

impl SourceDocument {
    /// Parse `bytes`, decrypting with an empty password when the document
    /// reports itself as encrypted.
    pub fn load(label: impl Into<String>, bytes: &[u8]) -> Result<Self, PdfError> {
        let label = label.into();
        let doc = open_document(bytes)?;

        let page_count = doc.get_pages().len() as u32;
        if page_count == 0 {
            return Err(PdfError::ParseError(format!("{} has no pages", label)));
        }
        debug!(%label, page_count, "Loaded source document");

        Ok(Self {
            label,
            doc,
            page_count,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

/// Parse bytes into a document, handling the empty-password encryption case
pub(crate) fn open_document(bytes: &[u8]) -> Result<Document, PdfError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("encrypt") || lower.contains("password") || lower.contains("decrypt") {
            PdfError::Encrypted(message)
        } else {
            PdfError::ParseError(message)
        }
    })?;

    if doc.is_encrypted() {
        doc.decrypt("")
            .map_err(|e| PdfError::Encrypted(e.to_string()))?;
    }

    Ok(doc)
}
