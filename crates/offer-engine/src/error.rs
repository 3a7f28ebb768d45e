use offer_pdf::PdfError;
use offer_types::Category;
use thiserror::Error;

/// The only failure that surfaces to callers of `assemble`: there is no
/// base document left to fall back to.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Base document is unreadable: {0}")]
    BaseDocumentUnreadable(#[source] PdfError),

    #[error("Base document is empty")]
    EmptyBaseDocument,
}

/// Failures of the external collaborators (catalog, document store, charts)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Unavailable(String),
}

/// Recoverable problems. Each one becomes a human-readable warning string
/// in the assembly result; none of them aborts a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OfferWarning {
    #[error("Rotation exhausted for {category} in offer {offer_index}: {detail}")]
    RotationExhausted {
        category: Category,
        offer_index: usize,
        detail: String,
    },

    #[error(
        "Price configuration: {field} is {value}, rotated offers may not be strictly more expensive"
    )]
    PriceConfiguration { field: &'static str, value: f64 },

    #[error("Section '{section}' skipped: {reason}")]
    SectionGeneration { section: String, reason: String },

    #[error("Document '{document}' skipped: {reason}")]
    MergeInput { document: String, reason: String },
}

impl OfferWarning {
    pub fn section(section: impl Into<String>, reason: impl ToString) -> Self {
        OfferWarning::SectionGeneration {
            section: section.into(),
            reason: reason.to_string(),
        }
    }

    pub fn merge_input(document: impl Into<String>, reason: impl ToString) -> Self {
        OfferWarning::MergeInput {
            document: document.into(),
            reason: reason.to_string(),
        }
    }
}
