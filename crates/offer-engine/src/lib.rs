//! Offer assembly pipeline
//!
//! Produces the primary sales offer and any number of competing-company
//! variants from one baseline:
//!
//! - [`rotation`] picks equivalent products from brands no earlier offer used
//! - [`pricing`] derives strictly increasing prices for the rotated offers
//! - [`assembly`] appends datasheets, partner documents, financing tables and
//!   charts to a base document, keeping protected groups on one page
//! - [`orchestrator`] runs all of the above for a list of companies
//!
//! Nothing short of an unreadable base document fails a run; everything
//! else is reported as a warning next to a usable document.

pub mod assembly;
pub mod chart_cache;
pub mod error;
pub mod financing;
pub mod orchestrator;
pub mod pricing;
pub mod protection;
pub mod rotation;
pub mod settings;
pub mod sources;

pub use assembly::{
    AssemblyPhase, ChartRequest, DocumentAssemblyEngine, SectionKind, SectionRequest,
};
pub use chart_cache::{CacheStats, ChartCache};
pub use error::{AssemblyError, OfferWarning, SourceError};
pub use financing::{FinancingBreakdown, FinancingOption, ResolvedFinancing};
pub use orchestrator::{BaselineOffer, CompanyOffer, MultiOfferOrchestrator};
pub use pricing::PriceModificationEngine;
pub use protection::{ComposeState, PageProtectionManager, ProtectedGroup};
pub use rotation::{ProductRotationEngine, RotationOutcome, RotationState};
pub use settings::OfferSettings;
pub use sources::{
    ChartSource, CompanyOverlay, DocumentSource, FsDocumentSource, InMemoryCatalog, MetadataOverlay,
    ProductCatalog, StaticChartSource,
};
