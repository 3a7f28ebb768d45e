//! Shared data model for the offer pipeline
//!
//! Plain serializable types exchanged between the rendering crate, the
//! engine and whatever UI layer drives them.

pub mod offer;
pub mod result;
pub mod types;

pub use offer::{OfferConfiguration, PriceLine, PriceModifierConfig, PricingUnit};
pub use result::{AssemblyResult, ProtectionAction, ProtectionLogEntry};
pub use types::{CapacityUnit, Category, Company, CompanyDocument, Product};
