//! Competing offers for a list of companies
//!
//! Rotation is resolved for every company first, strictly in company order,
//! since each pick depends on the brands handed out before it. Assembling
//! the resolved offers is independent per company and may run on a thread
//! pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use offer_types::{
    AssemblyResult, Category, Company, OfferConfiguration, PriceModifierConfig, Product,
};
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::assembly::{DocumentAssemblyEngine, SectionRequest};
use crate::error::OfferWarning;
use crate::pricing::PriceModificationEngine;
use crate::rotation::{ProductRotationEngine, RotationState};
use crate::settings::OfferSettings;
use crate::sources::CompanyOverlay;

/// The primary offer the competing offers are derived from
#[derive(Debug, Clone)]
pub struct BaselineOffer {
    pub products: BTreeMap<Category, Product>,
    pub base_price: f64,
    /// Rendered base document, before company overlay
    pub base_document: Vec<u8>,
    pub sections: Vec<SectionRequest>,
}

#[derive(Debug, Clone)]
pub struct CompanyOffer {
    pub company: Company,
    /// Absent only if the offer could not be planned at all
    pub configuration: Option<OfferConfiguration>,
    pub result: AssemblyResult,
}

/// A resolved offer waiting for assembly
#[derive(Debug, Clone)]
struct PlannedOffer {
    company: Company,
    configuration: OfferConfiguration,
    warnings: Vec<OfferWarning>,
}

pub struct MultiOfferOrchestrator {
    engine: DocumentAssemblyEngine,
    overlay: Arc<dyn CompanyOverlay>,
    affinity: Vec<(Category, Category)>,
    parallel: bool,
}

impl MultiOfferOrchestrator {
    pub fn new(
        engine: DocumentAssemblyEngine,
        overlay: Arc<dyn CompanyOverlay>,
        settings: &OfferSettings,
    ) -> Self {
        Self {
            engine,
            overlay,
            affinity: settings.rotation.affinity.clone(),
            parallel: settings.assembly.parallel,
        }
    }

    pub fn engine(&self) -> &DocumentAssemblyEngine {
        &self.engine
    }

    /// One offer per company, in company order. A failing company yields a
    /// failed result and never stops the others.
    #[instrument(skip_all, fields(companies = companies.len(), parallel = self.parallel))]
    pub fn generate_offers(
        &self,
        baseline: &BaselineOffer,
        companies: &[Company],
        rotation_tolerance: f64,
        price_config: &PriceModifierConfig,
    ) -> Vec<CompanyOffer> {
        let plans = self.plan_offers(baseline, companies, rotation_tolerance, price_config);

        let offers: Vec<CompanyOffer> = if self.parallel {
            plans.into_par_iter().map(|plan| self.assemble_offer(baseline, plan)).collect()
        } else {
            plans.into_iter().map(|plan| self.assemble_offer(baseline, plan)).collect()
        };

        info!(
            offers = offers.len(),
            failed = offers.iter().filter(|o| !o.result.has_document()).count(),
            "Generated competing offers"
        );
        offers
    }

    /// Sequential rotation and pricing for every company
    fn plan_offers(
        &self,
        baseline: &BaselineOffer,
        companies: &[Company],
        rotation_tolerance: f64,
        price_config: &PriceModifierConfig,
    ) -> Vec<PlannedOffer> {
        let catalog = self.engine.catalog();
        let rotation =
            ProductRotationEngine::new(catalog.as_ref()).with_affinity(self.affinity.clone());
        let pricing = PriceModificationEngine::new(*price_config);
        let price_warnings = pricing.warnings();
        for warning in &price_warnings {
            warn!(%warning, "Price configuration");
        }

        let mut state = RotationState::seeded(&baseline.products);
        companies
            .iter()
            .enumerate()
            .map(|(index, company)| {
                let outcome =
                    rotation.rotate(&baseline.products, &mut state, index, rotation_tolerance);
                let final_price = pricing.modify(baseline.base_price, index);
                let mut warnings = price_warnings.clone();
                warnings.extend(outcome.warnings.iter().cloned());

                PlannedOffer {
                    company: company.clone(),
                    configuration: OfferConfiguration {
                        company_id: company.id.clone(),
                        selected_products: outcome.products(),
                        base_price: baseline.base_price,
                        final_price,
                    },
                    warnings,
                }
            })
            .collect()
    }

    fn assemble_offer(&self, baseline: &BaselineOffer, plan: PlannedOffer) -> CompanyOffer {
        let PlannedOffer {
            company,
            configuration,
            warnings,
        } = plan;

        let result = match self.overlay.apply(&baseline.base_document, &company, &configuration) {
            Ok(base) => {
                let sections =
                    resolve_sections(&baseline.sections, &baseline.products, &configuration);
                match self.engine.assemble(&base, &sections) {
                    Ok(mut result) => {
                        let mut all: Vec<String> =
                            warnings.iter().map(ToString::to_string).collect();
                        all.append(&mut result.warnings);
                        result.warnings = all;
                        result
                    }
                    Err(e) => {
                        warn!(company = %company.id, error = %e, "Assembly failed");
                        failed(&warnings, format!("Assembly failed for {}: {}", company.name, e))
                    }
                }
            }
            Err(e) => {
                warn!(company = %company.id, error = %e, "Company overlay failed");
                failed(&warnings, format!("Overlay failed for {}: {}", company.name, e))
            }
        };

        CompanyOffer {
            company,
            configuration: Some(configuration),
            result,
        }
    }
}

fn failed(warnings: &[OfferWarning], error: String) -> AssemblyResult {
    let mut result = AssemblyResult::failed(error);
    result.warnings = warnings.iter().map(ToString::to_string).collect();
    result
}

/// Rewrite baseline section requests for one rotated offer: datasheets of
/// baseline products point at the rotated products, company documents
/// default to the offer's company and financing defaults to its final price
pub fn resolve_sections(
    sections: &[SectionRequest],
    baseline: &BTreeMap<Category, Product>,
    offer: &OfferConfiguration,
) -> Vec<SectionRequest> {
    sections
        .iter()
        .map(|section| match section {
            SectionRequest::Datasheets { product_ids } => SectionRequest::Datasheets {
                product_ids: product_ids
                    .iter()
                    .map(|id| {
                        baseline
                            .iter()
                            .find(|(_, product)| &product.id == id)
                            .and_then(|(category, _)| offer.product(*category))
                            .map_or_else(|| id.clone(), |rotated| rotated.id.clone())
                    })
                    .collect(),
            },
            SectionRequest::CompanyDocuments {
                company_id,
                doc_type,
                document_ids,
            } => SectionRequest::CompanyDocuments {
                company_id: company_id.clone().or_else(|| Some(offer.company_id.clone())),
                doc_type: doc_type.clone(),
                document_ids: document_ids.clone(),
            },
            SectionRequest::Financing { options, offer_price } => SectionRequest::Financing {
                options: options.clone(),
                offer_price: offer_price.or(Some(offer.final_price)),
            },
            SectionRequest::Charts { charts } => SectionRequest::Charts { charts: charts.clone() },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::financing::FinancingOption;
    use pretty_assertions::assert_eq;

    fn product(id: &str, category: Category, brand: &str) -> Product {
        Product {
            id: id.to_string(),
            category,
            brand: brand.to_string(),
            model: format!("{}-model", brand),
            capacity_value: 10.0,
            unit_price: 100.0,
            datasheet_path: None,
        }
    }

    #[test]
    fn test_resolve_sections_rewrites_per_offer_fields() {
        let baseline: BTreeMap<Category, Product> = [
            (Category::Inverter, product("inv-base", Category::Inverter, "Base")),
            (Category::Storage, product("bat-base", Category::Storage, "Base")),
        ]
        .into_iter()
        .collect();
        let offer = OfferConfiguration {
            company_id: "acme".to_string(),
            selected_products: [
                (Category::Inverter, product("inv-new", Category::Inverter, "New")),
                (Category::Storage, product("bat-new", Category::Storage, "New")),
            ]
            .into_iter()
            .collect(),
            base_price: 20_000.0,
            final_price: 23_000.0,
        };
        let sections = vec![
            SectionRequest::Datasheets {
                product_ids: vec!["bat-base".to_string(), "accessory".to_string()],
            },
            SectionRequest::CompanyDocuments {
                company_id: None,
                doc_type: "terms".to_string(),
                document_ids: vec![],
            },
            SectionRequest::CompanyDocuments {
                company_id: Some("installer".to_string()),
                doc_type: "certificates".to_string(),
                document_ids: vec![],
            },
            SectionRequest::Financing {
                options: vec![FinancingOption::new("Default")],
                offer_price: None,
            },
        ];

        let resolved = resolve_sections(&sections, &baseline, &offer);
        assert_eq!(
            resolved,
            vec![
                SectionRequest::Datasheets {
                    product_ids: vec!["bat-new".to_string(), "accessory".to_string()],
                },
                SectionRequest::CompanyDocuments {
                    company_id: Some("acme".to_string()),
                    doc_type: "terms".to_string(),
                    document_ids: vec![],
                },
                SectionRequest::CompanyDocuments {
                    company_id: Some("installer".to_string()),
                    doc_type: "certificates".to_string(),
                    document_ids: vec![],
                },
                SectionRequest::Financing {
                    options: vec![FinancingOption::new("Default")],
                    offer_price: Some(23_000.0),
                },
            ]
        );
    }
}
