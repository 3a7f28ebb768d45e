//! Document assembly
//!
//! A run starts from base document bytes produced elsewhere and appends the
//! optional extended sections. Sections are generated in the order
//! financing, datasheets, company documents, charts, each on its own: a
//! failing section or document is reported as a warning and left out. Pages
//! are appended in the order datasheets, company documents, financing,
//! charts. If merging fails the untouched base document is returned.
//!
//! Only an unreadable base document is an error for the caller.

use std::sync::Arc;

use offer_pdf::{
    merge_into_base, render_emissions, ChartImage, Emission, LayoutBlock, PageGeometry,
    SourceDocument,
};
use offer_types::{AssemblyResult, ProtectionLogEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::chart_cache::{data_fingerprint, ChartCache};
use crate::error::{AssemblyError, OfferWarning};
use crate::financing::FinancingOption;
use crate::protection::PageProtectionManager;
use crate::settings::{OfferSettings, PaymentTerms};
use crate::sources::{ChartSource, DocumentSource, ProductCatalog};

/// One optional part of the extended offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum SectionRequest {
    /// Product datasheets, in the order of `product_ids`
    Datasheets { product_ids: Vec<String> },
    /// Partner documents of a company. An empty `document_ids` list appends
    /// every listed document.
    CompanyDocuments {
        #[serde(default)]
        company_id: Option<String>,
        doc_type: String,
        #[serde(default)]
        document_ids: Vec<String>,
    },
    /// Financing tables. Options without a principal finance `offer_price`.
    Financing {
        options: Vec<FinancingOption>,
        #[serde(default)]
        offer_price: Option<f64>,
    },
    Charts { charts: Vec<ChartRequest> },
}

impl SectionRequest {
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionRequest::Datasheets { .. } => SectionKind::Datasheets,
            SectionRequest::CompanyDocuments { .. } => SectionKind::CompanyDocuments,
            SectionRequest::Financing { .. } => SectionKind::Financing,
            SectionRequest::Charts { .. } => SectionKind::Charts,
        }
    }
}

/// A pre-rendered chart placed on its own protected block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub chart_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub title: String,
    #[serde(default)]
    pub caption: Option<String>,
    /// Width in points; defaults to the full content width
    #[serde(default)]
    pub display_width: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Financing,
    Datasheets,
    CompanyDocuments,
    Charts,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Financing => "financing",
            SectionKind::Datasheets => "datasheets",
            SectionKind::CompanyDocuments => "company documents",
            SectionKind::Charts => "charts",
        }
    }

    fn generation_rank(self) -> u8 {
        match self {
            SectionKind::Financing => 0,
            SectionKind::Datasheets => 1,
            SectionKind::CompanyDocuments => 2,
            SectionKind::Charts => 3,
        }
    }

    fn merge_rank(self) -> u8 {
        match self {
            SectionKind::Datasheets => 0,
            SectionKind::CompanyDocuments => 1,
            SectionKind::Financing => 2,
            SectionKind::Charts => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPhase {
    BaseReady,
    ExtendedPending,
    SectionsGenerating,
    Merging,
    Done,
    DoneWithFallback,
}

/// What a section contributes to the merge
#[derive(Debug, Default)]
struct SectionOutput {
    documents: Vec<SourceDocument>,
    /// Items of the section that were skipped
    warnings: Vec<OfferWarning>,
    protection_log: Vec<ProtectionLogEntry>,
}

pub struct DocumentAssemblyEngine {
    catalog: Arc<dyn ProductCatalog>,
    documents: Arc<dyn DocumentSource>,
    charts: Arc<dyn ChartSource>,
    chart_cache: Arc<ChartCache>,
    geometry: PageGeometry,
    block_spacing: f64,
    font_size: f64,
    payment_terms: PaymentTerms,
}

impl DocumentAssemblyEngine {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        documents: Arc<dyn DocumentSource>,
        charts: Arc<dyn ChartSource>,
        settings: &OfferSettings,
    ) -> Self {
        Self {
            catalog,
            documents,
            charts,
            chart_cache: Arc::new(ChartCache::new(settings.cache.chart_cache_max_size)),
            geometry: settings.layout.geometry(),
            block_spacing: settings.layout.block_spacing_pt,
            font_size: settings.layout.body_font_size,
            payment_terms: settings.financing,
        }
    }

    /// Share an existing chart cache, e.g. across engines of one batch
    pub fn with_chart_cache(mut self, cache: Arc<ChartCache>) -> Self {
        self.chart_cache = cache;
        self
    }

    pub fn chart_cache(&self) -> &Arc<ChartCache> {
        &self.chart_cache
    }

    pub fn catalog(&self) -> &Arc<dyn ProductCatalog> {
        &self.catalog
    }

    /// Append the requested sections to `base`
    ///
    /// # Errors
    ///
    /// Fails only when `base` is empty or cannot be parsed. Every other
    /// problem ends up in the result's warnings or errors.
    #[instrument(skip_all, fields(base_len = base.len(), sections = sections.len()))]
    pub fn assemble(
        &self,
        base: &[u8],
        sections: &[SectionRequest],
    ) -> Result<AssemblyResult, AssemblyError> {
        if base.is_empty() {
            return Err(AssemblyError::EmptyBaseDocument);
        }
        let base_pages =
            offer_pdf::get_page_count(base).map_err(AssemblyError::BaseDocumentUnreadable)?;
        enter(AssemblyPhase::BaseReady);

        let mut result = AssemblyResult {
            document_bytes: base.to_vec(),
            page_count: base_pages,
            ..AssemblyResult::default()
        };
        if sections.is_empty() {
            enter(AssemblyPhase::Done);
            return Ok(result);
        }
        enter(AssemblyPhase::ExtendedPending);

        let mut order: Vec<usize> = (0..sections.len()).collect();
        order.sort_by_key(|&i| sections[i].kind().generation_rank());

        enter(AssemblyPhase::SectionsGenerating);
        let mut warnings = Vec::new();
        let mut generated = Vec::new();
        for index in order {
            let section = &sections[index];
            let kind = section.kind();
            match self.generate(section) {
                Ok(output) => {
                    debug!(
                        section = kind.as_str(),
                        documents = output.documents.len(),
                        skipped = output.warnings.len(),
                        "Section generated"
                    );
                    warnings.extend(output.warnings);
                    result.protection_log.extend(output.protection_log);
                    generated.push((kind.merge_rank(), index, output.documents));
                }
                Err(warning) => {
                    warn!(section = kind.as_str(), %warning, "Section skipped");
                    warnings.push(warning);
                }
            }
        }
        result.warnings = warnings.iter().map(ToString::to_string).collect();

        generated.sort_by_key(|(rank, index, _)| (*rank, *index));
        let documents: Vec<SourceDocument> =
            generated.into_iter().flat_map(|(_, _, docs)| docs).collect();

        enter(AssemblyPhase::Merging);
        match merge_into_base(base, documents) {
            Ok(merged) => {
                result.document_bytes = merged.bytes;
                result.page_count = merged.page_count;
                enter(AssemblyPhase::Done);
            }
            Err(e) => {
                warn!(error = %e, "Merge failed, falling back to base document");
                result.errors.push(format!("Extended sections dropped, merge failed: {}", e));
                enter(AssemblyPhase::DoneWithFallback);
            }
        }

        info!(
            pages = result.page_count,
            warnings = result.warnings.len(),
            errors = result.errors.len(),
            "Assembly finished"
        );
        Ok(result)
    }

    fn generate(&self, section: &SectionRequest) -> Result<SectionOutput, OfferWarning> {
        match section {
            SectionRequest::Datasheets { product_ids } => Ok(self.datasheets(product_ids)),
            SectionRequest::CompanyDocuments {
                company_id,
                doc_type,
                document_ids,
            } => {
                let section = SectionKind::CompanyDocuments.as_str();
                let company_id = company_id
                    .as_deref()
                    .ok_or_else(|| OfferWarning::section(section, "no company given"))?;
                Ok(self.company_documents(company_id, doc_type, document_ids))
            }
            SectionRequest::Financing {
                options,
                offer_price,
            } => self.financing(options, *offer_price),
            SectionRequest::Charts { charts } => self.chart_pages(charts),
        }
    }

    fn datasheets(&self, product_ids: &[String]) -> SectionOutput {
        let mut output = SectionOutput::default();
        for id in product_ids {
            let product = match self.catalog.get_product_by_id(id) {
                Ok(product) => product,
                Err(e) => {
                    output.warnings.push(OfferWarning::merge_input(format!("datasheet {}", id), e));
                    continue;
                }
            };
            let Some(path) = product.datasheet_path.as_deref() else {
                output.warnings.push(OfferWarning::merge_input(
                    format!("datasheet {}", product.display_name()),
                    "no datasheet on file",
                ));
                continue;
            };
            match self.load(&format!("datasheet {}", product.display_name()), path) {
                Ok(document) => output.documents.push(document),
                Err(warning) => output.warnings.push(warning),
            }
        }
        output
    }

    fn company_documents(
        &self,
        company_id: &str,
        doc_type: &str,
        document_ids: &[String],
    ) -> SectionOutput {
        let mut output = SectionOutput::default();
        let listed = self.documents.list_company_documents(company_id, doc_type);

        let wanted: Vec<&str> = if document_ids.is_empty() {
            listed.iter().map(|d| d.id.as_str()).collect()
        } else {
            document_ids.iter().map(String::as_str).collect()
        };

        for id in wanted {
            let Some(document) = listed.iter().find(|d| d.id == id) else {
                output.warnings.push(OfferWarning::merge_input(
                    id,
                    format!("not listed for company {} ({})", company_id, doc_type),
                ));
                continue;
            };
            match self.load(&document.display_name, &document.relative_path) {
                Ok(loaded) => output.documents.push(loaded),
                Err(warning) => output.warnings.push(warning),
            }
        }
        output
    }

    fn financing(
        &self,
        options: &[FinancingOption],
        offer_price: Option<f64>,
    ) -> Result<SectionOutput, OfferWarning> {
        let section = SectionKind::Financing.as_str();
        let mut output = SectionOutput::default();
        let mut manager = PageProtectionManager::new(self.geometry, self.block_spacing);
        let mut emissions = Vec::new();
        let width = self.geometry.content_width();

        for option in options {
            let resolved = match option.resolve(&self.payment_terms, offer_price.unwrap_or(0.0)) {
                Ok(resolved) => resolved,
                Err(reason) => {
                    warn!(option = %option.label, %reason, "Financing option skipped");
                    output.warnings.push(OfferWarning::section(
                        format!("financing '{}'", option.label),
                        format!("financing unavailable, {}", reason),
                    ));
                    continue;
                }
            };

            if !emissions.is_empty() {
                emissions.extend(manager.add_spacing(self.font_size * 2.0, 0.0));
            }
            let blocks = vec![
                LayoutBlock::heading(
                    &format!("Financing: {}", resolved.label),
                    self.font_size + 4.0,
                    width,
                ),
                LayoutBlock::table(None, resolved.table_rows(), true, self.font_size),
            ];
            let group = manager
                .wrap_group(blocks, true)
                .with_description(format!("financing '{}'", resolved.label));
            emissions.extend(manager.place(group));
        }

        if !emissions.is_empty() {
            output.documents.push(self.render(section, &emissions)?);
        }
        output.protection_log = manager.into_log();
        Ok(output)
    }

    fn chart_pages(&self, charts: &[ChartRequest]) -> Result<SectionOutput, OfferWarning> {
        let section = SectionKind::Charts.as_str();
        let mut output = SectionOutput::default();
        let mut manager = PageProtectionManager::new(self.geometry, self.block_spacing);
        let mut emissions = Vec::new();
        let width = self.geometry.content_width();

        for chart in charts {
            let image = match self.chart_image(chart) {
                Ok(image) => image,
                Err(warning) => {
                    warn!(chart = %chart.chart_id, %warning, "Chart skipped");
                    output.warnings.push(warning);
                    continue;
                }
            };

            if !emissions.is_empty() {
                emissions.extend(manager.add_spacing(self.font_size * 2.0, 0.0));
            }
            let mut blocks = vec![
                LayoutBlock::heading(&chart.title, self.font_size + 2.0, width),
                LayoutBlock::image(Arc::new(image), chart.display_width.unwrap_or(width), width),
            ];
            if let Some(caption) = chart.caption.as_deref() {
                blocks.push(LayoutBlock::paragraph(caption, self.font_size - 1.0, width));
            }
            let group = manager
                .wrap_group(blocks, true)
                .with_description(format!("chart '{}'", chart.chart_id));
            emissions.extend(manager.place(group));
        }

        if !emissions.is_empty() {
            output.documents.push(self.render(section, &emissions)?);
        }
        output.protection_log = manager.into_log();
        Ok(output)
    }

    /// Chart bytes through the shared cache, decoded for embedding
    fn chart_image(&self, chart: &ChartRequest) -> Result<ChartImage, OfferWarning> {
        let item = format!("chart '{}'", chart.chart_id);
        let fingerprint = data_fingerprint(&chart.data);
        let bytes = self
            .chart_cache
            .get_or_insert_with(&chart.chart_id, &fingerprint, || {
                self.charts.chart_bytes(&chart.chart_id, &chart.data)
            })
            .map_err(|e| OfferWarning::section(item.as_str(), e))?;
        ChartImage::decode(&bytes).map_err(|e| OfferWarning::section(item.as_str(), e))
    }

    fn render(
        &self,
        section: &str,
        emissions: &[Emission],
    ) -> Result<SourceDocument, OfferWarning> {
        let rendered = render_emissions(emissions, &self.geometry)
            .map_err(|e| OfferWarning::section(section, e))?;
        debug!(section, pages = rendered.page_count, "Rendered section");
        SourceDocument::load(section, &rendered.bytes)
            .map_err(|e| OfferWarning::section(section, e))
    }

    /// Read and parse one external document
    fn load(&self, label: &str, relative_path: &str) -> Result<SourceDocument, OfferWarning> {
        let bytes = self
            .documents
            .read(relative_path)
            .map_err(|e| OfferWarning::merge_input(label, e))?;
        SourceDocument::load(label, &bytes).map_err(|e| OfferWarning::merge_input(label, e))
    }
}

fn enter(phase: AssemblyPhase) {
    debug!(?phase, "Assembly phase");
}
