//! External collaborators
//!
//! The catalog, the document store, the charting subsystem and the
//! base-document overlay are owned elsewhere. The pipeline only sees them
//! through these traits; simple implementations are provided for embedding
//! and tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use lopdf::{Document, Object, StringFormat};
use offer_types::{Category, Company, CompanyDocument, OfferConfiguration, Product};

use crate::error::SourceError;

/// Read-only product catalog
pub trait ProductCatalog: Send + Sync {
    fn get_product_by_id(&self, id: &str) -> Result<Product, SourceError>;

    /// Products of `category` in catalog order, minus `exclude_ids`
    fn list_products(&self, category: Category, exclude_ids: &[String]) -> Vec<Product>;
}

/// Partner documents and datasheets
pub trait DocumentSource: Send + Sync {
    fn list_company_documents(&self, company_id: &str, doc_type: &str) -> Vec<CompanyDocument>;

    fn read(&self, relative_path: &str) -> Result<Vec<u8>, SourceError>;
}

/// Pre-rendered chart bytes, supplied by the charting subsystem
pub trait ChartSource: Send + Sync {
    fn chart_bytes(&self, chart_id: &str, data: &serde_json::Value) -> Result<Vec<u8>, SourceError>;
}

/// Substitutes company-specific data into the base document
pub trait CompanyOverlay: Send + Sync {
    fn apply(
        &self,
        base_document: &[u8],
        company: &Company,
        offer: &OfferConfiguration,
    ) -> Result<Vec<u8>, SourceError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Load a catalog from a JSON array of products
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn get_product_by_id(&self, id: &str) -> Result<Product, SourceError> {
        self.products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("Product {}", id)))
    }

    fn list_products(&self, category: Category, exclude_ids: &[String]) -> Vec<Product> {
        self.products
            .iter()
            .filter(|p| p.category == category && !exclude_ids.contains(&p.id))
            .cloned()
            .collect()
    }
}

/// Documents stored below a root directory, with company listings
/// registered up front
#[derive(Debug, Clone)]
pub struct FsDocumentSource {
    root: PathBuf,
    listings: HashMap<(String, String), Vec<CompanyDocument>>,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listings: HashMap::new(),
        }
    }

    pub fn register(&mut self, company_id: &str, doc_type: &str, document: CompanyDocument) {
        self.listings
            .entry((company_id.to_string(), doc_type.to_string()))
            .or_default()
            .push(document);
    }

    pub fn with_document(
        mut self,
        company_id: &str,
        doc_type: &str,
        document: CompanyDocument,
    ) -> Self {
        self.register(company_id, doc_type, document);
        self
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(relative_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative_path.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "Path {} is outside the document root",
                relative_path
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl DocumentSource for FsDocumentSource {
    fn list_company_documents(&self, company_id: &str, doc_type: &str) -> Vec<CompanyDocument> {
        self.listings
            .get(&(company_id.to_string(), doc_type.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn read(&self, relative_path: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.resolve(relative_path)?;
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(format!("File {}", relative_path))
            } else {
                SourceError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })
    }
}

/// Chart bytes rendered ahead of time, keyed by chart id
#[derive(Debug, Clone, Default)]
pub struct StaticChartSource {
    charts: HashMap<String, Vec<u8>>,
}

impl StaticChartSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chart_id: impl Into<String>, bytes: Vec<u8>) {
        self.charts.insert(chart_id.into(), bytes);
    }
}

impl ChartSource for StaticChartSource {
    fn chart_bytes(
        &self,
        chart_id: &str,
        _data: &serde_json::Value,
    ) -> Result<Vec<u8>, SourceError> {
        self.charts
            .get(chart_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("Chart {}", chart_id)))
    }
}

/// Writes the company into the document Info dictionary (Title, Author)
#[derive(Debug, Clone)]
pub struct MetadataOverlay {
    pub title_prefix: String,
}

impl Default for MetadataOverlay {
    fn default() -> Self {
        Self {
            title_prefix: "Offer".to_string(),
        }
    }
}

impl CompanyOverlay for MetadataOverlay {
    fn apply(
        &self,
        base_document: &[u8],
        company: &Company,
        _offer: &OfferConfiguration,
    ) -> Result<Vec<u8>, SourceError> {
        let mut doc = Document::load_mem(base_document)
            .map_err(|e| SourceError::Unavailable(format!("Base document: {}", e)))?;

        let title = format!("{} - {}", self.title_prefix, company.name);
        let info_id = match doc.trailer.get(b"Info").and_then(Object::as_reference) {
            Ok(id) => id,
            Err(_) => {
                let id = doc.add_object(lopdf::Dictionary::new());
                doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };
        let info = doc
            .get_object_mut(info_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| SourceError::Unavailable(format!("Info dictionary: {}", e)))?;
        info.set(
            "Title",
            Object::String(title.into_bytes(), StringFormat::Literal),
        );
        info.set(
            "Author",
            Object::String(company.name.as_bytes().to_vec(), StringFormat::Literal),
        );

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| SourceError::Unavailable(format!("Failed to save overlay: {}", e)))?;
        Ok(out)
    }
}
