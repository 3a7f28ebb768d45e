use std::collections::BTreeMap;

use crate::types::{Category, Product};

/// Fully resolved offer for one company. Immutable once assembly starts.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OfferConfiguration {
    pub company_id: String,
    pub selected_products: BTreeMap<Category, Product>,
    pub base_price: f64,
    pub final_price: f64,
}

impl OfferConfiguration {
    pub fn product(&self, category: Category) -> Option<&Product> {
        self.selected_products.get(&category)
    }

    /// Price difference against the baseline, in currency units
    pub fn markup(&self) -> f64 {
        self.final_price - self.base_price
    }
}

/// Percentage markups applied to rotated offers.
///
/// `modifier(i) = base_modifier_pct + progression_pct * i`. Keeping both
/// values positive guarantees the baseline offer stays the cheapest and the
/// rotated offers are strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceModifierConfig {
    #[serde(default = "default_base_modifier_pct")]
    pub base_modifier_pct: f64,
    #[serde(default = "default_progression_pct")]
    pub progression_pct: f64,
}

fn default_base_modifier_pct() -> f64 {
    15.0
}

fn default_progression_pct() -> f64 {
    5.0
}

impl Default for PriceModifierConfig {
    fn default() -> Self {
        Self {
            base_modifier_pct: default_base_modifier_pct(),
            progression_pct: default_progression_pct(),
        }
    }
}

impl PriceModifierConfig {
    /// Names of the fields that break the ordering guarantee when non-positive
    pub fn non_positive_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.base_modifier_pct <= 0.0 {
            fields.push("base_modifier_pct");
        }
        if self.progression_pct <= 0.0 {
            fields.push("progression_pct");
        }
        fields
    }
}

/// How a price line is charged. Each variant carries the quantity it needs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingUnit {
    PerPiece { quantity: f64 },
    PerMeter { meters: f64 },
    LumpSum,
    /// Scaled by the plant's peak power in kWp
    PerKwp,
}

/// One line of a price calculation (components, installation, accessories).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceLine {
    pub label: String,
    pub unit_price: f64,
    pub unit: PricingUnit,
}
