//! Configuration for the offer pipeline
//!
//! Settings are read from TOML. Every field has a default, so an empty file
//! (or no file at all) yields a working configuration.

use anyhow::Context;
use offer_pdf::{PageGeometry, PT_PER_CM};
use offer_types::{Category, PriceModifierConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level settings loaded from TOML files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferSettings {
    #[serde(default)]
    pub rotation: RotationSettings,
    #[serde(default)]
    pub pricing: PriceModifierConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub financing: PaymentTerms,
    #[serde(default)]
    pub assembly: AssemblySettings,
}

impl OfferSettings {
    /// Load settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    ///
    /// # Example
    ///
    /// ```no_run
    /// use offer_engine::settings::OfferSettings;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let settings = OfferSettings::from_file("offers.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from a TOML string
    ///
    /// # Example
    ///
    /// ```
    /// use offer_engine::settings::OfferSettings;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let settings = OfferSettings::from_toml_str(r#"
    ///     [pricing]
    ///     base_modifier_pct = 12.0
    /// "#)?;
    /// assert_eq!(settings.pricing.base_modifier_pct, 12.0);
    /// assert_eq!(settings.pricing.progression_pct, 5.0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML settings")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSettings {
    /// Relative capacity tolerance for substitutes (0.10 = ±10 %)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// (leader, follower) category pairs that prefer a shared brand
    #[serde(default = "default_affinity")]
    pub affinity: Vec<(Category, Category)>,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            affinity: default_affinity(),
        }
    }
}

fn default_tolerance() -> f64 {
    0.10
}

fn default_affinity() -> Vec<(Category, Category)> {
    vec![(Category::Inverter, Category::Storage)]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_chart_cache_max_size")]
    pub chart_cache_max_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            chart_cache_max_size: default_chart_cache_max_size(),
        }
    }
}

fn default_chart_cache_max_size() -> usize {
    100
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSettings {
    #[serde(default)]
    pub page: PageSize,
    #[serde(default = "default_top_margin_cm")]
    pub top_margin_cm: f64,
    #[serde(default = "default_min_bottom_margin_cm")]
    pub min_bottom_margin_cm: f64,
    #[serde(default = "default_side_margin_cm")]
    pub side_margin_cm: f64,
    /// Fixed spacing between blocks of a protected group
    #[serde(default = "default_block_spacing_pt")]
    pub block_spacing_pt: f64,
    #[serde(default = "default_body_font_size")]
    pub body_font_size: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            page: PageSize::default(),
            top_margin_cm: default_top_margin_cm(),
            min_bottom_margin_cm: default_min_bottom_margin_cm(),
            side_margin_cm: default_side_margin_cm(),
            block_spacing_pt: default_block_spacing_pt(),
            body_font_size: default_body_font_size(),
        }
    }
}

impl LayoutSettings {
    pub fn geometry(&self) -> PageGeometry {
        let base = match self.page {
            PageSize::A4 => PageGeometry::a4(),
            PageSize::Letter => PageGeometry::letter(),
        };
        PageGeometry {
            top_margin: self.top_margin_cm * PT_PER_CM,
            bottom_margin: self.min_bottom_margin_cm * PT_PER_CM,
            side_margin: self.side_margin_cm * PT_PER_CM,
            ..base
        }
    }
}

fn default_top_margin_cm() -> f64 {
    2.0
}

fn default_min_bottom_margin_cm() -> f64 {
    3.0
}

fn default_side_margin_cm() -> f64 {
    2.0
}

fn default_block_spacing_pt() -> f64 {
    6.0
}

fn default_body_font_size() -> f64 {
    10.0
}

/// Financing defaults (`payment_terms`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentTerms {
    #[serde(default = "default_annual_rate_pct")]
    pub annual_rate_pct: f64,
    #[serde(default = "default_term_months")]
    pub term_months: i64,
    #[serde(default)]
    pub processing_fee_pct: f64,
}

impl Default for PaymentTerms {
    fn default() -> Self {
        Self {
            annual_rate_pct: default_annual_rate_pct(),
            term_months: default_term_months(),
            processing_fee_pct: 0.0,
        }
    }
}

impl PaymentTerms {
    /// Read terms by name from a loosely typed settings map, as stored by the
    /// admin UI. Recognized keys: `interest_rate`, `term_months`,
    /// `term_years`, `processing_fee`. Absent or non-numeric values keep
    /// their defaults.
    pub fn from_settings_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let number = |key: &str| map.get(key).and_then(serde_json::Value::as_f64);
        let mut terms = Self::default();
        if let Some(rate) = number("interest_rate") {
            terms.annual_rate_pct = rate;
        }
        if let Some(years) = number("term_years") {
            terms.term_months = (years * 12.0).round() as i64;
        }
        if let Some(months) = number("term_months") {
            terms.term_months = months.round() as i64;
        }
        if let Some(fee) = number("processing_fee") {
            terms.processing_fee_pct = fee;
        }
        terms
    }
}

fn default_annual_rate_pct() -> f64 {
    4.0
}

fn default_term_months() -> i64 {
    240
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblySettings {
    /// Assemble company documents on a thread pool once rotation is resolved
    #[serde(default)]
    pub parallel: bool,
}
