//! Offer prices
//!
//! Rotated offer `i` costs `base * (1 + (base_modifier_pct + progression_pct * i) / 100)`.
//! With both percentages positive the baseline is the cheapest offer and
//! rotated offers are strictly increasing. Non-positive percentages are
//! accepted as given and only reported.

use offer_types::{PriceLine, PriceModifierConfig, PricingUnit};

use crate::error::OfferWarning;

pub fn effective_modifier_pct(offer_index: usize, config: &PriceModifierConfig) -> f64 {
    config.base_modifier_pct + config.progression_pct * offer_index as f64
}

/// Price of rotated offer `offer_index` (0-based)
pub fn modify_price(base_price: f64, offer_index: usize, config: &PriceModifierConfig) -> f64 {
    // Scaling by (100 + pct) first keeps whole-percent results exact
    base_price * (100.0 + effective_modifier_pct(offer_index, config)) / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceModificationEngine {
    config: PriceModifierConfig,
}

impl PriceModificationEngine {
    pub fn new(config: PriceModifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriceModifierConfig {
        &self.config
    }

    pub fn modify(&self, base_price: f64, offer_index: usize) -> f64 {
        modify_price(base_price, offer_index, &self.config)
    }

    /// One warning per modifier that breaks the cheapest-baseline ordering
    pub fn warnings(&self) -> Vec<OfferWarning> {
        self.config
            .non_positive_fields()
            .into_iter()
            .map(|field| OfferWarning::PriceConfiguration {
                field,
                value: match field {
                    "base_modifier_pct" => self.config.base_modifier_pct,
                    _ => self.config.progression_pct,
                },
            })
            .collect()
    }
}

/// Amount charged for one price line of a plant with `plant_kwp` peak power
pub fn line_total(line: &PriceLine, plant_kwp: f64) -> f64 {
    match line.unit {
        PricingUnit::PerPiece { quantity } => line.unit_price * quantity,
        PricingUnit::PerMeter { meters } => line.unit_price * meters,
        PricingUnit::LumpSum => line.unit_price,
        PricingUnit::PerKwp => line.unit_price * plant_kwp,
    }
}

/// Baseline offer price: the sum of all line totals, rounded to cents
pub fn baseline_price(lines: &[PriceLine], plant_kwp: f64) -> f64 {
    round_cents(lines.iter().map(|line| line_total(line, plant_kwp)).sum())
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn line(label: &str, unit_price: f64, unit: PricingUnit) -> PriceLine {
        PriceLine {
            label: label.to_string(),
            unit_price,
            unit,
        }
    }

    #[test]
    fn test_default_modifiers() {
        let engine = PriceModificationEngine::new(PriceModifierConfig::default());
        assert_eq!(engine.modify(20_000.0, 0), 23_000.0);
        assert_eq!(engine.modify(20_000.0, 1), 24_000.0);
        assert_eq!(engine.modify(20_000.0, 2), 25_000.0);
        assert!(engine.warnings().is_empty());
    }

    #[test]
    fn test_effective_modifier() {
        let config = PriceModifierConfig {
            base_modifier_pct: 10.0,
            progression_pct: 2.5,
        };
        assert_eq!(effective_modifier_pct(4, &config), 20.0);
    }

    #[test]
    fn test_zero_base_price() {
        assert_eq!(modify_price(0.0, 3, &PriceModifierConfig::default()), 0.0);
    }

    #[test]
    fn test_non_positive_config_is_applied_and_reported() {
        let engine = PriceModificationEngine::new(PriceModifierConfig {
            base_modifier_pct: -5.0,
            progression_pct: 0.0,
        });
        assert_eq!(engine.modify(1000.0, 2), 950.0);
        assert_eq!(
            engine.warnings(),
            vec![
                OfferWarning::PriceConfiguration {
                    field: "base_modifier_pct",
                    value: -5.0
                },
                OfferWarning::PriceConfiguration {
                    field: "progression_pct",
                    value: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_line_totals_per_unit() {
        let modules = line("Modules", 120.0, PricingUnit::PerPiece { quantity: 20.0 });
        assert_eq!(line_total(&modules, 8.0), 2400.0);
        let cable = line("Cable", 4.5, PricingUnit::PerMeter { meters: 30.0 });
        assert_eq!(line_total(&cable, 8.0), 135.0);
        assert_eq!(line_total(&line("Scaffold", 650.0, PricingUnit::LumpSum), 8.0), 650.0);
        assert_eq!(line_total(&line("Mounting", 100.0, PricingUnit::PerKwp), 8.0), 800.0);
    }

    #[test]
    fn test_baseline_price_sums_and_rounds() {
        let lines = vec![
            line("Modules", 119.999, PricingUnit::PerPiece { quantity: 3.0 }),
            line("Installation", 1500.0, PricingUnit::LumpSum),
        ];
        assert_eq!(baseline_price(&lines, 1.2), 1860.0);
        assert_eq!(baseline_price(&[], 10.0), 0.0);
    }

    proptest! {
        /// Property: prices strictly increase with the offer index
        #[test]
        fn prices_are_strictly_increasing(
            base in 1.0f64..1_000_000.0,
            base_pct in 0.1f64..50.0,
            progression in 0.1f64..20.0,
            i in 0usize..50,
            gap in 1usize..50,
        ) {
            let config = PriceModifierConfig {
                base_modifier_pct: base_pct,
                progression_pct: progression,
            };
            let j = i + gap;
            prop_assert!(modify_price(base, i, &config) < modify_price(base, j, &config));
            prop_assert!(modify_price(base, i, &config) > base);
        }
    }
}
