//! Product rotation across competing offers
//!
//! Every rotated offer should name equivalent hardware from a brand no
//! earlier offer has used. Selection per category runs through four steps,
//! each a fallback for the previous one:
//!
//! 1. unused brand, capacity within tolerance, closest capacity
//! 2. unused brand, closest capacity
//! 3. any brand, unused model (within tolerance first), with a warning
//! 4. closest capacity, duplicates allowed, with a warning
//!
//! Ties are broken by catalog order. Rotation never fails: an empty catalog
//! category falls back to the baseline product itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use offer_types::{Category, Product};
use tracing::{debug, instrument, warn};

use crate::error::OfferWarning;
use crate::sources::ProductCatalog;

/// Slack for floating point capacity comparisons
const CAPACITY_EPSILON: f64 = 1e-9;

/// Brands and models already handed out during one multi-offer run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationState {
    used_brands: HashMap<Category, BTreeSet<String>>,
    used_models: HashMap<Category, BTreeSet<String>>,
    /// Number of offers rotated so far
    cursor: usize,
}

impl RotationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a run whose baseline offer already uses `baseline`
    pub fn seeded(baseline: &BTreeMap<Category, Product>) -> Self {
        let mut state = Self::new();
        for product in baseline.values() {
            state.record(product);
        }
        state
    }

    pub fn record(&mut self, product: &Product) {
        self.used_brands
            .entry(product.category)
            .or_default()
            .insert(product.brand.clone());
        self.used_models
            .entry(product.category)
            .or_default()
            .insert(product.model.clone());
    }

    pub fn is_brand_used(&self, category: Category, brand: &str) -> bool {
        self.used_brands
            .get(&category)
            .is_some_and(|brands| brands.contains(brand))
    }

    pub fn is_model_used(&self, category: Category, model: &str) -> bool {
        self.used_models
            .get(&category)
            .is_some_and(|models| models.contains(model))
    }

    pub fn used_brands(&self, category: Category) -> impl Iterator<Item = &str> {
        self.used_brands
            .get(&category)
            .into_iter()
            .flat_map(|brands| brands.iter().map(String::as_str))
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Which fallback step produced a pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStep {
    NewBrandInTolerance,
    NewBrandClosest,
    ReusedBrandNewModel,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPick {
    pub product: Product,
    pub step: SelectionStep,
    pub was_duplicate: bool,
    /// Brand shared with the affinity leader category
    pub affinity_matched: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RotationOutcome {
    pub picks: BTreeMap<Category, CategoryPick>,
    pub warnings: Vec<OfferWarning>,
}

impl RotationOutcome {
    pub fn products(&self) -> BTreeMap<Category, Product> {
        self.picks
            .iter()
            .map(|(category, pick)| (*category, pick.product.clone()))
            .collect()
    }

    pub fn was_duplicate(&self, category: Category) -> bool {
        self.picks.get(&category).is_some_and(|pick| pick.was_duplicate)
    }
}

pub struct ProductRotationEngine<'a, C: ProductCatalog + ?Sized> {
    catalog: &'a C,
    /// (leader, follower) pairs that prefer the same brand
    affinity: Vec<(Category, Category)>,
}

impl<'a, C: ProductCatalog + ?Sized> ProductRotationEngine<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self {
            catalog,
            affinity: Vec::new(),
        }
    }

    pub fn with_affinity(mut self, affinity: Vec<(Category, Category)>) -> Self {
        self.affinity = affinity;
        self
    }

    /// Pick one product per baseline category for offer `offer_index`,
    /// recording each pick in `state` before moving on to the next category
    #[instrument(skip(self, baseline, state), fields(categories = baseline.len()))]
    pub fn rotate(
        &self,
        baseline: &BTreeMap<Category, Product>,
        state: &mut RotationState,
        offer_index: usize,
        tolerance: f64,
    ) -> RotationOutcome {
        let mut outcome = RotationOutcome::default();

        for (&category, reference) in baseline {
            let preferred_brand = self.affinity_brand(category, baseline, &outcome.picks);
            let pick = self.select(category, reference, state, tolerance, preferred_brand);

            match pick.step {
                SelectionStep::ReusedBrandNewModel => {
                    warn!(
                        %category,
                        offer_index,
                        model = %pick.product.model,
                        "All brands used, reusing a brand"
                    );
                    outcome.warnings.push(OfferWarning::RotationExhausted {
                        category,
                        offer_index,
                        detail: format!(
                            "all brands used, reusing {} with model {}",
                            pick.product.brand, pick.product.model
                        ),
                    });
                }
                SelectionStep::Duplicate => {
                    warn!(
                        %category,
                        offer_index,
                        product = %pick.product.id,
                        "Rotation diversity exhausted"
                    );
                    outcome.warnings.push(OfferWarning::RotationExhausted {
                        category,
                        offer_index,
                        detail: format!(
                            "no unused model left, duplicating {}",
                            pick.product.display_name()
                        ),
                    });
                }
                _ => debug!(
                    %category,
                    offer_index,
                    brand = %pick.product.brand,
                    step = ?pick.step,
                    "Rotated product"
                ),
            }

            state.record(&pick.product);
            outcome.picks.insert(category, pick);
        }

        state.cursor += 1;
        outcome
    }

    /// Brand of the leader pick when `category` follows an affinity leader
    /// that is part of the same baseline and already resolved
    fn affinity_brand<'p>(
        &self,
        category: Category,
        baseline: &BTreeMap<Category, Product>,
        picks: &'p BTreeMap<Category, CategoryPick>,
    ) -> Option<&'p str> {
        self.affinity
            .iter()
            .filter(|(_, follower)| *follower == category)
            .filter(|(leader, _)| baseline.contains_key(leader))
            .find_map(|(leader, _)| picks.get(leader))
            .map(|pick| pick.product.brand.as_str())
    }

    fn select(
        &self,
        category: Category,
        reference: &Product,
        state: &RotationState,
        tolerance: f64,
        preferred_brand: Option<&str>,
    ) -> CategoryPick {
        let target = reference.capacity_value;
        let candidates = self.catalog.list_products(category, &[]);
        let allowed = tolerance.abs() * target.abs() + CAPACITY_EPSILON;
        let within = |p: &&Product| p.capacity_delta(target) <= allowed;
        let unused_brand = |p: &&Product| !state.is_brand_used(category, &p.brand);

        let pick = |product: &Product, step: SelectionStep, affinity_matched: bool| CategoryPick {
            product: product.clone(),
            step,
            was_duplicate: step == SelectionStep::Duplicate,
            affinity_matched,
        };

        if let Some(brand) = preferred_brand {
            let shared = closest(
                candidates
                    .iter()
                    .filter(|p| p.brand == brand)
                    .filter(unused_brand)
                    .filter(within),
                target,
            );
            if let Some(product) = shared {
                return pick(product, SelectionStep::NewBrandInTolerance, true);
            }
        }

        let fresh = candidates.iter().filter(unused_brand).filter(within);
        if let Some(product) = closest(fresh, target) {
            return pick(product, SelectionStep::NewBrandInTolerance, false);
        }

        if let Some(product) = closest(candidates.iter().filter(unused_brand), target) {
            return pick(product, SelectionStep::NewBrandClosest, false);
        }

        let unused_model = |p: &&Product| !state.is_model_used(category, &p.model);
        let fresh_model = closest(candidates.iter().filter(unused_model).filter(within), target)
            .or_else(|| closest(candidates.iter().filter(unused_model), target));
        if let Some(product) = fresh_model {
            return pick(product, SelectionStep::ReusedBrandNewModel, false);
        }

        match closest(candidates.iter(), target) {
            Some(product) => pick(product, SelectionStep::Duplicate, false),
            None => pick(reference, SelectionStep::Duplicate, false),
        }
    }
}

/// Smallest capacity delta; the first candidate wins ties
fn closest<'p>(
    candidates: impl Iterator<Item = &'p Product>,
    target: f64,
) -> Option<&'p Product> {
    candidates.fold(None, |best: Option<&Product>, product| match best {
        Some(current) if current.capacity_delta(target) <= product.capacity_delta(target) => {
            Some(current)
        }
        _ => Some(product),
    })
}
