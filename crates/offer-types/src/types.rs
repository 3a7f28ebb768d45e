use std::fmt;

/// Component category of a catalog product.
///
/// The declaration order is the order in which categories are resolved
/// during rotation, so paired categories (inverter, storage) are always
/// visited leader first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Module,
    Inverter,
    Storage,
    Wallbox,
    HeatPump,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Module,
        Category::Inverter,
        Category::Storage,
        Category::Wallbox,
        Category::HeatPump,
    ];

    /// Unit in which `Product::capacity_value` is expressed for this category
    pub fn capacity_unit(self) -> CapacityUnit {
        match self {
            Category::Module => CapacityUnit::PowerW,
            Category::Inverter | Category::Wallbox | Category::HeatPump => CapacityUnit::PowerKw,
            Category::Storage => CapacityUnit::CapacityKwh,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Module => "module",
            Category::Inverter => "inverter",
            Category::Storage => "storage",
            Category::Wallbox => "wallbox",
            Category::HeatPump => "heat_pump",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityUnit {
    PowerW,
    PowerKw,
    CapacityKwh,
}

impl CapacityUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            CapacityUnit::PowerW => "W",
            CapacityUnit::PowerKw => "kW",
            CapacityUnit::CapacityKwh => "kWh",
        }
    }
}

/// A catalog product. Owned by the external catalog, read-only here.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Product {
    pub id: String,
    pub category: Category,
    pub brand: String,
    pub model: String,
    pub capacity_value: f64, // Unit given by `category.capacity_unit()`
    pub unit_price: f64,
    #[serde(default)]
    pub datasheet_path: Option<String>, // Relative to the document store root
}

impl Product {
    pub fn capacity_unit(&self) -> CapacityUnit {
        self.category.capacity_unit()
    }

    /// Absolute distance between this product's capacity and `target`
    pub fn capacity_delta(&self, target: f64) -> f64 {
        (self.capacity_value - target).abs()
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }
}

/// A company an offer is issued for.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub logo_path: Option<String>,
}

/// A partner document listed for a company (terms, certificates, brochures).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompanyDocument {
    pub id: String,
    pub display_name: String,
    pub relative_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn category_order_puts_inverter_before_storage() {
        assert!(Category::Inverter < Category::Storage);
        assert!(Category::Module < Category::Inverter);
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::HeatPump).unwrap();
        assert_eq!(json, "\"heat_pump\"");
        let back: Category = serde_json::from_str("\"storage\"").unwrap();
        assert_eq!(back, Category::Storage);
    }

    #[test]
    fn product_without_datasheet_deserializes() {
        let json = r#"{"id":"m1","category":"module","brand":"Sun","model":"S-400",
            "capacity_value":400.0,"unit_price":120.0}"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.datasheet_path, None);
        assert_eq!(product.capacity_unit(), CapacityUnit::PowerW);
        assert_eq!(product.display_name(), "Sun S-400");
    }

    fn storage(capacity_value: f64) -> Product {
        Product {
            id: "s".to_string(),
            category: Category::Storage,
            brand: "Cell".to_string(),
            model: "C".to_string(),
            capacity_value,
            unit_price: 1.0,
            datasheet_path: None,
        }
    }

    proptest! {
        /// Property: capacity distance is non-negative and symmetric
        #[test]
        fn capacity_delta_is_a_distance(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let delta = storage(a).capacity_delta(b);
            prop_assert!(delta >= 0.0);
            prop_assert_eq!(delta, storage(b).capacity_delta(a));
            prop_assert_eq!(storage(a).capacity_delta(a), 0.0);
        }
    }
}
