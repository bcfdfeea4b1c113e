use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::allergen::Allergen;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub allergens: BTreeSet<Allergen>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "uncategorized".to_string()
}

impl MenuItem {
    pub fn new(
        name: impl Into<String>,
        price: Decimal,
        allergens: impl IntoIterator<Item = Allergen>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            price,
            allergens: allergens.into_iter().collect(),
            category: category.into(),
        }
    }

    pub fn contains(&self, allergen: Allergen) -> bool {
        self.allergens.contains(&allergen)
    }
}

/// Read-only dish table. Lookups are case-insensitive on the dish name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuCatalog {
    items: Vec<MenuItem>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct MenuFile {
    items: Vec<MenuItem>,
}

impl MenuCatalog {
    pub fn new(items: Vec<MenuItem>) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::InvalidMenu("menu must contain at least one item".to_string()));
        }

        let mut index = HashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let key = normalize_name(&item.name);
            if key.is_empty() {
                return Err(DomainError::InvalidMenu(format!(
                    "menu item at position {position} has an empty name"
                )));
            }
            if item.price < Decimal::ZERO {
                return Err(DomainError::InvalidMenu(format!(
                    "menu item `{}` has a negative price",
                    item.name
                )));
            }
            if index.insert(key, position).is_some() {
                return Err(DomainError::InvalidMenu(format!(
                    "duplicate menu item name `{}`",
                    item.name
                )));
            }
        }

        Ok(Self { items, index })
    }

    /// Parses a TOML document made of `[[items]]` tables.
    pub fn from_toml_str(raw: &str) -> Result<Self, DomainError> {
        let file = toml::from_str::<MenuFile>(raw)
            .map_err(|error| DomainError::InvalidMenu(error.to_string()))?;
        Self::new(file.items)
    }

    pub fn lookup(&self, name: &str) -> Option<&MenuItem> {
        self.index.get(&normalize_name(name)).map(|position| &self.items[*position])
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
