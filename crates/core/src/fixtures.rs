//! The sample dinner menu used by the CLI when no catalog file is configured,
//! and by tests.

use rust_decimal::Decimal;

use crate::domain::allergen::Allergen::{self, Dairy, Eggs, Gluten, Peanuts, Shellfish, Soy};
use crate::domain::menu::{MenuCatalog, MenuItem};

const SAMPLE_ITEMS: &[(&str, i64, &[Allergen], &str)] = &[
    ("Spring Rolls", 699, &[Gluten, Soy], "appetizers"),
    ("Chicken Wings", 899, &[], "appetizers"),
    ("Garlic Bread", 499, &[Gluten, Dairy], "appetizers"),
    ("Margherita Pizza", 1299, &[Gluten, Dairy], "mains"),
    ("Grilled Chicken Breast", 1599, &[], "mains"),
    ("Pad Thai", 1399, &[Peanuts, Shellfish, Gluten], "mains"),
    ("Vegetable Curry", 1199, &[Dairy], "mains"),
    ("Beef Burger", 1499, &[Gluten, Dairy], "mains"),
    ("Spaghetti Carbonara", 1349, &[Gluten, Dairy, Eggs], "mains"),
    ("Chocolate Cake", 699, &[Gluten, Dairy, Eggs], "desserts"),
    ("Ice Cream", 499, &[Dairy], "desserts"),
    ("Fruit Salad", 599, &[], "desserts"),
    ("Coca-Cola", 299, &[], "drinks"),
    ("Orange Juice", 399, &[], "drinks"),
    ("Coffee", 249, &[], "drinks"),
    ("Green Tea", 249, &[], "drinks"),
];

pub fn sample_menu_items() -> Vec<MenuItem> {
    SAMPLE_ITEMS
        .iter()
        .map(|(name, cents, allergens, category)| {
            MenuItem::new(*name, Decimal::new(*cents, 2), allergens.iter().copied(), *category)
        })
        .collect()
}

pub fn sample_menu() -> MenuCatalog {
    MenuCatalog::new(sample_menu_items()).expect("sample menu is valid")
}
