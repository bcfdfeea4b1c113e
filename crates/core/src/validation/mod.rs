pub mod allergen;
pub mod constraints;
pub mod dishes;
pub mod price;
