pub mod allergen;
pub mod menu;
pub mod session;
pub mod topic;
