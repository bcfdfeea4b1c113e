use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Closed allergen vocabulary shared by menu items and session constraints.
///
/// Both sides of the allergen check are typed with this enum, so a tag recorded
/// from user input is always directly comparable with a tag on a menu item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allergen {
    Gluten,
    Peanuts,
    #[serde(alias = "nuts")]
    TreeNuts,
    Dairy,
    Shellfish,
    Fish,
    Eggs,
    Soy,
    Sesame,
}

impl Allergen {
    pub const ALL: [Allergen; 9] = [
        Allergen::Gluten,
        Allergen::Peanuts,
        Allergen::TreeNuts,
        Allergen::Dairy,
        Allergen::Shellfish,
        Allergen::Fish,
        Allergen::Eggs,
        Allergen::Soy,
        Allergen::Sesame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Allergen::Gluten => "gluten",
            Allergen::Peanuts => "peanuts",
            Allergen::TreeNuts => "tree_nuts",
            Allergen::Dairy => "dairy",
            Allergen::Shellfish => "shellfish",
            Allergen::Fish => "fish",
            Allergen::Eggs => "eggs",
            Allergen::Soy => "soy",
            Allergen::Sesame => "sesame",
        }
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Allergen {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "gluten" => Ok(Self::Gluten),
            "peanuts" | "peanut" => Ok(Self::Peanuts),
            "tree_nuts" | "tree_nut" | "nuts" => Ok(Self::TreeNuts),
            "dairy" => Ok(Self::Dairy),
            "shellfish" => Ok(Self::Shellfish),
            "fish" => Ok(Self::Fish),
            "eggs" | "egg" => Ok(Self::Eggs),
            "soy" => Ok(Self::Soy),
            "sesame" => Ok(Self::Sesame),
            _ => Err(DomainError::UnknownAllergen(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Allergen;

    #[test]
    fn parses_canonical_and_legacy_tags() {
        assert_eq!("peanuts".parse::<Allergen>().ok(), Some(Allergen::Peanuts));
        assert_eq!("Tree Nuts".parse::<Allergen>().ok(), Some(Allergen::TreeNuts));
        assert_eq!("nuts".parse::<Allergen>().ok(), Some(Allergen::TreeNuts));
        assert!("celery".parse::<Allergen>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let encoded = serde_json::to_string(&Allergen::TreeNuts).expect("serialize");
        assert_eq!(encoded, "\"tree_nuts\"");

        let legacy: Allergen = serde_json::from_str("\"nuts\"").expect("deserialize alias");
        assert_eq!(legacy, Allergen::TreeNuts);
    }

    #[test]
    fn display_matches_serde_tag() {
        for allergen in Allergen::ALL {
            let encoded = serde_json::to_string(&allergen).expect("serialize");
            assert_eq!(encoded.trim_matches('"'), allergen.to_string());
        }
    }
}
