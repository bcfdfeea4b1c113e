use std::collections::BTreeSet;

use crate::domain::allergen::Allergen;

/// Surface forms mapped onto canonical allergen tags. Multi-word forms are
/// matched as consecutive tokens. A bare "nut" is ambiguous and records both
/// nut tags.
const SYNONYMS: &[(&str, Allergen)] = &[
    ("gluten", Allergen::Gluten),
    ("wheat", Allergen::Gluten),
    ("celiac", Allergen::Gluten),
    ("coeliac", Allergen::Gluten),
    ("peanut", Allergen::Peanuts),
    ("peanuts", Allergen::Peanuts),
    ("groundnut", Allergen::Peanuts),
    ("groundnuts", Allergen::Peanuts),
    ("nut", Allergen::TreeNuts),
    ("nut", Allergen::Peanuts),
    ("nuts", Allergen::TreeNuts),
    ("nuts", Allergen::Peanuts),
    ("tree nut", Allergen::TreeNuts),
    ("tree nuts", Allergen::TreeNuts),
    ("almond", Allergen::TreeNuts),
    ("almonds", Allergen::TreeNuts),
    ("walnut", Allergen::TreeNuts),
    ("walnuts", Allergen::TreeNuts),
    ("cashew", Allergen::TreeNuts),
    ("cashews", Allergen::TreeNuts),
    ("hazelnut", Allergen::TreeNuts),
    ("hazelnuts", Allergen::TreeNuts),
    ("pecan", Allergen::TreeNuts),
    ("pecans", Allergen::TreeNuts),
    ("dairy", Allergen::Dairy),
    ("milk", Allergen::Dairy),
    ("cheese", Allergen::Dairy),
    ("lactose", Allergen::Dairy),
    ("shellfish", Allergen::Shellfish),
    ("shrimp", Allergen::Shellfish),
    ("prawn", Allergen::Shellfish),
    ("prawns", Allergen::Shellfish),
    ("crab", Allergen::Shellfish),
    ("lobster", Allergen::Shellfish),
    ("fish", Allergen::Fish),
    ("egg", Allergen::Eggs),
    ("eggs", Allergen::Eggs),
    ("soy", Allergen::Soy),
    ("soya", Allergen::Soy),
    ("sesame", Allergen::Sesame),
];

/// Keyword extractor for stated allergies.
///
/// Any occurrence of a surface form yields its tag, whatever words surround it:
/// "no peanuts please" and "peanuts are fine" both record `peanuts`.
#[derive(Clone, Debug)]
pub struct ConstraintTracker {
    synonyms: Vec<(Vec<String>, Allergen)>,
}

impl Default for ConstraintTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintTracker {
    pub fn new() -> Self {
        let synonyms = SYNONYMS
            .iter()
            .map(|(surface, allergen)| (tokenize(surface), *allergen))
            .collect();
        Self { synonyms }
    }

    pub fn extract(&self, utterance: &str) -> BTreeSet<Allergen> {
        let tokens = tokenize(utterance);
        self.synonyms
            .iter()
            .filter(|(surface, _)| contains_sequence(&tokens, surface))
            .map(|(_, allergen)| *allergen)
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_sequence(tokens: &[String], sequence: &[String]) -> bool {
    !sequence.is_empty() && tokens.windows(sequence.len()).any(|window| window == sequence)
}
