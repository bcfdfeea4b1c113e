use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::allergen::Allergen;
use crate::domain::menu::MenuCatalog;
use crate::domain::session::Session;
use crate::validation::constraints::ConstraintTracker;
use crate::validation::dishes::{detect_dishes, distinct_items, sentence_around};

const SAFETY_CLAIM_PATTERN: &str =
    r"(?i)\b(?P<free>[a-z]+)[\s-]*free\b|\b(?:contains\s+no|no|without)\s+(?P<absent>[a-z]+)\b";

fn safety_claim_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(SAFETY_CLAIM_PATTERN).expect("safety claim pattern compiles"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A mentioned dish contains something the guest said they cannot eat.
    UnsafeRecommendation,
    /// A dish is described as free of an allergen it actually contains.
    AllergenMisinformation,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsafeRecommendation => "unsafe_recommendation",
            Self::AllergenMisinformation => "allergen_misinformation",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllergenViolation {
    pub kind: ViolationKind,
    pub dish: String,
    pub allergens: BTreeSet<Allergen>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "violations", rename_all = "snake_case")]
pub enum AllergenVerdict {
    Safe,
    Unsafe(Vec<AllergenViolation>),
}

impl AllergenVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    pub fn violations(&self) -> &[AllergenViolation] {
        match self {
            Self::Safe => &[],
            Self::Unsafe(violations) => violations,
        }
    }
}

/// Blocks replies that put a guest's declared allergens in front of them.
///
/// Every mention counts, including "avoid the Pad Thai, it has peanuts". Telling
/// a warning from a recommendation is left to humans.
#[derive(Clone, Debug, Default)]
pub struct AllergenValidator {
    tracker: ConstraintTracker,
}

impl AllergenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(
        &self,
        generated_text: &str,
        session: &Session,
        menu: &MenuCatalog,
    ) -> AllergenVerdict {
        self.validate_constraints(generated_text, &session.constraints, menu)
    }

    pub fn validate_constraints(
        &self,
        generated_text: &str,
        constraints: &BTreeSet<Allergen>,
        menu: &MenuCatalog,
    ) -> AllergenVerdict {
        let mentions = detect_dishes(generated_text, menu);
        let mut violations = Vec::new();

        for item in distinct_items(&mentions) {
            let unsafe_tags: BTreeSet<Allergen> =
                item.allergens.intersection(constraints).copied().collect();
            if !unsafe_tags.is_empty() {
                violations.push(AllergenViolation {
                    kind: ViolationKind::UnsafeRecommendation,
                    dish: item.name.clone(),
                    allergens: unsafe_tags,
                });
            }

            let claimed: BTreeSet<Allergen> = mentions
                .iter()
                .filter(|mention| mention.item.name == item.name)
                .flat_map(|mention| {
                    let (from, to) = sentence_around(generated_text, mention.start, mention.end);
                    self.claimed_absent(&generated_text[from..to])
                })
                .collect();
            let contradicted: BTreeSet<Allergen> =
                item.allergens.intersection(&claimed).copied().collect();
            if !contradicted.is_empty() {
                violations.push(AllergenViolation {
                    kind: ViolationKind::AllergenMisinformation,
                    dish: item.name.clone(),
                    allergens: contradicted,
                });
            }
        }

        if violations.is_empty() {
            AllergenVerdict::Safe
        } else {
            AllergenVerdict::Unsafe(violations)
        }
    }

    /// Allergens a sentence claims are absent ("gluten-free", "no dairy").
    fn claimed_absent(&self, sentence: &str) -> BTreeSet<Allergen> {
        let mut claimed = BTreeSet::new();
        for captures in safety_claim_regex().captures_iter(sentence) {
            let Some(word) = captures.name("free").or_else(|| captures.name("absent")) else {
                continue;
            };
            let word = word.as_str().to_ascii_lowercase();
            if word == "nut" || word == "nuts" {
                claimed.insert(Allergen::Peanuts);
            }
            claimed.extend(self.tracker.extract(&word));
        }
        claimed
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::{AllergenValidator, AllergenVerdict, ViolationKind};
    use crate::domain::allergen::Allergen;
    use crate::domain::menu::{MenuCatalog, MenuItem};
    use crate::domain::session::{Session, SessionId};
    use crate::fixtures::sample_menu;

    fn session_with(tags: &[Allergen]) -> Session {
        let mut session = Session::new(SessionId::new("guest-1"));
        session.merge_constraints(tags.iter().copied());
        session
    }

    #[test]
    fn peanut_dish_is_unsafe_for_peanut_allergy() {
        let menu = sample_menu();
        let session = session_with(&[Allergen::Peanuts]);

        let verdict = AllergenValidator::new().validate(
            "I recommend the Pad Thai, it's delicious!",
            &session,
            &menu,
        );

        let violations = verdict.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::UnsafeRecommendation);
        assert_eq!(violations[0].dish, "Pad Thai");
        assert_eq!(violations[0].allergens, BTreeSet::from([Allergen::Peanuts]));
    }

    #[test]
    fn safe_dishes_pass() {
        let menu = sample_menu();
        let session = session_with(&[Allergen::Peanuts]);

        let verdict = AllergenValidator::new().validate(
            "The Grilled Chicken Breast and a Fruit Salad would be great.",
            &session,
            &menu,
        );
        assert_eq!(verdict, AllergenVerdict::Safe);
    }

    #[test]
    fn upper_case_non_ascii_dish_names_are_still_checked() {
        let menu = MenuCatalog::new(vec![MenuItem::new(
            "Crème Brûlée",
            Decimal::new(799, 2),
            [Allergen::Dairy, Allergen::Eggs],
            "desserts",
        )])
        .expect("valid menu");
        let session = session_with(&[Allergen::Dairy]);

        let verdict =
            AllergenValidator::new().validate("Our CRÈME BRÛLÉE is a must!", &session, &menu);

        let violations = verdict.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].dish, "Crème Brûlée");
    }

    #[test]
    fn warnings_still_block() {
        let menu = sample_menu();
        let session = session_with(&[Allergen::Dairy]);

        let verdict = AllergenValidator::new().validate(
            "Please avoid the Ice Cream since it contains dairy.",
            &session,
            &menu,
        );
        assert!(!verdict.is_safe());
    }

    #[test]
    fn every_violating_dish_is_listed_in_text_order() {
        let menu = sample_menu();
        let session = session_with(&[Allergen::Gluten, Allergen::Eggs]);

        let verdict = AllergenValidator::new().validate(
            "Try the Garlic Bread, then the Chocolate Cake.",
            &session,
            &menu,
        );

        let dishes: Vec<&str> = verdict.violations().iter().map(|v| v.dish.as_str()).collect();
        assert_eq!(dishes, vec!["Garlic Bread", "Chocolate Cake"]);
        assert_eq!(
            verdict.violations()[1].allergens,
            BTreeSet::from([Allergen::Gluten, Allergen::Eggs])
        );
    }

    #[test]
    fn no_constraints_and_no_claims_is_safe() {
        let menu = sample_menu();
        let session = session_with(&[]);
        let verdict =
            AllergenValidator::new().validate("The Pad Thai is $13.99.", &session, &menu);
        assert!(verdict.is_safe());
    }

    #[test]
    fn false_free_claim_is_misinformation_without_constraints() {
        let menu = sample_menu();
        let session = session_with(&[]);

        let verdict = AllergenValidator::new().validate(
            "Our Pad Thai is completely peanut-free.",
            &session,
            &menu,
        );

        let violations = verdict.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::AllergenMisinformation);
        assert_eq!(violations[0].allergens, BTreeSet::from([Allergen::Peanuts]));
    }

    #[test]
    fn claim_phrasings_map_onto_tags() {
        let menu = sample_menu();
        let session = session_with(&[]);
        let validator = AllergenValidator::new();

        let verdict = validator.validate("The Vegetable Curry is lactose free.", &session, &menu);
        assert_eq!(verdict.violations()[0].allergens, BTreeSet::from([Allergen::Dairy]));

        let verdict =
            validator.validate("Margherita Pizza is made without gluten.", &session, &menu);
        assert_eq!(verdict.violations()[0].allergens, BTreeSet::from([Allergen::Gluten]));

        let verdict = validator.validate("Pad Thai contains no nuts.", &session, &menu);
        assert_eq!(verdict.violations()[0].allergens, BTreeSet::from([Allergen::Peanuts]));
    }

    #[test]
    fn true_free_claims_and_other_sentences_are_fine() {
        let menu = sample_menu();
        let session = session_with(&[]);
        let validator = AllergenValidator::new();

        assert!(validator.validate("The Fruit Salad is gluten-free.", &session, &menu).is_safe());
        let text = "Pad Thai is popular. Our kitchen also offers gluten-free bread.";
        assert!(validator.validate(text, &session, &menu).is_safe());
    }
}
