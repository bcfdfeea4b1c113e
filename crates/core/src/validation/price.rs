use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::menu::{MenuCatalog, MenuItem};
use crate::validation::dishes::{detect_dishes, DishMention};

pub const DEFAULT_MAX_PAIR_DISTANCE: usize = 50;

// A currency symbol, or a decimal fraction, is required: a bare "6" is more
// often a count ("6 pieces") than a price. The whole number is consumed so an
// over-long fraction ("$2.490") is dropped rather than cut short.
const PRICE_TOKEN_PATTERN: &str =
    r"(?:(?P<symbol>[$€£])\s?(?P<amount>\d+(?:\.\d+)?)|\b(?P<bare>\d+\.\d+))\b";

const MAX_FRACTION_DIGITS: usize = 2;

fn price_token_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(PRICE_TOKEN_PATTERN).expect("price token pattern compiles"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceVerdict {
    Correct,
    Correctable,
    Unverifiable,
}

/// A currency figure found in generated text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceToken {
    pub start: usize,
    pub end: usize,
    /// Offset where the digits begin (after any currency symbol).
    pub amount_start: usize,
    pub value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFinding {
    pub dish: Option<MenuItem>,
    pub stated_price: Decimal,
    pub actual_price: Option<Decimal>,
    pub verdict: PriceVerdict,
    pub start: usize,
    pub end: usize,
}

/// A price token whose nearest dish name overlaps another dish name, so the
/// figure cannot be attributed safely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousPrice {
    pub stated_price: Decimal,
    pub candidates: Vec<String>,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReport {
    pub findings: Vec<PriceFinding>,
    pub ambiguities: Vec<AmbiguousPrice>,
    pub corrected_text: String,
}

impl PriceReport {
    pub fn corrections(&self) -> impl Iterator<Item = &PriceFinding> {
        self.findings.iter().filter(|finding| finding.verdict == PriceVerdict::Correctable)
    }

    pub fn has_corrections(&self) -> bool {
        self.corrections().next().is_some()
    }

    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguities.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Pairing<'m, 'a> {
    Dish(&'m DishMention<'a>),
    Ambiguous(Vec<&'m DishMention<'a>>),
    Unpaired,
}

/// Attributes `tokens[index]` to a dish.
///
/// Candidates are dish mentions that end before the token, no further than
/// `max_distance` bytes away, with no other price token in between. The nearest
/// candidate wins even when a farther one was the intended dish. A contested
/// nearest candidate makes the pairing ambiguous.
pub fn pair_price_token<'m, 'a>(
    mentions: &'m [DishMention<'a>],
    tokens: &[PriceToken],
    index: usize,
    max_distance: usize,
) -> Pairing<'m, 'a> {
    let Some(token) = tokens.get(index) else {
        return Pairing::Unpaired;
    };

    let nearest = mentions
        .iter()
        .filter(|mention| mention.end <= token.start)
        .filter(|mention| token.start - mention.end <= max_distance)
        .filter(|mention| {
            !tokens.iter().any(|other| other.start >= mention.end && other.end <= token.start)
        })
        .max_by_key(|mention| mention.end);

    match nearest {
        None => Pairing::Unpaired,
        Some(mention) if mention.contested => {
            let rivals = mentions
                .iter()
                .filter(|other| other.start < mention.end && mention.start < other.end)
                .collect();
            Pairing::Ambiguous(rivals)
        }
        Some(mention) => Pairing::Dish(mention),
    }
}

pub fn find_price_tokens(text: &str) -> Vec<PriceToken> {
    price_token_regex()
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let amount = captures.name("amount").or_else(|| captures.name("bare"))?;
            let fraction_digits =
                amount.as_str().split_once('.').map_or(0, |(_, fraction)| fraction.len());
            if fraction_digits > MAX_FRACTION_DIGITS {
                return None;
            }
            let value = amount.as_str().parse::<Decimal>().ok()?;
            Some(PriceToken {
                start: whole.start(),
                end: whole.end(),
                amount_start: amount.start(),
                value,
            })
        })
        .collect()
}

pub fn format_price(price: Decimal) -> String {
    let mut rounded = price.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

/// Checks every stated price against the catalog and rewrites wrong ones.
#[derive(Clone, Debug)]
pub struct PriceValidator {
    max_pair_distance: usize,
}

impl Default for PriceValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAIR_DISTANCE)
    }
}

impl PriceValidator {
    pub fn new(max_pair_distance: usize) -> Self {
        Self { max_pair_distance }
    }

    pub fn max_pair_distance(&self) -> usize {
        self.max_pair_distance
    }

    pub fn validate(&self, generated_text: &str, menu: &MenuCatalog) -> PriceReport {
        let mentions = detect_dishes(generated_text, menu);
        let tokens = find_price_tokens(generated_text);

        let mut findings = Vec::with_capacity(tokens.len());
        let mut ambiguities = Vec::new();
        let mut replacements: Vec<(usize, usize, String)> = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            match pair_price_token(&mentions, &tokens, index, self.max_pair_distance) {
                Pairing::Unpaired => findings.push(PriceFinding {
                    dish: None,
                    stated_price: token.value,
                    actual_price: None,
                    verdict: PriceVerdict::Unverifiable,
                    start: token.start,
                    end: token.end,
                }),
                Pairing::Ambiguous(rivals) => ambiguities.push(AmbiguousPrice {
                    stated_price: token.value,
                    candidates: rivals.iter().map(|mention| mention.item.name.clone()).collect(),
                    start: token.start,
                    end: token.end,
                }),
                Pairing::Dish(mention) => {
                    let actual = mention.item.price;
                    let verdict = if token.value == actual {
                        PriceVerdict::Correct
                    } else {
                        replacements.push((token.amount_start, token.end, format_price(actual)));
                        PriceVerdict::Correctable
                    };
                    findings.push(PriceFinding {
                        dish: Some(mention.item.clone()),
                        stated_price: token.value,
                        actual_price: Some(actual),
                        verdict,
                        start: token.start,
                        end: token.end,
                    });
                }
            }
        }

        let corrected_text = if ambiguities.is_empty() {
            apply_replacements(generated_text, &replacements)
        } else {
            generated_text.to_string()
        };

        PriceReport { findings, ambiguities, corrected_text }
    }
}

fn apply_replacements(text: &str, replacements: &[(usize, usize, String)]) -> String {
    let mut corrected = text.to_string();
    for (start, end, replacement) in replacements.iter().rev() {
        corrected.replace_range(*start..*end, replacement);
    }
    corrected
}
