use std::cmp::Reverse;

use crate::domain::menu::{MenuCatalog, MenuItem};

/// One occurrence of a menu dish name inside generated text.
///
/// `start`/`end` are byte offsets into the original text, mapped back from the
/// case-folded copy the search runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DishMention<'a> {
    pub item: &'a MenuItem,
    pub start: usize,
    pub end: usize,
    /// Another kept mention partially overlaps this one ("Green Tea" / "Tea Cake"
    /// inside "Green Tea Cake"), so the text does not say which dish was meant.
    pub contested: bool,
}

impl DishMention<'_> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &DishMention<'_>) -> bool {
        self.start < other.end && other.start < self.end
    }

    fn contains(&self, other: &DishMention<'_>) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Finds every menu dish named in `text`, in text order.
///
/// Case-insensitive substring search. When one name lies inside a longer one at
/// the same place ("Burger" inside "Spicy Beef Burger"), only the longest is kept.
pub fn detect_dishes<'a>(text: &str, menu: &'a MenuCatalog) -> Vec<DishMention<'a>> {
    let haystack = FoldedText::new(text);
    let mut candidates = Vec::new();

    for item in menu.items() {
        let needle: String = item.name.trim().chars().flat_map(char::to_lowercase).collect();
        if needle.is_empty() {
            continue;
        }
        for (start, matched) in haystack.folded.match_indices(needle.as_str()) {
            let (start, end) = haystack.original_range(start, start + matched.len());
            candidates.push(DishMention { item, start, end, contested: false });
        }
    }

    candidates.sort_by_key(|mention| (mention.start, Reverse(mention.len())));

    let mut kept: Vec<DishMention<'a>> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().any(|existing| existing.contains(&candidate)) {
            continue;
        }
        kept.push(candidate);
    }

    for index in 0..kept.len() {
        let contested = kept
            .iter()
            .enumerate()
            .any(|(other, mention)| other != index && mention.overlaps(&kept[index]));
        kept[index].contested = contested;
    }

    kept
}

/// Unicode-lowercased copy of a text with, for every folded byte, the byte
/// range of the source character it came from. Lowercasing can change a
/// character's encoded length ("İ" folds to two characters), so offsets on the
/// folded copy are not offsets on the original.
struct FoldedText {
    folded: String,
    sources: Vec<(usize, usize)>,
}

impl FoldedText {
    fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut sources = Vec::with_capacity(text.len());
        for (offset, character) in text.char_indices() {
            let source = (offset, offset + character.len_utf8());
            for lowered in character.to_lowercase() {
                folded.push(lowered);
                sources.extend(std::iter::repeat(source).take(lowered.len_utf8()));
            }
        }
        Self { folded, sources }
    }

    /// Maps a non-empty folded range onto whole source characters.
    fn original_range(&self, start: usize, end: usize) -> (usize, usize) {
        (self.sources[start].0, self.sources[end - 1].1)
    }
}

/// Distinct dishes among `mentions`, first mention order.
pub fn distinct_items<'a>(mentions: &[DishMention<'a>]) -> Vec<&'a MenuItem> {
    let mut items: Vec<&'a MenuItem> = Vec::new();
    for mention in mentions {
        if !items.iter().any(|item| item.name == mention.item.name) {
            items.push(mention.item);
        }
    }
    items
}

/// Byte range of the sentence surrounding `start..end`.
///
/// A full stop only ends a sentence when followed by whitespace or the end of
/// text, so decimal prices such as `$13.99` do not split a sentence.
pub fn sentence_around(text: &str, start: usize, end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let is_boundary = |index: usize| -> bool {
        match bytes[index] {
            b'!' | b'?' | b'\n' => true,
            b'.' => bytes.get(index + 1).map_or(true, |next| next.is_ascii_whitespace()),
            _ => false,
        }
    };

    let sentence_start = (0..start.min(bytes.len()))
        .rev()
        .find(|index| is_boundary(*index))
        .map_or(0, |index| index + 1);
    let sentence_end = (end.min(bytes.len())..bytes.len())
        .find(|index| is_boundary(*index))
        .map_or(bytes.len(), |index| index + 1);

    (sentence_start, sentence_end)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{detect_dishes, distinct_items, sentence_around};
    use crate::domain::menu::{MenuCatalog, MenuItem};

    fn menu(names: &[&str]) -> MenuCatalog {
        let items = names
            .iter()
            .map(|name| MenuItem::new(*name, Decimal::new(999, 2), [], "mains"))
            .collect();
        MenuCatalog::new(items).expect("valid test menu")
    }

    #[test]
    fn longest_name_wins_over_contained_names() {
        let menu = menu(&["Burger", "Beef Burger", "Spicy Beef Burger"]);
        let mentions = detect_dishes("Try the spicy beef burger today", &menu);

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].item.name, "Spicy Beef Burger");
        assert_eq!((mentions[0].start, mentions[0].end), (8, 25));
        assert!(!mentions[0].contested);
    }

    #[test]
    fn separate_occurrences_are_all_reported_in_text_order() {
        let menu = menu(&["Burger", "Beef Burger"]);
        let mentions = detect_dishes("A Burger or a Beef Burger?", &menu);

        let names: Vec<&str> = mentions.iter().map(|m| m.item.name.as_str()).collect();
        assert_eq!(names, vec!["Burger", "Beef Burger"]);
    }

    #[test]
    fn partial_overlaps_are_kept_and_marked_contested() {
        let menu = menu(&["Green Tea", "Tea Cake"]);
        let mentions = detect_dishes("The Green Tea Cake is lovely", &menu);

        assert_eq!(mentions.len(), 2);
        assert!(mentions.iter().all(|mention| mention.contested));
    }

    #[test]
    fn non_ascii_names_match_in_any_case_with_original_offsets() {
        let menu = menu(&["Crème Brûlée"]);
        let text = "Finish with the CRÈME BRÛLÉE tonight";
        let mentions = detect_dishes(text, &menu);

        assert_eq!(mentions.len(), 1);
        assert_eq!(&text[mentions[0].start..mentions[0].end], "CRÈME BRÛLÉE");
    }

    #[test]
    fn offsets_survive_characters_whose_lowercase_is_longer() {
        let menu = menu(&["Pad Thai"]);
        let text = "İİ the PAD THAI";
        let mentions = detect_dishes(text, &menu);

        assert_eq!(mentions.len(), 1);
        assert_eq!(&text[mentions[0].start..mentions[0].end], "PAD THAI");
    }

    #[test]
    fn distinct_items_deduplicates_repeated_mentions() {
        let menu = menu(&["Coffee", "Green Tea"]);
        let mentions = detect_dishes("Coffee, green tea, and more coffee", &menu);

        assert_eq!(mentions.len(), 3);
        let items = distinct_items(&mentions);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Coffee");
    }

    #[test]
    fn sentence_bounds_ignore_decimal_points() {
        let text = "Coffee is $2.49. The Pad Thai is peanut-free! Enjoy.";
        let start = text.find("Pad Thai").expect("dish present");
        let (from, to) = sentence_around(text, start, start + "Pad Thai".len());

        assert_eq!(&text[from..to], " The Pad Thai is peanut-free!");

        let coffee = sentence_around(text, 0, 6);
        assert_eq!(&text[coffee.0..coffee.1], "Coffee is $2.49.");
    }
}
