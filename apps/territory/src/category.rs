//! Normalization for the user-facing keys of a slot.
//!
//! Categories arrive as URL slugs (`hair-salon`, `hair_salon`) and as free
//! text (`Hair Salon`, `hair  salon`). Every comparison against the record
//! store uses the title-cased display form produced by [`normalize_category`].

/// Title-cases each word and joins words with a single space.
///
/// Hyphens, underscores and any whitespace are word separators. The result is
/// idempotent: normalizing an already-normalized category returns it unchanged.
pub fn normalize_category(raw: &str) -> String {
    raw.split(|ch: char| ch == '-' || ch == '_' || ch.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase hyphenated form used in generated links.
pub fn category_slug(raw: &str) -> String {
    normalize_category(raw).to_lowercase().replace(' ', "-")
}

/// Area keys are matched exactly; only surrounding whitespace is ignored.
pub fn normalize_area_key(raw: &str) -> String {
    raw.trim().to_string()
}

pub fn normalize_country(raw: Option<&str>, default_country: &str) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| default_country.to_string(), str::to_ascii_uppercase)
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
