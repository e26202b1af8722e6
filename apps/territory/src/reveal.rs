use serde::Serialize;

/// Marker separating trust bullets from the served-area list in reveal copy.
pub const AREA_LIST_MARKER: &str = "CITIES:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevealCopy {
    pub bullets: Vec<String>,
    pub area_list: String,
}

impl RevealCopy {
    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty() && self.area_list.is_empty()
    }
}

/// Splits free-text reveal copy at the first [`AREA_LIST_MARKER`].
///
/// Lines before the marker become bullets with list markers stripped; the text
/// after it is the area list. The marker itself is discarded.
pub fn split_reveal_copy(raw: &str) -> RevealCopy {
    let (bullet_text, area_text) = match raw.find(AREA_LIST_MARKER) {
        Some(index) => (&raw[..index], &raw[index + AREA_LIST_MARKER.len()..]),
        None => (raw, ""),
    };

    let bullets = bullet_text
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect();

    RevealCopy {
        bullets,
        area_list: area_text.trim().to_string(),
    }
}
