use serde_json::Value;

use super::Fields;

/// Structured query over record fields.
///
/// Values are user-controlled (category and area come straight from URLs), so
/// the formula rendering escapes every literal instead of splicing raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    EqIgnoreCase(String, String),
    /// Equality on the folded key: ASCII letters and digits only, lowercased.
    EqKey(String, String),
    Blank(String),
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn eq_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EqIgnoreCase(field.into(), value.into())
    }

    pub fn eq_key(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EqKey(field.into(), value.into())
    }

    pub fn blank(field: impl Into<String>) -> Self {
        Self::Blank(field.into())
    }

    /// Renders an Airtable `filterByFormula` expression.
    pub fn to_formula(&self) -> String {
        match self {
            Self::Eq(field, value) => {
                format!("{}={}", field_ref(field), string_literal(value))
            }
            Self::EqIgnoreCase(field, value) => format!(
                "LOWER({})={}",
                field_ref(field),
                string_literal(&value.to_lowercase())
            ),
            Self::EqKey(field, value) => format!(
                "LOWER(REGEX_REPLACE({}, '[^A-Za-z0-9]', ''))={}",
                field_ref(field),
                string_literal(&fold_key(value))
            ),
            Self::Blank(field) => format!("{}=BLANK()", field_ref(field)),
            Self::All(parts) => combine("AND", "TRUE()", parts),
            Self::Any(parts) => combine("OR", "FALSE()", parts),
        }
    }

    /// Evaluates the filter against in-memory fields.
    ///
    /// Missing, null and empty-string values all count as blank, matching the
    /// store's `BLANK()` semantics.
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::Eq(field, value) => field_text(fields, field).is_some_and(|actual| actual == *value),
            Self::EqIgnoreCase(field, value) => field_text(fields, field)
                .is_some_and(|actual| actual.to_lowercase() == value.to_lowercase()),
            Self::EqKey(field, value) => {
                field_text(fields, field).is_some_and(|actual| fold_key(&actual) == fold_key(value))
            }
            Self::Blank(field) => field_text(fields, field).is_none_or(|actual| actual.is_empty()),
            Self::All(parts) => parts.iter().all(|part| part.matches(fields)),
            Self::Any(parts) => parts.iter().any(|part| part.matches(fields)),
        }
    }
}

/// Lowercased ASCII alphanumerics of `value`; `Pending Payment`,
/// `pending_payment` and `PendingPayment` all fold to `pendingpayment`.
pub fn fold_key(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

fn combine(op: &str, empty: &str, parts: &[Filter]) -> String {
    match parts {
        [] => empty.to_string(),
        [single] => single.to_formula(),
        _ => {
            let rendered: Vec<String> = parts.iter().map(Filter::to_formula).collect();
            format!("{op}({})", rendered.join(", "))
        }
    }
}

fn field_ref(field: &str) -> String {
    let cleaned: String = field
        .chars()
        .filter(|ch| *ch != '{' && *ch != '}' && !ch.is_control())
        .collect();
    format!("{{{cleaned}}}")
}

fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            ch if ch.is_control() => {}
            ch => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn field_text(fields: &Fields, field: &str) -> Option<String> {
    match fields.get(field)? {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}
