use crate::error::{PlatformError, PlatformResult};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_ERROR_CHARS: usize = 1000;
pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 10;
pub const DEFAULT_PRIORITY: i32 = 5;

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").expect("factor code pattern"));

/// Trims every entry, drops blanks and repeats; first occurrence wins.
pub fn normalize_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let token = item.as_ref().trim();
        if token.is_empty() || out.iter().any(|t| t == token) {
            continue;
        }
        out.push(token.to_string());
    }
    out
}

/// Splits a comma separated CLI argument into a normalized list.
pub fn parse_csv_list(raw: &str) -> Vec<String> {
    normalize_list(raw.split(','))
}

pub fn normalize_code(code: &str) -> PlatformResult<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(PlatformError::invalid("factor code is required"));
    }
    if !CODE_RE.is_match(code) {
        return Err(PlatformError::invalid(format!(
            "factor code '{}' may only contain letters, digits, '_', '.', ':' or '-'",
            code
        )));
    }
    Ok(code.to_string())
}

pub fn normalize_expression(expression: &str) -> PlatformResult<String> {
    let expr = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    if expr.is_empty() {
        return Err(PlatformError::invalid("expression is required"));
    }
    Ok(expr)
}

/// Blank optional text is treated as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_date(field: &str, value: &str) -> PlatformResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        PlatformError::invalid(format!("{} '{}' is not a YYYY-MM-DD date", field, value))
    })
}

pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
