use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::VaultError;

pub const DEFAULT_ROW_LIMIT: usize = 100;

const REJECTION_MESSAGE: &str = "Only read-only SELECT queries are allowed";

// Keywords matched as whole words: a column named created_at must not trip
// the filter, while any mutating statement's verb still does.
static FORBIDDEN_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|truncate|create|grant|revoke|commit|rollback)\b",
    )
    .expect("valid regex")
});

static LEADING_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^select\s").expect("valid regex"));

static HAS_LIMIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blimit\b").expect("valid regex"));

/// Last line of defense between generated SQL and the database: accepts a
/// single read-only SELECT, caps unbounded results, and reports every
/// rejection with the same generic message so the statement text never
/// leaks into an error. This is a syntactic filter, not a SQL parser.
pub fn guard_generated_sql(raw: &str) -> Result<String, VaultError> {
    let sql = strip_code_fence(raw);
    let sql = sql.trim_end_matches(';').trim_end();

    if FORBIDDEN_KEYWORDS.is_match(sql) || !LEADING_SELECT.is_match(sql) {
        return Err(VaultError::QueryRejected {
            message: REJECTION_MESSAGE.to_string(),
        });
    }

    if HAS_LIMIT.is_match(sql) {
        Ok(sql.to_string())
    } else {
        Ok(format!("{} LIMIT {}", sql, DEFAULT_ROW_LIMIT))
    }
}

/// Removes one leading ```lang fence line and one trailing fence, the usual
/// decoration on model output.
fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        if let Some((lang, body)) = rest.split_once('\n') {
            if lang.chars().all(|c| c.is_ascii_alphabetic()) {
                text = body;
            }
        }
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim()
}
