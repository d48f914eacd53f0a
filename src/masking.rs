use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::DatasetColumn;
use crate::identity::Role;
use crate::store::Row;

pub const MASKED_PLACEHOLDER: &str = "***";
pub const VISIBLE_TAIL: usize = 4;

/// Field names that commonly hold personal data. Generated-query results
/// have no declared schema, so these names are masked by default alongside
/// the caller's declared sensitive columns.
pub const COMMON_PII_FIELDS: &[&str] = &["cpf", "cnpj", "document", "email", "phone", "address"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskPolicy {
    pub is_sensitive: bool,
    pub mask_pattern: Option<String>,
}

impl MaskPolicy {
    pub fn sensitive() -> Self {
        Self {
            is_sensitive: true,
            mask_pattern: None,
        }
    }

    pub fn with_pattern(pattern: &str) -> Self {
        Self {
            is_sensitive: true,
            mask_pattern: Some(pattern.to_string()),
        }
    }
}

/// Column name to policy, assembled per request and never persisted.
pub type PolicyMap = HashMap<String, MaskPolicy>;

pub fn policies_from_columns(columns: &[DatasetColumn]) -> PolicyMap {
    let mut policies = PolicyMap::new();
    for column in columns {
        policies
            .entry(column.name.clone())
            .or_insert_with(|| MaskPolicy {
                is_sensitive: column.is_sensitive,
                mask_pattern: column.mask_pattern.clone(),
            });
    }
    policies
}

/// Fills in default-sensitive entries for the well-known PII field names
/// without overriding declared policies.
pub fn merge_common_pii(mut policies: PolicyMap) -> PolicyMap {
    for field in COMMON_PII_FIELDS {
        policies
            .entry((*field).to_string())
            .or_insert_with(MaskPolicy::sensitive);
    }
    policies
}

/// Masks a single value. Nulls pass through, non-strings collapse to the
/// placeholder, strings follow the pattern when its character length matches
/// exactly and otherwise keep only the last four characters visible.
pub fn mask_value(value: &Value, pattern: Option<&str>) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(text) => Value::String(mask_text(text, pattern)),
        _ => Value::String(MASKED_PLACEHOLDER.to_string()),
    }
}

fn mask_text(text: &str, pattern: Option<&str>) -> String {
    let chars: Vec<char> = text.chars().collect();

    if let Some(pattern) = pattern {
        let pattern_chars: Vec<char> = pattern.chars().collect();
        if pattern_chars.len() == chars.len() {
            // X keeps the character in that position, anything else masks it.
            return chars
                .iter()
                .zip(pattern_chars.iter())
                .map(|(ch, pc)| if *pc == 'X' { *ch } else { '*' })
                .collect();
        }
        // Mismatched pattern length falls back to the default rule.
    }

    if chars.len() <= VISIBLE_TAIL {
        return text.to_string();
    }
    let hidden = chars.len() - VISIBLE_TAIL;
    let mut out = "*".repeat(hidden);
    out.extend(chars[hidden..].iter());
    out
}

/// Applies the policy map to one row. Elevated roles get the row back
/// untouched; absent fields and non-sensitive policies are no-ops. Works on
/// any row shape and never errors.
pub fn apply_masking(row: Row, policies: &PolicyMap, role: Role) -> Row {
    if role.sees_clear_values() {
        return row;
    }

    let mut row = row;
    for (column, policy) in policies {
        if !policy.is_sensitive {
            continue;
        }
        if let Some(value) = row.get_mut(column) {
            let masked = mask_value(value, policy.mask_pattern.as_deref());
            *value = masked;
        }
    }
    row
}
