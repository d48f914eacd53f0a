use serde::{Deserialize, Serialize};

/// Closed set of logical column types a dataset may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    Json,
}

impl ColumnType {
    /// Physical PostgreSQL type used in generated CREATE TABLE statements.
    pub fn physical_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Number => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "TIMESTAMP",
            ColumnType::Json => "JSONB",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Json => "json",
        }
    }

    /// Re-parses a tag already stored in the catalog. Unknown tags fall back
    /// to Text so a stale record can never wedge reads; declared import
    /// specs are deserialized strictly and never take this path.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "number" => ColumnType::Number,
            "boolean" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime,
            "json" => ColumnType::Json,
            _ => ColumnType::Text,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One column as declared by the uploader alongside the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: ColumnType,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_sensitive: bool,
    #[serde(default)]
    pub mask_pattern: Option<String>,
}

fn default_true() -> bool {
    true
}
