use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::column::ColumnType;

/// A registered dataset: declared name plus the physical table backing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub original_file_name: String,
    pub table_name: String,
    pub primary_key: String,
    pub created_at: DateTime<Utc>,
}

/// Column metadata fixed at import time. `name` is the sanitized identifier
/// of the physical column; `ordinal` preserves the declared order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetColumn {
    pub dataset_id: Uuid,
    pub name: String,
    pub data_type: ColumnType,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub is_sensitive: bool,
    pub mask_pattern: Option<String>,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "ONE_TO_ONE",
            Cardinality::OneToMany => "ONE_TO_MANY",
            Cardinality::ManyToOne => "MANY_TO_ONE",
            Cardinality::ManyToMany => "MANY_TO_MANY",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ONE_TO_ONE" => Cardinality::OneToOne,
            "ONE_TO_MANY" => Cardinality::OneToMany,
            "MANY_TO_MANY" => Cardinality::ManyToMany,
            _ => Cardinality::ManyToOne,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptive link between two dataset columns. Not enforced physically;
/// feeds the ER graph and the SQL generation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRelation {
    pub id: Uuid,
    pub from_dataset_id: Uuid,
    pub to_dataset_id: Uuid,
    pub from_column: String,
    pub to_column: String,
    pub cardinality: Cardinality,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Imported,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Imported => "IMPORTED",
            ImportStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub table_name: String,
    pub status: ImportStatus,
    pub created_at: DateTime<Utc>,
}

impl ImportLogEntry {
    pub fn new(owner_id: Uuid, file_name: &str, table_name: &str, status: ImportStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            file_name: file_name.to_string(),
            table_name: table_name.to_string(),
            status,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub resource: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn new(user_id: Uuid, action: &str, resource: &str, details: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.to_string(),
            resource: resource.to_string(),
            details,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersonKind {
    Natural,
    Legal,
}

impl PersonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonKind::Natural => "NATURAL",
            PersonKind::Legal => "LEGAL",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "LEGAL" => PersonKind::Legal,
            _ => PersonKind::Natural,
        }
    }
}

/// A registered data subject. The forget flow anonymizes and soft-deletes
/// rather than removing the row, so the record stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: PersonKind,
    pub name: String,
    pub document: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub custom: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Entity-relationship view over a caller's datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErGraph {
    pub datasets: Vec<Dataset>,
    pub relations: Vec<DatasetRelation>,
}
