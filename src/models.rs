use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::catalog::{Cardinality, Dataset, DatasetColumn, DatasetRelation, Person, PersonKind};
use crate::column::ColumnType;
use crate::schema::{access_logs, dataset_columns, dataset_relations, datasets, import_logs, people};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(primary_key(id))]
pub struct DatasetModel {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub original_file_name: String,
    pub table_name: String,
    pub primary_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDataset<'a> {
    pub id: &'a Uuid,
    pub owner_id: &'a Uuid,
    pub name: &'a str,
    pub original_file_name: &'a str,
    pub table_name: &'a str,
    pub primary_key: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = dataset_columns)]
#[diesel(belongs_to(DatasetModel, foreign_key = dataset_id))]
#[diesel(primary_key(dataset_id, name))]
pub struct DatasetColumnModel {
    pub dataset_id: Uuid,
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub is_sensitive: bool,
    pub mask_pattern: Option<String>,
    pub ordinal: i32,
}

#[derive(Insertable)]
#[diesel(table_name = dataset_columns)]
pub struct NewDatasetColumn<'a> {
    pub dataset_id: &'a Uuid,
    pub name: &'a str,
    pub data_type: &'a str,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub is_sensitive: bool,
    pub mask_pattern: Option<&'a str>,
    pub ordinal: i32,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = dataset_relations)]
#[diesel(primary_key(id))]
pub struct DatasetRelationModel {
    pub id: Uuid,
    pub from_dataset_id: Uuid,
    pub to_dataset_id: Uuid,
    pub from_column: String,
    pub to_column: String,
    pub cardinality: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = dataset_relations)]
pub struct NewDatasetRelation<'a> {
    pub id: &'a Uuid,
    pub from_dataset_id: &'a Uuid,
    pub to_dataset_id: &'a Uuid,
    pub from_column: &'a str,
    pub to_column: &'a str,
    pub cardinality: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = import_logs)]
pub struct NewImportLog<'a> {
    pub id: &'a Uuid,
    pub owner_id: &'a Uuid,
    pub file_name: &'a str,
    pub table_name: &'a str,
    pub status: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = access_logs)]
pub struct NewAccessLog<'a> {
    pub id: &'a Uuid,
    pub user_id: &'a Uuid,
    pub action: &'a str,
    pub resource: &'a str,
    pub details: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = people)]
#[diesel(primary_key(id))]
pub struct PersonModel {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: String,
    pub name: String,
    pub document: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub custom: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Insertable)]
#[diesel(table_name = people)]
pub struct NewPerson<'a> {
    pub id: &'a Uuid,
    pub owner_id: &'a Uuid,
    pub kind: &'a str,
    pub name: &'a str,
    pub document: &'a str,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub address: Option<&'a str>,
    pub custom: Option<&'a serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DatasetModel> for Dataset {
    fn from(model: DatasetModel) -> Self {
        Dataset {
            id: model.id,
            owner_id: model.owner_id,
            name: model.name,
            original_file_name: model.original_file_name,
            table_name: model.table_name,
            primary_key: model.primary_key,
            created_at: model.created_at,
        }
    }
}

impl From<DatasetColumnModel> for DatasetColumn {
    fn from(model: DatasetColumnModel) -> Self {
        DatasetColumn {
            dataset_id: model.dataset_id,
            name: model.name,
            data_type: ColumnType::from_tag(&model.data_type),
            is_nullable: model.is_nullable,
            is_unique: model.is_unique,
            is_sensitive: model.is_sensitive,
            mask_pattern: model.mask_pattern,
            ordinal: model.ordinal,
        }
    }
}

impl From<DatasetRelationModel> for DatasetRelation {
    fn from(model: DatasetRelationModel) -> Self {
        DatasetRelation {
            id: model.id,
            from_dataset_id: model.from_dataset_id,
            to_dataset_id: model.to_dataset_id,
            from_column: model.from_column,
            to_column: model.to_column,
            cardinality: Cardinality::from_tag(&model.cardinality),
            created_at: model.created_at,
        }
    }
}

impl From<PersonModel> for Person {
    fn from(model: PersonModel) -> Self {
        Person {
            id: model.id,
            owner_id: model.owner_id,
            kind: PersonKind::from_tag(&model.kind),
            name: model.name,
            document: model.document,
            email: model.email,
            phone: model.phone,
            address: model.address,
            custom: model.custom,
            created_at: model.created_at,
            deleted_at: model.deleted_at,
        }
    }
}
