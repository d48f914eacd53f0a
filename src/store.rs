use async_trait::async_trait;
use uuid::Uuid;

use crate::catalog::{
    AccessLogEntry, Dataset, DatasetColumn, DatasetRelation, ImportLogEntry, Person,
};
use crate::error::VaultError;

/// Dynamic-shape record: column name to JSON value. Covers table rows,
/// generated-query results and serialized registry entries alike.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Metadata catalog operations. Backed by PostgreSQL in production and by
/// an in-memory stub in tests.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn create_dataset(
        &self,
        dataset: &Dataset,
        columns: &[DatasetColumn],
    ) -> Result<(), VaultError>;

    async fn dataset_for_owner(
        &self,
        dataset_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Dataset>, VaultError>;

    async fn delete_dataset(&self, dataset_id: Uuid) -> Result<(), VaultError>;

    async fn list_datasets(&self, owner_id: Uuid) -> Result<Vec<Dataset>, VaultError>;

    async fn columns_of(&self, dataset_id: Uuid) -> Result<Vec<DatasetColumn>, VaultError>;

    async fn sensitive_columns_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<DatasetColumn>, VaultError>;

    async fn create_relation(&self, relation: &DatasetRelation) -> Result<(), VaultError>;

    async fn relations_for_owner(&self, owner_id: Uuid)
        -> Result<Vec<DatasetRelation>, VaultError>;

    async fn record_import(&self, entry: &ImportLogEntry) -> Result<(), VaultError>;

    async fn record_access(&self, entry: &AccessLogEntry) -> Result<(), VaultError>;

    async fn create_person(&self, person: &Person) -> Result<(), VaultError>;

    async fn person_for_owner(
        &self,
        person_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Person>, VaultError>;

    async fn list_people(&self, owner_id: Uuid) -> Result<Vec<Person>, VaultError>;

    async fn update_person(&self, person: &Person) -> Result<(), VaultError>;
}

/// Raw SQL execution against the dynamic-table side of the database.
/// Statements arrive fully rendered; implementations run them verbatim and
/// report rows in text form.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<u64, VaultError>;

    async fn query(&self, sql: &str) -> Result<Vec<Row>, VaultError>;
}
