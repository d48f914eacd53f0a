use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::catalog::{
    AccessLogEntry, Dataset, DatasetColumn, DatasetRelation, ImportLogEntry, Person,
};
use crate::error::VaultError;
use crate::models::*;
use crate::schema::{access_logs, dataset_columns, dataset_relations, datasets, import_logs, people};
use crate::store::Catalog;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// PostgreSQL-backed metadata catalog.
#[derive(Clone)]
pub struct PgCatalog {
    pool: Pool<AsyncPgConnection>,
}

impl PgCatalog {
    pub async fn new(database_url: &str) -> Result<Self, VaultError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .build()
            .map_err(|e| VaultError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        let catalog = Self { pool };
        catalog.run_migrations(database_url)?;

        Ok(catalog)
    }

    pub fn run_migrations(&self, database_url: &str) -> Result<(), VaultError> {
        use diesel::Connection;
        use diesel::PgConnection;

        // diesel_migrations has no async harness yet, so migrations run over
        // a short-lived synchronous connection at startup.
        let mut connection =
            PgConnection::establish(database_url).map_err(|e| VaultError::ConfigError {
                message: format!("Failed to establish connection for migrations: {}", e),
            })?;

        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| VaultError::ConfigError {
                message: format!("Failed to run migrations: {}", e),
            })?;

        Ok(())
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, VaultError> {
        self.pool.get().await.map_err(|e| VaultError::StorageError {
            message: format!("Failed to get database connection: {}", e),
        })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn create_dataset(
        &self,
        dataset: &Dataset,
        columns: &[DatasetColumn],
    ) -> Result<(), VaultError> {
        info!(
            "Registering dataset {} backed by table {}",
            dataset.id, dataset.table_name
        );
        let mut conn = self.conn().await?;

        conn.transaction::<_, VaultError, _>(|conn| {
            Box::pin(async move {
                let new_dataset = NewDataset {
                    id: &dataset.id,
                    owner_id: &dataset.owner_id,
                    name: &dataset.name,
                    original_file_name: &dataset.original_file_name,
                    table_name: &dataset.table_name,
                    primary_key: &dataset.primary_key,
                    created_at: dataset.created_at,
                };

                diesel::insert_into(datasets::table)
                    .values(&new_dataset)
                    .execute(conn)
                    .await?;

                let new_columns: Vec<NewDatasetColumn> = columns
                    .iter()
                    .map(|column| NewDatasetColumn {
                        dataset_id: &column.dataset_id,
                        name: &column.name,
                        data_type: column.data_type.as_str(),
                        is_nullable: column.is_nullable,
                        is_unique: column.is_unique,
                        is_sensitive: column.is_sensitive,
                        mask_pattern: column.mask_pattern.as_deref(),
                        ordinal: column.ordinal,
                    })
                    .collect();

                diesel::insert_into(dataset_columns::table)
                    .values(&new_columns)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    async fn dataset_for_owner(
        &self,
        dataset_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Dataset>, VaultError> {
        let mut conn = self.conn().await?;

        let dataset = datasets::table
            .filter(datasets::id.eq(dataset_id))
            .filter(datasets::owner_id.eq(owner_id))
            .get_result::<DatasetModel>(&mut conn)
            .await
            .optional()?;

        Ok(dataset.map(|d| d.into()))
    }

    async fn delete_dataset(&self, dataset_id: Uuid) -> Result<(), VaultError> {
        info!("Removing dataset {} from catalog", dataset_id);
        let mut conn = self.conn().await?;

        // Columns and relations go with it via ON DELETE CASCADE.
        diesel::delete(datasets::table.filter(datasets::id.eq(dataset_id)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn list_datasets(&self, owner_id: Uuid) -> Result<Vec<Dataset>, VaultError> {
        let mut conn = self.conn().await?;

        let dataset_list = datasets::table
            .filter(datasets::owner_id.eq(owner_id))
            .order(datasets::created_at.desc())
            .get_results::<DatasetModel>(&mut conn)
            .await?;

        Ok(dataset_list.into_iter().map(|d| d.into()).collect())
    }

    async fn columns_of(&self, dataset_id: Uuid) -> Result<Vec<DatasetColumn>, VaultError> {
        let mut conn = self.conn().await?;

        let columns = dataset_columns::table
            .filter(dataset_columns::dataset_id.eq(dataset_id))
            .order(dataset_columns::ordinal.asc())
            .get_results::<DatasetColumnModel>(&mut conn)
            .await?;

        Ok(columns.into_iter().map(|c| c.into()).collect())
    }

    async fn sensitive_columns_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<DatasetColumn>, VaultError> {
        let mut conn = self.conn().await?;

        let columns = dataset_columns::table
            .inner_join(datasets::table)
            .filter(datasets::owner_id.eq(owner_id))
            .filter(dataset_columns::is_sensitive.eq(true))
            .select(DatasetColumnModel::as_select())
            .get_results::<DatasetColumnModel>(&mut conn)
            .await?;

        Ok(columns.into_iter().map(|c| c.into()).collect())
    }

    async fn create_relation(&self, relation: &DatasetRelation) -> Result<(), VaultError> {
        let mut conn = self.conn().await?;

        let new_relation = NewDatasetRelation {
            id: &relation.id,
            from_dataset_id: &relation.from_dataset_id,
            to_dataset_id: &relation.to_dataset_id,
            from_column: &relation.from_column,
            to_column: &relation.to_column,
            cardinality: relation.cardinality.as_str(),
            created_at: relation.created_at,
        };

        diesel::insert_into(dataset_relations::table)
            .values(&new_relation)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn relations_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<DatasetRelation>, VaultError> {
        let mut conn = self.conn().await?;

        let owned: Vec<Uuid> = datasets::table
            .filter(datasets::owner_id.eq(owner_id))
            .select(datasets::id)
            .get_results::<Uuid>(&mut conn)
            .await?;

        let relations = dataset_relations::table
            .filter(
                dataset_relations::from_dataset_id
                    .eq_any(owned.clone())
                    .or(dataset_relations::to_dataset_id.eq_any(owned)),
            )
            .order(dataset_relations::created_at.asc())
            .get_results::<DatasetRelationModel>(&mut conn)
            .await?;

        Ok(relations.into_iter().map(|r| r.into()).collect())
    }

    async fn record_import(&self, entry: &ImportLogEntry) -> Result<(), VaultError> {
        let mut conn = self.conn().await?;

        let new_log = NewImportLog {
            id: &entry.id,
            owner_id: &entry.owner_id,
            file_name: &entry.file_name,
            table_name: &entry.table_name,
            status: entry.status.as_str(),
            created_at: entry.created_at,
        };

        diesel::insert_into(import_logs::table)
            .values(&new_log)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn record_access(&self, entry: &AccessLogEntry) -> Result<(), VaultError> {
        let mut conn = self.conn().await?;

        let new_log = NewAccessLog {
            id: &entry.id,
            user_id: &entry.user_id,
            action: &entry.action,
            resource: &entry.resource,
            details: entry.details.as_deref(),
            created_at: entry.created_at,
        };

        diesel::insert_into(access_logs::table)
            .values(&new_log)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn create_person(&self, person: &Person) -> Result<(), VaultError> {
        let mut conn = self.conn().await?;

        let new_person = NewPerson {
            id: &person.id,
            owner_id: &person.owner_id,
            kind: person.kind.as_str(),
            name: &person.name,
            document: &person.document,
            email: person.email.as_deref(),
            phone: person.phone.as_deref(),
            address: person.address.as_deref(),
            custom: person.custom.as_ref(),
            created_at: person.created_at,
            deleted_at: person.deleted_at,
        };

        diesel::insert_into(people::table)
            .values(&new_person)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn person_for_owner(
        &self,
        person_id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<Person>, VaultError> {
        let mut conn = self.conn().await?;

        let person = people::table
            .filter(people::id.eq(person_id))
            .filter(people::owner_id.eq(owner_id))
            .get_result::<PersonModel>(&mut conn)
            .await
            .optional()?;

        Ok(person.map(|p| p.into()))
    }

    async fn list_people(&self, owner_id: Uuid) -> Result<Vec<Person>, VaultError> {
        let mut conn = self.conn().await?;

        let entries = people::table
            .filter(people::owner_id.eq(owner_id))
            .filter(people::deleted_at.is_null())
            .order(people::created_at.desc())
            .get_results::<PersonModel>(&mut conn)
            .await?;

        Ok(entries.into_iter().map(|p| p.into()).collect())
    }

    async fn update_person(&self, person: &Person) -> Result<(), VaultError> {
        let mut conn = self.conn().await?;

        diesel::update(people::table.filter(people::id.eq(person.id)))
            .set((
                people::kind.eq(person.kind.as_str()),
                people::name.eq(&person.name),
                people::document.eq(&person.document),
                people::email.eq(person.email.as_deref()),
                people::phone.eq(person.phone.as_deref()),
                people::address.eq(person.address.as_deref()),
                people::custom.eq(person.custom.as_ref()),
                people::deleted_at.eq(person.deleted_at),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }
}
