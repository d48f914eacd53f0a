use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::{stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{Dataset, DatasetColumn, ImportLogEntry, ImportStatus};
use crate::column::{ColumnSpec, ColumnType};
use crate::error::VaultError;
use crate::ident::{quote_identifier, sanitize_identifier};
use crate::literal::sql_literal;
use crate::reader::read_full;
use crate::store::{Catalog, Row, TableStore};

/// Rows per generated INSERT statement.
pub const BATCH_SIZE: usize = 500;
/// Upper bound on INSERT statements in flight for one import.
pub const INSERT_FANOUT: usize = 4;

const TABLE_BASE_LIMIT: usize = 32;

/// Declared shape of an upload, confirmed by the caller after preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSpec {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnSpec>,
    pub file_path: PathBuf,
    pub original_file_name: String,
}

/// One page of a materialized table, before masking.
#[derive(Debug, Clone)]
pub struct TablePage {
    pub dataset: Dataset,
    pub columns: Vec<DatasetColumn>,
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Turns a declared column spec plus a tabular file into a physical table
/// and its catalog metadata, and serves paginated reads over the result.
pub struct DatasetIngestor {
    catalog: Arc<dyn Catalog>,
    tables: Arc<dyn TableStore>,
}

impl DatasetIngestor {
    pub fn new(catalog: Arc<dyn Catalog>, tables: Arc<dyn TableStore>) -> Self {
        Self { catalog, tables }
    }

    /// Runs one import to completion: validate the declared columns, register metadata,
    /// create the table, check primary-key integrity over the full file and
    /// bulk-load the rows. A failure after metadata is registered triggers a
    /// compensating cleanup before the error propagates.
    pub async fn import(&self, owner_id: Uuid, spec: &ImportSpec) -> Result<Dataset, VaultError> {
        let plan = ImportPlan::from_spec(spec)?;

        let dataset = Dataset {
            id: Uuid::new_v4(),
            owner_id,
            name: spec.name.trim().to_string(),
            original_file_name: spec.original_file_name.clone(),
            table_name: plan.table_name.clone(),
            primary_key: plan.physical_primary_key.clone(),
            created_at: Utc::now(),
        };
        let columns = plan.catalog_columns(dataset.id);

        // Metadata goes in first so a half-finished import still has a
        // record the cleanup path can correlate with the physical table.
        self.catalog.create_dataset(&dataset, &columns).await?;

        match self.materialize(spec, &plan).await {
            Ok(row_count) => {
                let entry = ImportLogEntry::new(
                    owner_id,
                    &spec.original_file_name,
                    &dataset.table_name,
                    ImportStatus::Imported,
                );
                self.catalog.record_import(&entry).await?;
                info!(
                    "imported dataset {}: {} rows into {}",
                    dataset.id, row_count, dataset.table_name
                );
                Ok(dataset)
            }
            Err(error) => {
                self.rollback(&dataset).await;
                Err(error)
            }
        }
    }

    async fn materialize(&self, spec: &ImportSpec, plan: &ImportPlan) -> Result<usize, VaultError> {
        self.tables.execute(&plan.create_table_sql()).await?;

        // Independent full read; the preview may have been capped.
        let file = read_full(&spec.file_path)?;
        validate_primary_key(&file.rows, &plan.declared_primary_key)?;

        let row_count = file.rows.len();
        let statements: Vec<String> = file
            .rows
            .chunks(BATCH_SIZE)
            .map(|batch| plan.insert_sql(batch))
            .collect();

        stream::iter(statements.into_iter().map(Ok))
            .try_for_each_concurrent(INSERT_FANOUT, |statement| {
                let tables = Arc::clone(&self.tables);
                async move { tables.execute(&statement).await.map(|_| ()) }
            })
            .await?;

        Ok(row_count)
    }

    /// Best-effort compensation after a failed import: drop whatever exists
    /// of the physical table, remove the metadata and leave a FAILED import
    /// log entry behind. Each step logs and moves on if it fails itself.
    async fn rollback(&self, dataset: &Dataset) {
        let drop_sql = format!(
            "DROP TABLE IF EXISTS {}",
            quote_identifier(&dataset.table_name)
        );
        if let Err(error) = self.tables.execute(&drop_sql).await {
            warn!(
                "import rollback: dropping {} failed: {}",
                dataset.table_name, error
            );
        }
        if let Err(error) = self.catalog.delete_dataset(dataset.id).await {
            warn!(
                "import rollback: removing dataset {} failed: {}",
                dataset.id, error
            );
        }
        let entry = ImportLogEntry::new(
            dataset.owner_id,
            &dataset.original_file_name,
            &dataset.table_name,
            ImportStatus::Failed,
        );
        if let Err(error) = self.catalog.record_import(&entry).await {
            warn!(
                "import rollback: recording failure for {} failed: {}",
                dataset.id, error
            );
        }
    }

    /// Owner-scoped windowed read: one SELECT for the page, one COUNT(*)
    /// for the total. Rows come back ordered by primary key so the window
    /// is stable across requests.
    pub async fn page(
        &self,
        owner_id: Uuid,
        dataset_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<TablePage, VaultError> {
        let dataset = self
            .catalog
            .dataset_for_owner(dataset_id, owner_id)
            .await?
            .ok_or(VaultError::DatasetNotFound { dataset_id })?;
        let columns = self.catalog.columns_of(dataset_id).await?;

        let offset = page.max(1).saturating_sub(1) * page_size;
        let select = format!(
            "SELECT * FROM {} ORDER BY {} OFFSET {} LIMIT {}",
            quote_identifier(&dataset.table_name),
            quote_identifier(&dataset.primary_key),
            offset,
            page_size
        );
        let raw_rows = self.tables.query(&select).await?;

        let count_sql = format!(
            "SELECT COUNT(*) AS count FROM {}",
            quote_identifier(&dataset.table_name)
        );
        let total = self
            .tables
            .query(&count_sql)
            .await?
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|value| value.as_str())
            .and_then(|text| text.parse::<u64>().ok())
            .unwrap_or(0);

        let rows = raw_rows
            .into_iter()
            .map(|row| coerce_row(row, &columns))
            .collect();

        Ok(TablePage {
            dataset,
            columns,
            rows,
            total,
        })
    }
}

/// Identifier work done up front: sanitized physical names in declared
/// order, plus the raw declared names used to look cells up in file rows.
struct ImportPlan {
    table_name: String,
    declared_primary_key: String,
    physical_primary_key: String,
    columns: Vec<PlannedColumn>,
}

struct PlannedColumn {
    declared: String,
    physical: String,
    spec: ColumnSpec,
}

impl ImportPlan {
    fn from_spec(spec: &ImportSpec) -> Result<Self, VaultError> {
        if spec.name.trim().is_empty() {
            return Err(VaultError::InvalidImportSpec {
                message: "dataset name must not be empty".to_string(),
            });
        }
        if spec.columns.is_empty() {
            return Err(VaultError::InvalidImportSpec {
                message: "at least one column must be declared".to_string(),
            });
        }
        if !spec.file_path.exists() {
            return Err(VaultError::InvalidImportSpec {
                message: format!("uploaded file {} is missing", spec.file_path.display()),
            });
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            let physical = sanitize_identifier(&column.name);
            if physical.is_empty() {
                return Err(VaultError::InvalidImportSpec {
                    message: format!(
                        "column name {:?} sanitizes to an empty identifier",
                        column.name
                    ),
                });
            }
            if !seen.insert(physical.clone()) {
                return Err(VaultError::InvalidImportSpec {
                    message: format!(
                        "column name {:?} collides with another column after sanitization",
                        column.name
                    ),
                });
            }
            columns.push(PlannedColumn {
                declared: column.name.clone(),
                physical,
                spec: column.clone(),
            });
        }

        let physical_primary_key = sanitize_identifier(&spec.primary_key);
        let declared_primary_key = columns
            .iter()
            .find(|column| column.physical == physical_primary_key)
            .map(|column| column.declared.clone())
            .ok_or_else(|| VaultError::InvalidImportSpec {
                message: format!(
                    "primary key {:?} is not among the declared columns",
                    spec.primary_key
                ),
            })?;

        Ok(Self {
            table_name: derive_table_name(&spec.name),
            declared_primary_key,
            physical_primary_key,
            columns,
        })
    }

    fn catalog_columns(&self, dataset_id: Uuid) -> Vec<DatasetColumn> {
        self.columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| DatasetColumn {
                dataset_id,
                name: column.physical.clone(),
                data_type: column.spec.data_type,
                is_nullable: column.spec.is_nullable,
                is_unique: column.spec.is_unique,
                is_sensitive: column.spec.is_sensitive,
                mask_pattern: column.spec.mask_pattern.clone(),
                ordinal: ordinal as i32,
            })
            .collect()
    }

    /// Uniqueness, sensitivity and mask patterns stay metadata-only; the
    /// physical table enforces just the primary key and NOT NULL.
    fn create_table_sql(&self) -> String {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!(
                    "{} {}",
                    quote_identifier(&column.physical),
                    column.spec.data_type.physical_type()
                );
                if column.physical == self.physical_primary_key {
                    definition.push_str(" PRIMARY KEY");
                } else if !column.spec.is_nullable {
                    definition.push_str(" NOT NULL");
                }
                definition
            })
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&self.table_name),
            definitions.join(", ")
        )
    }

    /// Cell order follows the declared column list, not the file's header
    /// order. A declared column missing from the file inserts as NULL.
    fn insert_sql(&self, batch: &[Row]) -> String {
        let column_list: Vec<String> = self
            .columns
            .iter()
            .map(|column| quote_identifier(&column.physical))
            .collect();
        let tuples: Vec<String> = batch
            .iter()
            .map(|row| {
                let cells: Vec<String> = self
                    .columns
                    .iter()
                    .map(|column| sql_literal(row.get(&column.declared)))
                    .collect();
                format!("({})", cells.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_identifier(&self.table_name),
            column_list.join(", "),
            tuples.join(", ")
        )
    }
}

/// Physical names combine the sanitized declared name, a millisecond
/// timestamp and a random suffix. The suffix keeps two same-named imports
/// distinct even when they land on the same millisecond.
fn derive_table_name(declared_name: &str) -> String {
    let sanitized = sanitize_identifier(declared_name);
    let base = if sanitized.is_empty() {
        "dataset"
    } else {
        sanitized.as_str()
    };
    let base: String = base.chars().take(TABLE_BASE_LIMIT).collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        base.trim_end_matches('_'),
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}

fn validate_primary_key(rows: &[Row], declared_key: &str) -> Result<(), VaultError> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        let key = match row.get(declared_key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.trim().to_string(),
            Some(other) => other.to_string(),
        };
        if key.is_empty() {
            return Err(VaultError::PrimaryKeyViolation {
                message: "Primary key contains null or empty values".to_string(),
            });
        }
        if !seen.insert(key) {
            return Err(VaultError::PrimaryKeyViolation {
                message: "Primary key contains duplicate values".to_string(),
            });
        }
    }
    Ok(())
}

/// simple-query results report every cell as text; this folds cells back
/// into the JSON shape their declared type implies.
fn coerce_row(mut row: Row, columns: &[DatasetColumn]) -> Row {
    for column in columns {
        if let Some(value) = row.remove(&column.name) {
            row.insert(column.name.clone(), coerce_value(value, column.data_type));
        }
    }
    row
}

fn coerce_value(value: Value, data_type: ColumnType) -> Value {
    let text = match value {
        Value::String(text) => text,
        other => return other,
    };
    match data_type {
        ColumnType::Number => {
            if let Ok(int) = text.parse::<i64>() {
                Value::Number(int.into())
            } else {
                text.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::String(text))
            }
        }
        ColumnType::Boolean => match text.as_str() {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => Value::String(text),
        },
        ColumnType::Json => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::stubs::{StubCatalog, StubTableStore};
    use serde_json::json;
    use std::io::Write;

    fn write_csv(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn column(name: &str, data_type: ColumnType) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            data_type,
            is_nullable: true,
            is_unique: false,
            is_sensitive: false,
            mask_pattern: None,
        }
    }

    fn spec_for(path: &std::path::Path, columns: Vec<ColumnSpec>, primary_key: &str) -> ImportSpec {
        ImportSpec {
            name: "Customer Data".to_string(),
            primary_key: primary_key.to_string(),
            columns,
            file_path: path.to_path_buf(),
            original_file_name: "customers.csv".to_string(),
        }
    }

    fn text_row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect()
    }

    #[tokio::test]
    async fn import_creates_table_loads_rows_and_logs() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog.clone(), tables.clone());

        let (_dir, path) = write_csv("id,name\n1,O'Brien\n2,Alice\n3,Bob\n");
        let spec = spec_for(
            &path,
            vec![
                column("id", ColumnType::Number),
                column("name", ColumnType::Text),
            ],
            "id",
        );

        let owner = Uuid::new_v4();
        let dataset = ingestor.import(owner, &spec).await.unwrap();

        assert!(dataset.table_name.starts_with("customer_data_"));
        assert_eq!(dataset.primary_key, "id");

        let statements = tables.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            format!(
                "CREATE TABLE \"{}\" (\"id\" NUMERIC PRIMARY KEY, \"name\" TEXT)",
                dataset.table_name
            )
        );
        assert_eq!(
            statements[1],
            format!(
                "INSERT INTO \"{}\" (\"id\", \"name\") VALUES ('1', 'O''Brien'), ('2', 'Alice'), ('3', 'Bob')",
                dataset.table_name
            )
        );

        let state = catalog.state.lock().unwrap();
        assert_eq!(state.datasets.len(), 1);
        assert_eq!(state.columns[&dataset.id].len(), 2);
        assert_eq!(state.columns[&dataset.id][1].ordinal, 1);
        assert_eq!(state.imports.len(), 1);
        assert_eq!(state.imports[0].status, ImportStatus::Imported);
    }

    #[tokio::test]
    async fn duplicate_primary_key_aborts_and_compensates() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog.clone(), tables.clone());

        let (_dir, path) = write_csv("id,name\n1,Alice\n1,Bob\n");
        let spec = spec_for(
            &path,
            vec![
                column("id", ColumnType::Number),
                column("name", ColumnType::Text),
            ],
            "id",
        );

        let error = ingestor.import(Uuid::new_v4(), &spec).await.unwrap_err();
        assert!(matches!(error, VaultError::PrimaryKeyViolation { .. }));

        // CREATE TABLE went out, then the compensating DROP; no INSERT.
        let statements = tables.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].starts_with("DROP TABLE IF EXISTS \"customer_data_"));

        let state = catalog.state.lock().unwrap();
        assert!(state.datasets.is_empty());
        assert_eq!(state.imports.len(), 1);
        assert_eq!(state.imports[0].status, ImportStatus::Failed);
    }

    #[tokio::test]
    async fn insert_failure_drops_the_table_and_unregisters_the_dataset() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        tables.fail_when_contains("INSERT INTO");
        let ingestor = DatasetIngestor::new(catalog.clone(), tables.clone());

        let (_dir, path) = write_csv("id,name\n1,Alice\n2,Bob\n");
        let spec = spec_for(
            &path,
            vec![
                column("id", ColumnType::Number),
                column("name", ColumnType::Text),
            ],
            "id",
        );

        let error = ingestor.import(Uuid::new_v4(), &spec).await.unwrap_err();
        assert!(matches!(error, VaultError::StorageError { .. }));

        let statements = tables.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[2].starts_with("DROP TABLE IF EXISTS \"customer_data_"));

        let state = catalog.state.lock().unwrap();
        assert!(state.datasets.is_empty());
        assert_eq!(state.imports[0].status, ImportStatus::Failed);
    }

    #[tokio::test]
    async fn empty_primary_key_value_aborts() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog, tables);

        let (_dir, path) = write_csv("id,name\n1,Alice\n,Bob\n");
        let spec = spec_for(
            &path,
            vec![
                column("id", ColumnType::Number),
                column("name", ColumnType::Text),
            ],
            "id",
        );

        let error = ingestor.import(Uuid::new_v4(), &spec).await.unwrap_err();
        match error {
            VaultError::PrimaryKeyViolation { message } => {
                assert_eq!(message, "Primary key contains null or empty values")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_declared_column_inserts_nulls() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog, tables.clone());

        let (_dir, path) = write_csv("id,name\n1,Alice\n");
        let spec = spec_for(
            &path,
            vec![
                column("id", ColumnType::Number),
                column("name", ColumnType::Text),
                column("email", ColumnType::Text),
            ],
            "id",
        );

        ingestor.import(Uuid::new_v4(), &spec).await.unwrap();

        let statements = tables.statements();
        assert!(statements[1].ends_with("VALUES ('1', 'Alice', NULL)"));
    }

    #[tokio::test]
    async fn rejects_unknown_primary_key_and_colliding_columns() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog.clone(), tables.clone());

        let (_dir, path) = write_csv("id\n1\n");

        let spec = spec_for(&path, vec![column("id", ColumnType::Number)], "missing");
        let error = ingestor.import(Uuid::new_v4(), &spec).await.unwrap_err();
        assert!(matches!(error, VaultError::InvalidImportSpec { .. }));

        let spec = spec_for(
            &path,
            vec![
                column("User Name", ColumnType::Text),
                column("user_name", ColumnType::Text),
            ],
            "User Name",
        );
        let error = ingestor.import(Uuid::new_v4(), &spec).await.unwrap_err();
        assert!(matches!(error, VaultError::InvalidImportSpec { .. }));

        // Nothing reached the catalog or the table store.
        assert!(catalog.state.lock().unwrap().datasets.is_empty());
        assert!(tables.statements().is_empty());
    }

    #[tokio::test]
    async fn page_reads_are_ordered_windowed_and_counted() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog.clone(), tables.clone());

        let owner = Uuid::new_v4();
        let dataset = Dataset {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Orders".to_string(),
            original_file_name: "orders.csv".to_string(),
            table_name: "orders_1700000000000_ab12cd34".to_string(),
            primary_key: "id".to_string(),
            created_at: Utc::now(),
        };
        let columns = vec![
            DatasetColumn {
                dataset_id: dataset.id,
                name: "id".to_string(),
                data_type: ColumnType::Number,
                is_nullable: false,
                is_unique: false,
                is_sensitive: false,
                mask_pattern: None,
                ordinal: 0,
            },
            DatasetColumn {
                dataset_id: dataset.id,
                name: "total".to_string(),
                data_type: ColumnType::Number,
                is_nullable: true,
                is_unique: false,
                is_sensitive: false,
                mask_pattern: None,
                ordinal: 1,
            },
            DatasetColumn {
                dataset_id: dataset.id,
                name: "paid".to_string(),
                data_type: ColumnType::Boolean,
                is_nullable: true,
                is_unique: false,
                is_sensitive: false,
                mask_pattern: None,
                ordinal: 2,
            },
        ];
        catalog.create_dataset(&dataset, &columns).await.unwrap();

        tables.push_result(vec![text_row(&[
            ("id", "26"),
            ("total", "10.5"),
            ("paid", "t"),
        ])]);
        tables.push_result(vec![text_row(&[("count", "51")])]);

        let page = ingestor.page(owner, dataset.id, 2, 25).await.unwrap();

        assert_eq!(page.total, 51);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0]["id"], json!(26));
        assert_eq!(page.rows[0]["total"], json!(10.5));
        assert_eq!(page.rows[0]["paid"], json!(true));

        let statements = tables.statements();
        assert_eq!(
            statements[0],
            "SELECT * FROM \"orders_1700000000000_ab12cd34\" ORDER BY \"id\" OFFSET 25 LIMIT 25"
        );
        assert_eq!(
            statements[1],
            "SELECT COUNT(*) AS count FROM \"orders_1700000000000_ab12cd34\""
        );

        // Page numbers below 1 clamp to the first window.
        tables.push_result(Vec::new());
        tables.push_result(Vec::new());
        ingestor.page(owner, dataset.id, 0, 25).await.unwrap();
        assert!(tables.statements()[2].contains("OFFSET 0 LIMIT 25"));
    }

    #[tokio::test]
    async fn page_of_foreign_dataset_is_not_found() {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let ingestor = DatasetIngestor::new(catalog, tables);

        let error = ingestor
            .page(Uuid::new_v4(), Uuid::new_v4(), 1, 25)
            .await
            .unwrap_err();
        assert!(matches!(error, VaultError::DatasetNotFound { .. }));
    }

    #[test]
    fn physical_names_stay_unique_and_bounded() {
        let first = derive_table_name("Customer Data");
        let second = derive_table_name("Customer Data");
        assert_ne!(first, second);
        assert!(first.starts_with("customer_data_"));

        let long = derive_table_name(
            "An Extremely Long Dataset Name That Keeps Going Well Past Any Reasonable Length",
        );
        let base = long.rsplitn(3, '_').nth(2).unwrap();
        assert!(base.chars().count() <= 32);
    }
}
