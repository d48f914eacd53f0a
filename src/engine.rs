use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::{render_user_prompt, AiQueryResult, LlmClient, OpenAiClient, SYSTEM_PROMPT};
use crate::audit::{record_access, AccessAction};
use crate::catalog::{Cardinality, Dataset, DatasetRelation, ErGraph, Person};
use crate::config::VaultConfig;
use crate::database::PgCatalog;
use crate::error::VaultError;
use crate::guard::guard_generated_sql;
use crate::ident::sanitize_identifier;
use crate::identity::Caller;
use crate::ingest::{DatasetIngestor, ImportSpec};
use crate::masking::{apply_masking, merge_common_pii, policies_from_columns};
use crate::person::{self, PersonInput, PersonUpdate};
use crate::reader::{read_preview, TableFile};
use crate::store::{Catalog, Row, TableStore};
use crate::table_store::PgTableStore;

/// Masked page of dataset rows plus the table's total row count.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetPage {
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Declared link between two owned datasets.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RelationInput {
    pub from_dataset_id: Uuid,
    pub to_dataset_id: Uuid,
    pub from_column: String,
    pub to_column: String,
    #[serde(default)]
    pub cardinality: Option<Cardinality>,
}

/// Facade over the vault: file preview and import, paginated masked reads,
/// dataset relations, the natural-language query path and the person
/// registry. Callers arrive already authenticated; every operation scopes
/// itself to the caller's own records.
pub struct VaultEngine {
    catalog: Arc<dyn Catalog>,
    tables: Arc<dyn TableStore>,
    ingestor: DatasetIngestor,
    llm: Option<Arc<dyn LlmClient>>,
}

impl VaultEngine {
    /// Connects to PostgreSQL (running migrations) and, if a key is
    /// configured, the SQL generation backend.
    pub async fn connect(config: &VaultConfig) -> Result<Self, VaultError> {
        info!("Initializing data vault engine");

        let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::new(&config.database_url).await?);
        let tables: Arc<dyn TableStore> =
            Arc::new(PgTableStore::connect(&config.database_url).await?);
        let llm: Option<Arc<dyn LlmClient>> = match &config.openai_api_key {
            Some(key) => Some(Arc::new(OpenAiClient::new(
                key.clone(),
                config.openai_model.clone(),
            ))),
            None => {
                warn!("OPENAI_API_KEY is not set; natural-language queries are disabled");
                None
            }
        };

        info!("Data vault engine ready");
        Ok(Self::new(catalog, tables, llm))
    }

    pub fn new(
        catalog: Arc<dyn Catalog>,
        tables: Arc<dyn TableStore>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let ingestor = DatasetIngestor::new(Arc::clone(&catalog), Arc::clone(&tables));
        Self {
            catalog,
            tables,
            ingestor,
            llm,
        }
    }

    /// Uncommitted look at an upload: the header list and at most the first
    /// fifty rows, so the caller can confirm or adjust the column spec.
    pub async fn preview(&self, caller: &Caller, path: &Path) -> Result<TableFile, VaultError> {
        let table = read_preview(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload");
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::Preview,
            &format!("dataset:{}", file_name),
            Some(format!("{} rows previewed", table.rows.len())),
        )
        .await;
        Ok(table)
    }

    pub async fn import_dataset(
        &self,
        caller: &Caller,
        spec: &ImportSpec,
    ) -> Result<Dataset, VaultError> {
        let dataset = self.ingestor.import(caller.user_id, spec).await?;
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::Import,
            &format!("dataset:{}", dataset.id),
            Some(dataset.name.clone()),
        )
        .await;
        Ok(dataset)
    }

    pub async fn list_datasets(&self, caller: &Caller) -> Result<Vec<Dataset>, VaultError> {
        let datasets = self.catalog.list_datasets(caller.user_id).await?;
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::List,
            "dataset:*",
            None,
        )
        .await;
        Ok(datasets)
    }

    /// Owner-scoped page read. Every row passes through the masking engine
    /// before leaving; elevated roles see clear values.
    pub async fn dataset_page(
        &self,
        caller: &Caller,
        dataset_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<DatasetPage, VaultError> {
        let table_page = self
            .ingestor
            .page(caller.user_id, dataset_id, page, page_size)
            .await?;
        let policies = policies_from_columns(&table_page.columns);
        let rows = table_page
            .rows
            .into_iter()
            .map(|row| apply_masking(row, &policies, caller.role))
            .collect();

        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::View,
            &format!("dataset:{}", dataset_id),
            Some(format!("page {}", page)),
        )
        .await;

        Ok(DatasetPage {
            rows,
            total: table_page.total,
        })
    }

    /// Declares a descriptive link between two owned datasets. Column names
    /// are sanitized the same way physical identifiers are, so generated
    /// join hints stay usable.
    pub async fn create_relation(
        &self,
        caller: &Caller,
        input: &RelationInput,
    ) -> Result<DatasetRelation, VaultError> {
        if self
            .catalog
            .dataset_for_owner(input.from_dataset_id, caller.user_id)
            .await?
            .is_none()
        {
            return Err(VaultError::DatasetNotFound {
                dataset_id: input.from_dataset_id,
            });
        }
        if self
            .catalog
            .dataset_for_owner(input.to_dataset_id, caller.user_id)
            .await?
            .is_none()
        {
            return Err(VaultError::DatasetNotFound {
                dataset_id: input.to_dataset_id,
            });
        }

        let relation = DatasetRelation {
            id: Uuid::new_v4(),
            from_dataset_id: input.from_dataset_id,
            to_dataset_id: input.to_dataset_id,
            from_column: sanitize_identifier(&input.from_column),
            to_column: sanitize_identifier(&input.to_column),
            cardinality: input.cardinality.unwrap_or(Cardinality::ManyToOne),
            created_at: Utc::now(),
        };
        self.catalog.create_relation(&relation).await?;

        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::Relate,
            &format!("dataset:{}", input.from_dataset_id),
            Some(format!("-> dataset:{}", input.to_dataset_id)),
        )
        .await;
        Ok(relation)
    }

    /// All of the caller's datasets plus the relations touching them.
    pub async fn er_graph(&self, caller: &Caller) -> Result<ErGraph, VaultError> {
        let datasets = self.catalog.list_datasets(caller.user_id).await?;
        let relations = self.catalog.relations_for_owner(caller.user_id).await?;
        Ok(ErGraph {
            datasets,
            relations,
        })
    }

    /// Natural-language query path: render the caller's schema context,
    /// generate SQL, pass it through the guard, execute, then mask.
    pub async fn ai_query(
        &self,
        caller: &Caller,
        question: &str,
    ) -> Result<AiQueryResult, VaultError> {
        if question.trim().chars().count() < 3 {
            return Err(VaultError::InvalidInput {
                message: "question must have at least 3 characters".to_string(),
            });
        }
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| VaultError::GenerationFailed {
                message: "OPENAI_API_KEY is not configured".to_string(),
            })?;

        let datasets = self.catalog.list_datasets(caller.user_id).await?;
        let mut columns_by_dataset = HashMap::new();
        for dataset in &datasets {
            columns_by_dataset.insert(dataset.id, self.catalog.columns_of(dataset.id).await?);
        }
        let relations = self.catalog.relations_for_owner(caller.user_id).await?;

        let prompt = render_user_prompt(question, &datasets, &columns_by_dataset, &relations);
        let raw = llm.complete(SYSTEM_PROMPT, &prompt).await?;
        let sql = guard_generated_sql(&raw)?;
        info!("running generated query for {}: {}", caller.user_id, sql);

        let raw_rows = self.tables.query(&sql).await?;
        let rows = self.mask_ad_hoc_rows(caller, raw_rows).await?;
        let count = rows.len();

        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::AiQuery,
            "dataset:*",
            Some(question.to_string()),
        )
        .await;

        Ok(AiQueryResult { sql, rows, count })
    }

    /// Generated queries can name any column of any owned dataset, so the
    /// policy map is the union of the caller's sensitive columns and the
    /// well-known PII field names.
    async fn mask_ad_hoc_rows(
        &self,
        caller: &Caller,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>, VaultError> {
        if caller.role.sees_clear_values() {
            return Ok(rows);
        }
        let sensitive = self
            .catalog
            .sensitive_columns_for_owner(caller.user_id)
            .await?;
        let policies = merge_common_pii(policies_from_columns(&sensitive));
        Ok(rows
            .into_iter()
            .map(|row| apply_masking(row, &policies, caller.role))
            .collect())
    }

    pub async fn create_person(
        &self,
        caller: &Caller,
        input: PersonInput,
    ) -> Result<Person, VaultError> {
        person::validate_person_input(&input)?;
        let record = person::new_person(caller.user_id, input);
        self.catalog.create_person(&record).await?;
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::Create,
            &format!("person:{}", record.id),
            None,
        )
        .await;
        Ok(record)
    }

    /// Active (non-forgotten) people, masked per the caller's role.
    pub async fn list_people(&self, caller: &Caller) -> Result<Vec<Row>, VaultError> {
        let people = self.catalog.list_people(caller.user_id).await?;
        people
            .into_iter()
            .map(|record| person::masked_person(record, caller.role))
            .collect()
    }

    pub async fn get_person(&self, caller: &Caller, person_id: Uuid) -> Result<Row, VaultError> {
        let record = self
            .catalog
            .person_for_owner(person_id, caller.user_id)
            .await?
            .ok_or(VaultError::PersonNotFound { person_id })?;
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::View,
            &format!("person:{}", person_id),
            None,
        )
        .await;
        person::masked_person(record, caller.role)
    }

    pub async fn update_person(
        &self,
        caller: &Caller,
        person_id: Uuid,
        update: PersonUpdate,
    ) -> Result<Person, VaultError> {
        person::validate_person_update(&update)?;
        let mut record = self
            .catalog
            .person_for_owner(person_id, caller.user_id)
            .await?
            .ok_or(VaultError::PersonNotFound { person_id })?;
        person::apply_update(&mut record, update);
        self.catalog.update_person(&record).await?;
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::Update,
            &format!("person:{}", person_id),
            None,
        )
        .await;
        Ok(record)
    }

    /// Right-to-be-forgotten: anonymize identity fields, clear contact and
    /// free-form data and soft-delete. The record stays addressable so the
    /// audit trail keeps pointing at something.
    pub async fn forget_person(&self, caller: &Caller, person_id: Uuid) -> Result<(), VaultError> {
        let mut record = self
            .catalog
            .person_for_owner(person_id, caller.user_id)
            .await?
            .ok_or(VaultError::PersonNotFound { person_id })?;
        person::forget(&mut record);
        self.catalog.update_person(&record).await?;
        record_access(
            self.catalog.as_ref(),
            caller.user_id,
            AccessAction::Forget,
            &format!("person:{}", person_id),
            None,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedLlm;
    use crate::catalog::{DatasetColumn, PersonKind};
    use crate::column::{ColumnSpec, ColumnType};
    use crate::identity::Role;
    use crate::store::stubs::{StubCatalog, StubTableStore};
    use serde_json::{json, Value};
    use std::io::Write;

    fn engine_with(
        llm: Option<Arc<dyn LlmClient>>,
    ) -> (Arc<StubCatalog>, Arc<StubTableStore>, VaultEngine) {
        let catalog = Arc::new(StubCatalog::default());
        let tables = Arc::new(StubTableStore::default());
        let engine = VaultEngine::new(catalog.clone(), tables.clone(), llm);
        (catalog, tables, engine)
    }

    fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn column(name: &str, data_type: ColumnType, is_sensitive: bool) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            data_type,
            is_nullable: true,
            is_unique: false,
            is_sensitive,
            mask_pattern: None,
        }
    }

    fn text_row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect()
    }

    fn person_input() -> PersonInput {
        PersonInput {
            kind: PersonKind::Natural,
            name: "Alice Doe".to_string(),
            document: "123.456.789-01".to_string(),
            email: Some("alice@example.com".to_string()),
            phone: None,
            address: None,
            custom: None,
        }
    }

    async fn seed_dataset(
        catalog: &StubCatalog,
        owner: Uuid,
        name: &str,
        table_name: &str,
        sensitive_column: &str,
    ) -> Dataset {
        let dataset = Dataset {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: name.to_string(),
            original_file_name: format!("{name}.csv"),
            table_name: table_name.to_string(),
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
                name: sensitive_column.to_string(),
                data_type: ColumnType::Text,
                is_nullable: true,
                is_unique: false,
                is_sensitive: true,
                mask_pattern: None,
                ordinal: 1,
            },
        ];
        catalog.create_dataset(&dataset, &columns).await.unwrap();
        dataset
    }

    #[tokio::test]
    async fn preview_reads_the_head_of_the_file_and_logs() {
        let (catalog, _tables, engine) = engine_with(None);
        let caller = Caller::new(Uuid::new_v4(), Role::Analyst);

        let (_dir, path) = write_csv("id,name\n1,Alice\n2,Bob\n");
        let table = engine.preview(&caller, &path).await.unwrap();

        assert_eq!(table.columns, vec!["id", "name"]);
        assert_eq!(table.rows.len(), 2);

        let state = catalog.state.lock().unwrap();
        assert_eq!(state.accesses[0].action, "PREVIEW");
        assert_eq!(state.accesses[0].resource, "dataset:upload.csv");
    }

    #[tokio::test]
    async fn dataset_page_masks_for_standard_roles_only() {
        let (catalog, tables, engine) = engine_with(None);
        let caller = Caller::new(Uuid::new_v4(), Role::Analyst);

        let (_dir, path) = write_csv("id,email\n1,alice@example.com\n");
        let spec = ImportSpec {
            name: "Customers".to_string(),
            primary_key: "id".to_string(),
            columns: vec![
                column("id", ColumnType::Number, false),
                column("email", ColumnType::Text, true),
            ],
            file_path: path.clone(),
            original_file_name: "customers.csv".to_string(),
        };
        let dataset = engine.import_dataset(&caller, &spec).await.unwrap();

        tables.push_result(vec![text_row(&[("id", "1"), ("email", "alice@example.com")])]);
        tables.push_result(vec![text_row(&[("count", "1")])]);
        let page = engine.dataset_page(&caller, dataset.id, 1, 25).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0]["id"], json!(1));
        assert_eq!(page.rows[0]["email"], json!("*************.com"));

        // An elevated role reads the same page clear.
        let manager = Caller::new(caller.user_id, Role::Manager);
        tables.push_result(vec![text_row(&[("id", "1"), ("email", "alice@example.com")])]);
        tables.push_result(vec![text_row(&[("count", "1")])]);
        let page = engine.dataset_page(&manager, dataset.id, 1, 25).await.unwrap();
        assert_eq!(page.rows[0]["email"], json!("alice@example.com"));

        let actions: Vec<String> = catalog
            .state
            .lock()
            .unwrap()
            .accesses
            .iter()
            .map(|entry| entry.action.clone())
            .collect();
        assert!(actions.contains(&"IMPORT".to_string()));
        assert!(actions.contains(&"VIEW".to_string()));
    }

    #[tokio::test]
    async fn relations_require_ownership_and_sanitize_columns() {
        let (catalog, _tables, engine) = engine_with(None);
        let caller = Caller::new(Uuid::new_v4(), Role::Manager);

        let customers = seed_dataset(
            &catalog,
            caller.user_id,
            "Customers",
            "customers_1_aa",
            "email",
        )
        .await;
        let orders = seed_dataset(&catalog, caller.user_id, "Orders", "orders_1_bb", "email").await;

        let relation = engine
            .create_relation(
                &caller,
                &RelationInput {
                    from_dataset_id: orders.id,
                    to_dataset_id: customers.id,
                    from_column: "Customer ID".to_string(),
                    to_column: "id".to_string(),
                    cardinality: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(relation.from_column, "customer_id");
        assert_eq!(relation.to_column, "id");
        assert_eq!(relation.cardinality, Cardinality::ManyToOne);

        let graph = engine.er_graph(&caller).await.unwrap();
        assert_eq!(graph.datasets.len(), 2);
        assert_eq!(graph.relations.len(), 1);

        // A dataset the caller does not own cannot be linked.
        let error = engine
            .create_relation(
                &caller,
                &RelationInput {
                    from_dataset_id: orders.id,
                    to_dataset_id: Uuid::new_v4(),
                    from_column: "x".to_string(),
                    to_column: "y".to_string(),
                    cardinality: Some(Cardinality::OneToMany),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, VaultError::DatasetNotFound { .. }));
    }

    #[tokio::test]
    async fn ai_query_guards_generated_sql_and_masks_results() {
        let llm = Arc::new(ScriptedLlm::new(
            "```sql\nSELECT email FROM \"customers_1700000000000_ab12cd34\"\n```",
        ));
        let (catalog, tables, engine) = engine_with(Some(llm.clone()));
        let caller = Caller::new(Uuid::new_v4(), Role::Analyst);

        seed_dataset(
            &catalog,
            caller.user_id,
            "Customers",
            "customers_1700000000000_ab12cd34",
            "email",
        )
        .await;
        tables.push_result(vec![text_row(&[("email", "alice@example.com")])]);

        let result = engine
            .ai_query(&caller, "list all customer emails")
            .await
            .unwrap();

        assert_eq!(
            result.sql,
            "SELECT email FROM \"customers_1700000000000_ab12cd34\" LIMIT 100"
        );
        assert_eq!(result.count, 1);
        assert_eq!(result.rows[0]["email"], json!("*************.com"));

        // The schema context named the physical table and flagged the column.
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("customers_1700000000000_ab12cd34"));
        assert!(prompts[0].1.contains("email (sensitive)"));

        let state = catalog.state.lock().unwrap();
        assert_eq!(state.accesses.len(), 1);
        assert_eq!(state.accesses[0].action, "AI_QUERY");
    }

    #[tokio::test]
    async fn ai_query_rejects_mutating_sql_before_execution() {
        let llm = Arc::new(ScriptedLlm::new("DROP TABLE customers"));
        let (_catalog, tables, engine) = engine_with(Some(llm));
        let caller = Caller::new(Uuid::new_v4(), Role::Admin);

        let error = engine
            .ai_query(&caller, "remove everything")
            .await
            .unwrap_err();

        assert!(matches!(error, VaultError::QueryRejected { .. }));
        assert!(tables.statements().is_empty());
    }

    #[tokio::test]
    async fn ai_query_fails_closed_without_a_configured_backend() {
        let (_catalog, _tables, engine) = engine_with(None);
        let caller = Caller::new(Uuid::new_v4(), Role::Admin);

        let error = engine.ai_query(&caller, "who spent most").await.unwrap_err();
        assert!(matches!(error, VaultError::GenerationFailed { .. }));

        let error = engine.ai_query(&caller, "a").await.unwrap_err();
        assert!(matches!(error, VaultError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn admin_ai_query_results_stay_clear() {
        let llm = Arc::new(ScriptedLlm::new("SELECT email FROM t LIMIT 5"));
        let (catalog, tables, engine) = engine_with(Some(llm));
        let caller = Caller::new(Uuid::new_v4(), Role::Admin);

        seed_dataset(&catalog, caller.user_id, "Customers", "t", "email").await;
        tables.push_result(vec![text_row(&[("email", "alice@example.com")])]);

        let result = engine.ai_query(&caller, "emails please").await.unwrap();
        assert_eq!(result.rows[0]["email"], json!("alice@example.com"));
    }

    #[tokio::test]
    async fn person_lifecycle_create_view_update_forget() {
        let (catalog, _tables, engine) = engine_with(None);
        let caller = Caller::new(Uuid::new_v4(), Role::Analyst);

        let created = engine.create_person(&caller, person_input()).await.unwrap();

        let viewed = engine.get_person(&caller, created.id).await.unwrap();
        assert_eq!(viewed["document"], json!("123*456*789*01"));
        assert_eq!(viewed["email"], json!("*************.com"));

        let updated = engine
            .update_person(
                &caller,
                created.id,
                PersonUpdate {
                    phone: Some("+551100000000".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("+551100000000"));
        assert_eq!(updated.name, "Alice Doe");

        engine.forget_person(&caller, created.id).await.unwrap();
        assert!(engine.list_people(&caller).await.unwrap().is_empty());

        // Forgotten records stay addressable, anonymized.
        let after = engine.get_person(&caller, created.id).await.unwrap();
        assert_eq!(after["name"], json!("REMOVED"));
        assert_eq!(after["email"], Value::Null);

        // A different caller sees nothing at all.
        let stranger = Caller::new(Uuid::new_v4(), Role::Admin);
        assert!(matches!(
            engine.get_person(&stranger, created.id).await,
            Err(VaultError::PersonNotFound { .. })
        ));

        let actions: Vec<String> = catalog
            .state
            .lock()
            .unwrap()
            .accesses
            .iter()
            .map(|entry| entry.action.clone())
            .collect();
        assert_eq!(actions, ["CREATE", "VIEW", "UPDATE", "FORGET", "VIEW"]);
    }
}
