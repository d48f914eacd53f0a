use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::catalog::{Dataset, DatasetColumn, DatasetRelation};
use crate::error::VaultError;
use crate::store::Row;

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const SYSTEM_PROMPT: &str = "You convert natural language to SQL for PostgreSQL. \
    Use ONLY the following tables (with exact names) and join columns when relevant. \
    Return ONLY the SQL, no explanations. Use LIMIT 100 if none specified.";

/// Completion provider behind the natural-language query path. Kept as a
/// trait so tests can script replies without a network.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, VaultError>;
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, VaultError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .http
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatCompletion>()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(VaultError::GenerationFailed {
                message: "model returned no SQL".to_string(),
            });
        }
        Ok(content)
    }
}

/// Serialized schema description sent with each question: table and column
/// names with sensitivity markers, primary keys, and relations rendered as
/// join hints over physical table names.
pub fn render_user_prompt(
    question: &str,
    datasets: &[Dataset],
    columns_by_dataset: &HashMap<Uuid, Vec<DatasetColumn>>,
    relations: &[DatasetRelation],
) -> String {
    let table_names: HashMap<Uuid, &str> = datasets
        .iter()
        .map(|d| (d.id, d.table_name.as_str()))
        .collect();

    let tables_desc: Vec<String> = datasets
        .iter()
        .map(|dataset| {
            let columns = columns_by_dataset
                .get(&dataset.id)
                .map(|cols| {
                    cols.iter()
                        .map(|c| {
                            if c.is_sensitive {
                                format!("{} (sensitive)", c.name)
                            } else {
                                c.name.clone()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();

            format!(
                "Table {} (aka {}) columns: {} primaryKey: {}",
                dataset.table_name, dataset.name, columns, dataset.primary_key
            )
        })
        .collect();

    let relations_desc: Vec<String> = relations
        .iter()
        .map(|relation| {
            let from = table_names
                .get(&relation.from_dataset_id)
                .copied()
                .unwrap_or("unknown");
            let to = table_names
                .get(&relation.to_dataset_id)
                .copied()
                .unwrap_or("unknown");
            format!(
                "Relation: {}.{} -> {}.{} ({})",
                from, relation.from_column, to, relation.to_column, relation.cardinality
            )
        })
        .collect();

    let tables_block = if tables_desc.is_empty() {
        "(no tables)".to_string()
    } else {
        tables_desc.join("\n")
    };
    let relations_block = if relations_desc.is_empty() {
        "(no relations)".to_string()
    } else {
        relations_desc.join("\n")
    };

    format!(
        "Question: {}\n\nTables:\n\n{}\n\nRelations:\n\n{}\n\nRules: Use only SELECT and only these tables. Prefer joins using the relations. PostgreSQL dialect.",
        question, tables_block, relations_block
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct AiQueryResult {
    pub sql: String,
    pub rows: Vec<Row>,
    pub count: usize,
}
