use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};
use tracing::error;

use crate::error::VaultError;
use crate::store::{Row, TableStore};

/// Executes rendered SQL over the simple-query protocol. Dynamic tables have
/// shapes unknown at compile time, so results come back as text and are
/// lifted into JSON rows keyed by column name.
pub struct PgTableStore {
    client: Client,
}

impl PgTableStore {
    pub async fn connect(database_url: &str) -> Result<Self, VaultError> {
        let config: Config = database_url.parse().map_err(|e| VaultError::ConfigError {
            message: format!("Invalid database URL: {}", e),
        })?;
        let (client, connection) = config.connect(NoTls).await?;

        // Drive the connection in the background; it ends when the client drops.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("table store connection error: {}", e);
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl TableStore for PgTableStore {
    async fn execute(&self, sql: &str) -> Result<u64, VaultError> {
        let messages = self.client.simple_query(sql).await?;

        let mut affected = 0;
        for message in messages {
            if let SimpleQueryMessage::CommandComplete(count) = message {
                affected = count;
            }
        }
        Ok(affected)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, VaultError> {
        let messages = self.client.simple_query(sql).await?;

        let mut rows = Vec::new();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    let mut record = Row::new();
                    for i in 0..row.len() {
                        let name = row.columns()[i].name().to_string();
                        let value = match row.get(i) {
                            Some(text) => Value::String(text.to_string()),
                            None => Value::Null,
                        };
                        record.insert(name, value);
                    }
                    rows.push(record);
                }
                SimpleQueryMessage::CommandComplete(_) => {}
                _ => {}
            }
        }
        Ok(rows)
    }
}
