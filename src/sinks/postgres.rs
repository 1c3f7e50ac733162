use anyhow::{Context, Result};
use async_trait::async_trait;
use pg_escape::quote_identifier;
use serde_json::Value;
use tokio_postgres::{NoTls, types::ToSql};
use tracing::error;

use super::StagingSink;
use crate::config::SinkConfig;

pub const STAGING_SCHEMA: &str = "raw";
pub const STAGING_TABLE: &str = "events_jsonl";

/// Staging sink backed by a single Postgres connection.
///
/// The connection lives for the whole run and closes when the sink drops,
/// whichever way the run ends. No pooling, no retries: if the connection
/// cannot be opened, the run never starts.
#[derive(Debug)]
pub struct PostgresSink {
    client: tokio_postgres::Client,
    in_transaction: bool,
}

impl PostgresSink {
    pub async fn connect(config: &SinkConfig) -> Result<Self> {
        let (client, connection) = config
            .pg_config()
            .connect(NoTls)
            .await
            .with_context(|| format!("Failed to connect to {}:{}", config.host, config.port))?;

        // The task ends on its own once the client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Postgres connection error: {e}");
            }
        });

        Ok(Self {
            client,
            in_transaction: false,
        })
    }

    async fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client
                .batch_execute("BEGIN")
                .await
                .context("Failed to begin transaction")?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

#[async_trait]
impl StagingSink for PostgresSink {
    async fn prepare(&mut self) -> Result<()> {
        let ddl = format!(
            "BEGIN;\n\
             CREATE SCHEMA IF NOT EXISTS {schema};\n\
             DROP TABLE IF EXISTS {table};\n\
             CREATE TABLE {table} (line jsonb);\n\
             COMMIT;",
            schema = quote_identifier(STAGING_SCHEMA),
            table = staging_table(),
        );

        if let Err(e) = self.client.batch_execute(&ddl).await {
            let _ = self.client.batch_execute("ROLLBACK").await;
            return Err(e).with_context(|| format!("Failed to prepare {}", staging_table()));
        }
        Ok(())
    }

    async fn insert(&mut self, documents: &[Value]) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        self.begin_if_needed().await?;

        let statement = insert_statement(documents.len());
        let params: Vec<&(dyn ToSql + Sync)> = documents
            .iter()
            .map(|document| document as &(dyn ToSql + Sync))
            .collect();

        let inserted = self
            .client
            .execute(statement.as_str(), &params)
            .await
            .with_context(|| format!("Failed to insert {} rows", documents.len()))?;
        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            // Clear the flag first: a failed COMMIT leaves no transaction
            // open on the server.
            self.in_transaction = false;
            self.client
                .batch_execute("COMMIT")
                .await
                .context("Failed to commit transaction")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client
                .batch_execute("ROLLBACK")
                .await
                .context("Failed to roll back transaction")?;
        }
        Ok(())
    }
}

/// Schema-qualified staging table name with both identifiers quoted.
fn staging_table() -> String {
    format!(
        "{}.{}",
        quote_identifier(STAGING_SCHEMA),
        quote_identifier(STAGING_TABLE)
    )
}

/// Multi-row insert with one bind parameter per document. Record content
/// never lands in the statement text.
fn insert_statement(rows: usize) -> String {
    let placeholders: Vec<String> = (1..=rows).map(|i| format!("(${i})")).collect();
    format!(
        "INSERT INTO {} (line) VALUES {}",
        staging_table(),
        placeholders.join(", ")
    )
}
