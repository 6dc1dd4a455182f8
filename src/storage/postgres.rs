//! PostgreSQL storage backend using sqlx.
//!
//! Provides [`PostgresStore`] and [`PostgresIdentityProvider`] backed by a
//! `sqlx::PgPool`.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag (enabled by
//! default).
//!
//! # Streaming
//!
//! Each export runs its query in a spawned task that forwards decoded rows
//! through a bounded channel. The HTTP writer pulls from the receiving end;
//! when the channel is full the query task waits, and when the receiver is
//! dropped (client gone) the task stops and returns its connection.

use crate::config::{AppConfig, FieldDescriptor, ResourceConfig};
use crate::core::auth::{BasicCredentials, IdentityProvider};
use crate::core::entity::{Account, Record};
use crate::core::error::StorageError;
use crate::core::field::{FieldKind, FieldValue};
use crate::core::query::{Filter, RowQuery};
use crate::core::store::{ResourceStore, RowStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tokio::sync::mpsc;

const BACKEND: &str = "PostgreSQL";

/// Open the connection pool eagerly
///
/// Connecting at startup turns a wrong DSN or unreachable server into a
/// startup failure. Every connection gets the configured statement timeout.
pub async fn connect(config: &AppConfig) -> Result<PgPool> {
    let timeout_ms = config.statement_timeout_secs * 1000;

    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(config.statement_timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let statement = format!("SET statement_timeout = {}", timeout_ms);
                sqlx::query(&statement).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the collection database")
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column expression casting to the type the decoder expects
fn select_expr(field: &FieldDescriptor) -> String {
    let column = quote_ident(&field.name);
    let cast = match field.kind {
        FieldKind::Integer => "BIGINT",
        FieldKind::Text => "TEXT",
        FieldKind::Boolean => "BOOLEAN",
        FieldKind::Timestamp => "TIMESTAMPTZ",
    };
    format!("CAST({} AS {}) AS {}", column, cast, column)
}

fn push_bind_value(builder: &mut QueryBuilder<'static, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Integer(i) => builder.push_bind(*i),
        FieldValue::Text(s) => builder.push_bind(s.clone()),
        FieldValue::Boolean(b) => builder.push_bind(*b),
        FieldValue::Timestamp(ts) => builder.push_bind(*ts),
        FieldValue::Null => builder.push_bind(None::<String>),
    };
}

/// Build `SELECT ... FROM table WHERE ... ORDER BY ...` for a validated query
///
/// Identifiers come from the validated resource configuration; filter values
/// are always bound parameters.
fn select_query(resource: &ResourceConfig, query: &RowQuery) -> QueryBuilder<'static, Postgres> {
    let columns: Vec<String> = resource.fields.iter().map(select_expr).collect();
    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE TRUE",
        columns.join(", "),
        quote_ident(&resource.table)
    ));

    if resource.soft_delete {
        builder.push(" AND \"deleted_at\" IS NULL");
    }

    for filter in &query.filters {
        let kind = resource.field(&filter.field).map(|f| f.kind);
        let column = quote_ident(&filter.field);
        match kind {
            // Text filters compare the textual form so enum columns work too
            Some(FieldKind::Text) => builder.push(format!(" AND CAST({} AS TEXT) = ", column)),
            _ => builder.push(format!(" AND {} = ", column)),
        };
        push_bind_value(&mut builder, &filter.value);
    }

    let order: Vec<String> = query
        .sort
        .keys()
        .iter()
        .map(|key| format!("{} {}", quote_ident(&key.field), key.direction.as_sql()))
        .collect();
    if !order.is_empty() {
        builder.push(format!(" ORDER BY {}", order.join(", ")));
    }

    builder
}

fn decode_row(resource: &ResourceConfig, row: &PgRow) -> Result<Record, StorageError> {
    let mut record = Record::new();
    for (index, field) in resource.fields.iter().enumerate() {
        let decoded: Result<FieldValue, sqlx::Error> = match field.kind {
            FieldKind::Integer => row.try_get::<Option<i64>, _>(index).map(FieldValue::from),
            FieldKind::Text => row.try_get::<Option<String>, _>(index).map(FieldValue::from),
            FieldKind::Boolean => row.try_get::<Option<bool>, _>(index).map(FieldValue::from),
            FieldKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(index)
                .map(FieldValue::from),
        };
        let value = decoded.map_err(|e| StorageError::DecodeError {
            field: field.name.clone(),
            message: e.to_string(),
        })?;
        record.insert(&field.name, value);
    }
    Ok(record)
}

fn query_error(err: sqlx::Error) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        message: err.to_string(),
    }
}

/// Message passed from the query task to the HTTP side
#[derive(Debug)]
enum Frame {
    Row(Record),
    End,
}

/// Turn the receiving end of the query task's channel into a row stream
///
/// The stream stops after `End` or after the first error. A channel closed
/// without `End` means the task died mid-read and yields `Interrupted`.
/// Dropping the stream closes the channel, which stops the task at its next
/// send.
fn receive_rows(rx: mpsc::Receiver<Result<Frame, StorageError>>) -> RowStream {
    stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Some(Ok(Frame::Row(record))) => Some((Ok(record), Some(rx))),
            Some(Ok(Frame::End)) => None,
            Some(Err(e)) => Some((Err(e), None)),
            None => Some((
                Err(StorageError::Interrupted {
                    message: "query task ended without completing".to_string(),
                }),
                None,
            )),
        }
    })
    .boxed()
}

/// Resource store backed by PostgreSQL
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
    buffer: usize,
}

impl PostgresStore {
    /// Create a store; `buffer` bounds the rows prefetched per export
    pub fn new(pool: PgPool, buffer: usize) -> Self {
        Self {
            pool,
            buffer: buffer.max(1),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ResourceStore for PostgresStore {
    fn stream_rows(&self, resource: &ResourceConfig, query: &RowQuery) -> RowStream {
        let (tx, rx) = mpsc::channel::<Result<Frame, StorageError>>(self.buffer);
        let pool = self.pool.clone();
        let resource = resource.clone();
        let query = query.clone();

        tokio::spawn(async move {
            let mut builder = select_query(&resource, &query);
            let mut rows = builder.build().fetch(&pool);
            let mut count: u64 = 0;

            while let Some(row) = rows.next().await {
                let frame = row
                    .map_err(query_error)
                    .and_then(|row| decode_row(&resource, &row))
                    .map(Frame::Row);
                let failed = frame.is_err();
                if let Err(e) = &frame {
                    tracing::error!(resource = %resource.name, error = %e, "row fetch failed");
                }
                if tx.send(frame).await.is_err() {
                    tracing::debug!(resource = %resource.name, rows = count, "reader dropped, export cancelled");
                    return;
                }
                if failed {
                    return;
                }
                count += 1;
            }

            tracing::debug!(resource = %resource.name, rows = count, "query finished");
            let _ = tx.send(Ok(Frame::End)).await;
        });

        receive_rows(rx)
    }

    async fn get_row(
        &self,
        resource: &ResourceConfig,
        id: i64,
    ) -> Result<Option<Record>, StorageError> {
        let mut query = RowQuery::natural(resource);
        let key_kind = resource
            .field(&resource.key)
            .map(|f| f.kind)
            .unwrap_or(FieldKind::Integer);
        query.filters.push(Filter {
            field: resource.key.clone(),
            value: match key_kind {
                FieldKind::Text => FieldValue::Text(id.to_string()),
                _ => FieldValue::Integer(id),
            },
        });

        let mut builder = select_query(resource, &query);
        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.map(|row| decode_row(resource, &row)).transpose()
    }
}

/// Identity provider reading the `account` table
///
/// An account is accepted when a live row with the given name exists.
/// Password checks belong to the credential store in front of the database.
#[derive(Clone, Debug)]
pub struct PostgresIdentityProvider {
    pool: PgPool,
}

impl PostgresIdentityProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PostgresIdentityProvider {
    async fn authenticate(&self, credentials: &BasicCredentials) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, (i64, String, bool)>(
            "SELECT CAST(id AS BIGINT), name, is_admin FROM account \
             WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(&credentials.username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up account")?;

        Ok(row.map(|(id, name, is_admin)| Account { id, name, is_admin }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourcesConfig;
    use std::collections::HashMap;

    fn money() -> ResourceConfig {
        ResourcesConfig::default_config()
            .resource("money")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_select_sql_orders_and_filters() {
        let params: HashMap<String, String> = [
            ("order_by".to_string(), "-id,mint".to_string()),
            ("description".to_string(), "Thaler".to_string()),
        ]
        .into_iter()
        .collect();
        let query = RowQuery::from_params(&money(), &params).unwrap();
        let builder = select_query(&money(), &query);
        let sql = builder.sql();

        assert!(sql.starts_with("SELECT CAST(\"id\" AS BIGINT) AS \"id\", CAST(\"description\" AS TEXT)"));
        assert!(sql.contains("FROM \"money\" WHERE TRUE AND \"deleted_at\" IS NULL"));
        assert!(sql.contains("AND CAST(\"description\" AS TEXT) = $1"));
        assert!(sql.ends_with("ORDER BY \"id\" DESC, \"mint\" ASC"));
    }

    #[test]
    fn test_natural_order_sql() {
        let builder = select_query(&money(), &RowQuery::natural(&money()));
        assert!(builder.sql().ends_with("ORDER BY \"id\" ASC"));
    }

    fn row(id: i64) -> Record {
        Record::new().with("id", id)
    }

    #[tokio::test]
    async fn test_receive_rows_until_end() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Frame::Row(row(1)))).await.unwrap();
        tx.send(Ok(Frame::Row(row(2)))).await.unwrap();
        tx.send(Ok(Frame::End)).await.unwrap();
        drop(tx);

        let rows: Vec<_> = receive_rows(rx).collect().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].as_ref().unwrap(), &row(2));
    }

    #[tokio::test]
    async fn test_closed_channel_without_end_is_interrupted() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Frame::Row(row(1)))).await.unwrap();
        drop(tx);

        let rows: Vec<_> = receive_rows(rx).collect().await;
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        assert!(matches!(rows[1], Err(StorageError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn test_row_error_ends_the_stream() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Frame::Row(row(1)))).await.unwrap();
        tx.send(Err(StorageError::DecodeError {
            field: "mint".to_string(),
            message: "bad".to_string(),
        }))
        .await
        .unwrap();
        tx.send(Ok(Frame::Row(row(3)))).await.unwrap();
        tx.send(Ok(Frame::End)).await.unwrap();

        let rows: Vec<_> = receive_rows(rx).collect().await;
        assert_eq!(rows.len(), 2);
        assert!(matches!(rows[1], Err(StorageError::DecodeError { .. })));
    }

    #[tokio::test]
    async fn test_dropping_the_stream_stops_the_sender() {
        let (tx, rx) = mpsc::channel(1);
        let mut rows = receive_rows(rx);
        tx.send(Ok(Frame::Row(row(1)))).await.unwrap();
        assert!(rows.next().await.unwrap().is_ok());

        drop(rows);
        assert!(tx.send(Ok(Frame::Row(row(2)))).await.is_err());
        assert!(tx.is_closed());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
