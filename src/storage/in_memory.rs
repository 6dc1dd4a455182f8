//! In-memory implementations for testing and development

use crate::config::ResourceConfig;
use crate::core::auth::{BasicCredentials, IdentityProvider};
use crate::core::entity::{Account, Record};
use crate::core::error::StorageError;
use crate::core::query::{RowQuery, SortDirection};
use crate::core::store::{ResourceStore, RowStream};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory resource store
///
/// Rows are kept per table name, as in the database, so several resources
/// may read the same table. Uses RwLock for thread-safe access;
/// a read takes a snapshot, so the returned stream holds no lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Record>>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row to a table
    pub fn insert(&self, table: &str, record: Record) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        tables.entry(table.to_string()).or_default().push(record);
        Ok(())
    }

    /// Add several rows to a table
    pub fn extend(&self, table: &str, records: impl IntoIterator<Item = Record>) -> Result<()> {
        for record in records {
            self.insert(table, record)?;
        }
        Ok(())
    }

    fn snapshot(&self, resource: &ResourceConfig) -> Result<Vec<Record>, StorageError> {
        let tables = self.tables.read().map_err(|e| StorageError::QueryError {
            backend: "memory".to_string(),
            message: format!("Failed to acquire read lock: {}", e),
        })?;

        Ok(tables
            .get(&resource.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| !resource.soft_delete || row.get("deleted_at").is_null())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Compare two rows under the query's sort keys
fn compare_rows(query: &RowQuery, a: &Record, b: &Record) -> Ordering {
    for key in query.sort.keys() {
        let ordering = a.get(&key.field).sort_cmp(b.get(&key.field));
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn matches_filters(query: &RowQuery, row: &Record) -> bool {
    query
        .filters
        .iter()
        .all(|filter| row.get(&filter.field) == &filter.value)
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    fn stream_rows(&self, resource: &ResourceConfig, query: &RowQuery) -> RowStream {
        let mut rows = match self.snapshot(resource) {
            Ok(rows) => rows,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        rows.retain(|row| matches_filters(query, row));
        rows.sort_by(|a, b| compare_rows(query, a, b));

        let projected: Vec<Result<Record, StorageError>> =
            rows.iter().map(|row| Ok(row.project(resource))).collect();
        stream::iter(projected).boxed()
    }

    async fn get_row(
        &self,
        resource: &ResourceConfig,
        id: i64,
    ) -> Result<Option<Record>, StorageError> {
        Ok(self
            .snapshot(resource)?
            .into_iter()
            .find(|row| row.get(&resource.key).as_integer() == Some(id))
            .map(|row| row.project(resource)))
    }
}

/// In-memory identity provider
///
/// Mirrors the collection database's account check: the account name must
/// exist. A password is only compared when one was registered for the
/// account.
#[derive(Clone, Default)]
pub struct InMemoryIdentityProvider {
    accounts: Arc<RwLock<HashMap<String, (Account, Option<String>)>>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account accepted with any password
    pub fn with_account(self, account: Account) -> Result<Self> {
        self.add(account, None)?;
        Ok(self)
    }

    /// Register an account that must present `password`
    pub fn with_password(self, account: Account, password: &str) -> Result<Self> {
        self.add(account, Some(password.to_string()))?;
        Ok(self)
    }

    fn add(&self, account: Account, password: Option<String>) -> Result<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        accounts.insert(account.name.clone(), (account, password));
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn authenticate(&self, credentials: &BasicCredentials) -> Result<Option<Account>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(accounts
            .get(&credentials.username)
            .filter(|(_, password)| {
                password
                    .as_deref()
                    .is_none_or(|expected| expected == credentials.password)
            })
            .map(|(account, _)| account.clone()))
    }
}
