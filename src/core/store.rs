//! Read-only storage abstraction for resource rows

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::ResourceConfig;
use crate::core::entity::Record;
use crate::core::error::StorageError;
use crate::core::query::RowQuery;

/// Lazy, ordered sequence of rows for one read
///
/// Dropping the stream cancels the read: backends stop fetching and release
/// their connection.
pub type RowStream = BoxStream<'static, Result<Record, StorageError>>;

/// Trait for backends serving resource rows
///
/// Implementations receive a query that has already been validated against
/// the resource configuration and must honor its sort order (tie-break
/// included) and filters.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Open a row stream for `query`
    ///
    /// Rows carry the resource's fields in canonical order. A failure while
    /// reading is yielded as the last item of the stream.
    fn stream_rows(&self, resource: &ResourceConfig, query: &RowQuery) -> RowStream;

    /// Fetch a single row by its key
    async fn get_row(
        &self,
        resource: &ResourceConfig,
        id: i64,
    ) -> Result<Option<Record>, StorageError>;
}
