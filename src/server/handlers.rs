//! HTTP handlers for resource reads
//!
//! All handlers are resource-agnostic: the resource they serve is carried in
//! the router state.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;

use super::host::ServerHost;
use crate::config::ResourceConfig;
use crate::core::auth::{AuthContext, AuthPolicy};
use crate::core::entity::Record;
use crate::core::error::{ApiError, ApiResult, EntityError, RequestError};
use crate::core::export::{CSV_CONTENT_TYPE, csv_stream};
use crate::core::query::RowQuery;
use crate::core::store::RowStream;

/// State shared by the routes of one resource
#[derive(Clone)]
pub struct ResourceState {
    pub host: Arc<ServerHost>,
    pub resource: Arc<ResourceConfig>,
    pub policy: AuthPolicy,
}

impl ResourceState {
    pub fn new(host: Arc<ServerHost>, resource: ResourceConfig) -> Self {
        let policy = resource.read_policy;
        Self {
            host,
            resource: Arc::new(resource),
            policy,
        }
    }
}

/// List rows as JSON
///
/// GET /{resource}/?order_by=-id,mint&mint=3
pub async fn list_rows(
    State(state): State<ResourceState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<Record>>> {
    let query = RowQuery::from_params(&state.resource, &params)?;

    let rows: Vec<Record> = state
        .host
        .store
        .stream_rows(&state.resource, &query)
        .try_collect()
        .await?;

    tracing::debug!(resource = %state.resource.name, sort = %query.sort, rows = rows.len(), "listing served");
    Ok(Json(rows))
}

/// Fetch one row by key
///
/// GET /{resource}/{id}
pub async fn get_row(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Record>> {
    let id: i64 = id.parse().map_err(|_| RequestError::InvalidPath {
        path: format!("/{}/{}", state.resource.name, id),
        message: "id must be an integer".to_string(),
    })?;

    let row = state.host.store.get_row(&state.resource, id).await?;
    row.map(Json).ok_or_else(|| {
        EntityError::NotFound {
            resource: state.resource.name.clone(),
            id,
        }
        .into()
    })
}

/// Stream the resource as CSV
///
/// GET /{resource}/upload/?order_by=-id,mint
///
/// The status line is held back until the first row (or the end of the
/// rows) is available, so a query that cannot be opened is reported as a
/// JSON error. Later failures abort the chunked body.
pub async fn export_rows(
    State(state): State<ResourceState>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    let query = RowQuery::from_params(&state.resource, &params)?;
    tracing::debug!(
        resource = %state.resource.name,
        sort = %query.sort,
        account = ?context.account_id(),
        "export started"
    );

    let mut rows = state.host.store.stream_rows(&state.resource, &query);
    let first = match rows.next().await {
        Some(Err(e)) => return Err(e.into()),
        first => first,
    };
    let rows: RowStream = stream::iter(first).chain(rows).boxed();

    let disposition = HeaderValue::from_str(&format!("filename={}", state.resource.export_filename()))
        .map_err(|e| ApiError::Internal(format!("invalid export filename: {}", e)))?;
    let body = Body::from_stream(csv_stream(state.resource.as_ref().clone(), rows));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(CSV_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
