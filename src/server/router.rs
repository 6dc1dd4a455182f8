//! Router builder utilities for resource routes

use super::handlers::{ResourceState, export_rows, get_row, list_rows};
use super::host::ServerHost;
use super::middleware::require_read_access;
use axum::{Router, middleware, routing::get};
use std::sync::Arc;

/// Build the read routes of every configured resource
///
/// For each resource:
/// - GET /{resource} and /{resource}/ - JSON listing
/// - GET /{resource}/{id} - single row
/// - GET /{resource}/upload/ - CSV export (also without trailing slash)
///
/// Every route sits behind the Basic authentication gate.
pub fn build_resource_routes(host: Arc<ServerHost>) -> Router {
    let mut router = Router::new();

    for resource in &host.resources.resources {
        let state = ResourceState::new(host.clone(), resource.clone());
        let base = format!("/{}", resource.name);

        let resource_router = Router::new()
            .route(&base, get(list_rows))
            .route(&format!("{}/", base), get(list_rows))
            .route(&format!("{}/upload/", base), get(export_rows))
            .route(&format!("{}/upload", base), get(export_rows))
            .route(&format!("{}/{{id}}", base), get(get_row))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_read_access,
            ))
            .with_state(state);

        router = router.merge(resource_router);
    }

    router
}
