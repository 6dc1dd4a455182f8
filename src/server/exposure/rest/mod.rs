//! REST API exposure
//!
//! The REST exposure consumes a `ServerHost` and produces an Axum `Router`
//! with the resource routes, the generated documentation and health checks.

use super::super::host::ServerHost;
use crate::config::ResourceConfig;
use crate::core::error::{ApiError, RequestError};
use crate::server::router::build_resource_routes;
use anyhow::Result;
use axum::http::Uri;
use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Name reported by the health endpoints
pub const SERVICE_NAME: &str = "numismatics";

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// # Arguments
    ///
    /// * `host` - The server host containing all server state
    /// * `custom_routes` - Additional custom routes to merge
    ///
    /// # Returns
    ///
    /// Returns a fully configured Axum router with:
    /// - Health check routes
    /// - Documentation route
    /// - Resource routes (listing, lookup, CSV export)
    /// - Custom routes
    /// - A JSON fallback for unknown paths
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let mut app = Self::health_routes()
            .merge(Self::docs_routes(host.clone()))
            .merge(build_resource_routes(host.clone()))
            .merge(Self::fallback_routes(host));

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        Ok(app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
    }

    /// Build health check routes
    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": SERVICE_NAME
        }))
    }

    fn fallback_routes(host: Arc<ServerHost>) -> Router {
        Router::new().fallback(Self::unknown_route).with_state(host)
    }

    /// Paths no route matched
    ///
    /// A first segment that names no resource gives `UNKNOWN_RESOURCE`; any
    /// other unmatched path under a known resource is an invalid path.
    async fn unknown_route(State(host): State<Arc<ServerHost>>, uri: Uri) -> ApiError {
        let segment = uri.path().trim_start_matches('/').split('/').next().unwrap_or_default();
        match host.resource(segment) {
            Err(e) => e,
            Ok(resource) => RequestError::InvalidPath {
                path: uri.path().to_string(),
                message: format!("no route under /{}", resource.name),
            }
            .into(),
        }
    }

    fn docs_routes(host: Arc<ServerHost>) -> Router {
        Router::new()
            .route("/docs", get(Self::docs))
            .with_state(host)
    }

    /// Generated API description
    async fn docs(State(host): State<Arc<ServerHost>>) -> Json<Value> {
        let resources: Vec<Value> = host.resources.resources.iter().map(describe).collect();
        Json(json!({
            "service": SERVICE_NAME,
            "authentication": "basic",
            "resources": resources
        }))
    }
}

fn describe(resource: &ResourceConfig) -> Value {
    let base = format!("/{}", resource.name);
    let fields: Vec<Value> = resource
        .fields
        .iter()
        .map(|f| json!({ "name": f.name, "kind": f.kind }))
        .collect();

    json!({
        "name": resource.name,
        "read_policy": resource.read_policy,
        "routes": {
            "list": format!("{}/", base),
            "get": format!("{}/{{id}}", base),
            "export": format!("{}/upload/", base),
        },
        "key": resource.key,
        "fields": fields,
        "sortable": resource.sortable_fields(),
        "filterable": resource.filterable_fields(),
        "export_filename": resource.export_filename(),
    })
}
