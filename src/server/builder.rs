//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ServerHost;
use crate::config::ResourcesConfig;
use crate::core::auth::IdentityProvider;
use crate::core::store::ResourceStore;
use anyhow::{Result, anyhow};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating the HTTP server
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_resources(ResourcesConfig::default_config())
///     .with_store(InMemoryStore::new())
///     .with_identity_provider(InMemoryIdentityProvider::new())
///     .build()?;
/// ```
pub struct ServerBuilder {
    resources: Option<ResourcesConfig>,
    store: Option<Arc<dyn ResourceStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            resources: None,
            store: None,
            identity: None,
            custom_routes: Vec::new(),
        }
    }

    /// Set the exposed resources (defaults to the collection schema)
    pub fn with_resources(mut self, resources: ResourcesConfig) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Set the row store (required)
    pub fn with_store(mut self, store: impl ResourceStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the identity provider checking Basic credentials (required)
    pub fn with_identity_provider(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes are merged as-is and are not covered by the
    /// authentication gate.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(mut self) -> Result<ServerHost> {
        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow!("ResourceStore is required. Call .with_store()"))?;
        let identity = self.identity.take().ok_or_else(|| {
            anyhow!("IdentityProvider is required. Call .with_identity_provider()")
        })?;
        let resources = self
            .resources
            .take()
            .unwrap_or_else(ResourcesConfig::default_config);

        ServerHost::from_builder_components(resources, store, identity)
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        RestExposure::build_router(host, custom_routes)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}


/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
