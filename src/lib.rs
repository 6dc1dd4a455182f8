//! # Numismatics API
//!
//! HTTP access to a numismatic collection database.
//!
//! ## Features
//!
//! - **Sortable listings**: `order_by=-id,mint` is parsed against an explicit
//!   per-resource allow-list into a typed [`SortSpec`](core::query::SortSpec)
//! - **Streamed CSV export**: `GET /<resource>/upload/` writes rows as they
//!   are read, with backpressure from the client connection
//! - **Basic authentication**: every resource route checks credentials
//!   through an [`IdentityProvider`](core::auth::IdentityProvider)
//! - **Configuration-based**: resources and their fields come from YAML or
//!   the built-in collection schema
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use numismatics::prelude::*;
//!
//! let store = InMemoryStore::new();
//! store.insert("money", Record::new().with("id", 1).with("mint", 3))?;
//!
//! let app = ServerBuilder::new()
//!     .with_resources(ResourcesConfig::default_config())
//!     .with_store(store)
//!     .with_identity_provider(
//!         InMemoryIdentityProvider::new().with_account(Account::new(1, "admin", true))?,
//!     )
//!     .build()?;
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthPolicy, BasicCredentials, IdentityProvider},
        entity::{Account, Record},
        error::{ApiError, ApiResult},
        export::csv_stream,
        field::{FieldKind, FieldValue},
        query::{RowQuery, SortDirection, SortKey, SortSpec, parse_order_by},
        store::{ResourceStore, RowStream},
    };

    // === Storage ===
    pub use crate::storage::{InMemoryIdentityProvider, InMemoryStore};
    #[cfg(feature = "postgres")]
    pub use crate::storage::{PostgresIdentityProvider, PostgresStore};

    // === Config ===
    pub use crate::config::{AppConfig, FieldDescriptor, ResourceConfig, ResourcesConfig};

    // === Server ===
    pub use crate::server::{RestExposure, ServerBuilder, ServerHost};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
}
