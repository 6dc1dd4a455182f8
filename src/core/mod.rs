//! Core module containing the request-independent building blocks

pub mod auth;
pub mod entity;
pub mod error;
pub mod export;
pub mod field;
pub mod query;
pub mod store;

pub use auth::{AuthContext, AuthPolicy, BasicCredentials, IdentityProvider};
pub use entity::{Account, Record};
pub use error::{ApiError, ApiResult};
pub use field::{FieldKind, FieldValue};
pub use query::{RowQuery, SortDirection, SortKey, SortSpec, parse_order_by};
pub use store::{ResourceStore, RowStream};
