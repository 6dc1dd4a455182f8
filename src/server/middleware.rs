//! Basic authentication gate for resource routes
//!
//! Runs before any handler, so query parameters are never parsed for a
//! request that is not allowed to read the resource.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::handlers::ResourceState;
use crate::core::auth::{AuthContext, BasicCredentials};
use crate::core::error::{ApiError, RequestError};

fn unauthorized() -> ApiError {
    // Never say whether the header, the user or the password was wrong
    RequestError::Unauthorized {
        message: "valid credentials are required".to_string(),
    }
    .into()
}

/// Authenticate the request and check the resource's read policy
///
/// The resulting [`AuthContext`] is stored in the request extensions.
pub async fn require_read_access(
    State(state): State<ResourceState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let resource = &state.resource.name;

    let context = match BasicCredentials::from_headers(request.headers()) {
        Some(credentials) => {
            let account = state
                .host
                .identity
                .authenticate(&credentials)
                .await
                .map_err(|e| ApiError::Internal(format!("identity lookup failed: {:#}", e)))?;

            match account {
                Some(account) => AuthContext::from(account),
                None => {
                    tracing::warn!(resource = %resource, user = %credentials.username, "rejected credentials");
                    return Err(unauthorized());
                }
            }
        }
        None if state.policy.allows_anonymous() => AuthContext::Anonymous,
        None => {
            tracing::debug!(resource = %resource, "request without usable credentials");
            return Err(unauthorized());
        }
    };

    if !state.policy.check(&context) {
        tracing::warn!(resource = %resource, account = ?context.account_id(), "read access denied");
        return Err(RequestError::Forbidden {
            message: format!("not allowed to read '{}'", resource),
        }
        .into());
    }

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
