//! Authentication and authorization
//!
//! Requests authenticate with HTTP Basic credentials. The credentials are
//! checked by an [`IdentityProvider`]; the resulting [`AuthContext`] is then
//! matched against the resource's [`AuthPolicy`].

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::core::entity::Account;

/// Username and password decoded from an `Authorization: Basic` header
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl BasicCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Decode the value of an `Authorization` header
    ///
    /// Returns `None` for any other scheme, invalid base64, non-UTF-8
    /// payloads, or payloads without a `:` separator. The password may be
    /// empty.
    pub fn parse_header_value(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self::new(username, password))
    }

    /// Extract credentials from request headers
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()
            .and_then(Self::parse_header_value)
    }

    /// Encode as an `Authorization` header value
    pub fn to_header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Authorization context attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Authenticated account
    User { account_id: i64, name: String },

    /// Authenticated account holding the admin flag
    Admin { account_id: i64, name: String },

    /// No credentials (public resources only)
    Anonymous,
}

impl AuthContext {
    /// Check if context represents an admin
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    /// Get the account id if authenticated
    pub fn account_id(&self) -> Option<i64> {
        match self {
            AuthContext::User { account_id, .. } | AuthContext::Admin { account_id, .. } => {
                Some(*account_id)
            }
            AuthContext::Anonymous => None,
        }
    }
}

impl From<Account> for AuthContext {
    fn from(account: Account) -> Self {
        if account.is_admin {
            AuthContext::Admin {
                account_id: account.id,
                name: account.name,
            }
        } else {
            AuthContext::User {
                account_id: account.id,
                name: account.name,
            }
        }
    }
}

/// Authorization policy for reading a resource
///
/// Deserialized from `public`, `authenticated` or `admin_only`; any other
/// value is a configuration error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated account
    #[default]
    Authenticated,

    /// Admin accounts only
    AdminOnly,
}

impl AuthPolicy {
    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,
            AuthPolicy::Authenticated => !matches!(context, AuthContext::Anonymous),
            AuthPolicy::AdminOnly => context.is_admin(),
        }
    }

    /// Whether requests without credentials may proceed
    pub fn allows_anonymous(&self) -> bool {
        matches!(self, AuthPolicy::Public)
    }
}

/// Identity collaborator checking Basic credentials
///
/// Returns `Ok(None)` when the credentials are not accepted; errors are
/// reserved for lookups that could not be performed.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credentials: &BasicCredentials) -> Result<Option<Account>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_user_with_empty_password() {
        // "admin:" base64-encoded
        let creds = BasicCredentials::parse_header_value("Basic YWRtaW46").unwrap();
        assert_eq!(creds, BasicCredentials::new("admin", ""));
    }

    #[test]
    fn test_password_may_contain_colon() {
        let header = BasicCredentials::new("collector", "a:b:c").to_header_value();
        let creds = BasicCredentials::parse_header_value(&header).unwrap();
        assert_eq!(creds.username, "collector");
        assert_eq!(creds.password, "a:b:c");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(BasicCredentials::parse_header_value("basic YWRtaW46").is_some());
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert!(BasicCredentials::parse_header_value("Bearer abc.def").is_none());
        assert!(BasicCredentials::parse_header_value("Basic !!!").is_none());
        // "admin" without separator
        assert!(BasicCredentials::parse_header_value("Basic YWRtaW4=").is_none());
        assert!(BasicCredentials::parse_header_value("Basic").is_none());
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(BasicCredentials::from_headers(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic YWRtaW46"));
        assert_eq!(
            BasicCredentials::from_headers(&headers),
            Some(BasicCredentials::new("admin", ""))
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = BasicCredentials::new("collector", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_policy_check() {
        let user = AuthContext::from(Account::new(1, "collector", false));
        let admin = AuthContext::from(Account::new(2, "curator", true));

        assert!(AuthPolicy::Authenticated.check(&user));
        assert!(!AuthPolicy::AdminOnly.check(&user));
        assert!(AuthPolicy::AdminOnly.check(&admin));
        assert!(AuthPolicy::Public.check(&AuthContext::Anonymous));
        assert!(!AuthPolicy::Authenticated.check(&AuthContext::Anonymous));
    }

    #[test]
    fn test_policy_names() {
        let policy: AuthPolicy = serde_yaml::from_str("admin_only").unwrap();
        assert_eq!(policy, AuthPolicy::AdminOnly);
        assert_eq!(serde_json::to_value(AuthPolicy::Public).unwrap(), "public");
        assert_eq!(AuthPolicy::default(), AuthPolicy::Authenticated);

        assert!(serde_yaml::from_str::<AuthPolicy>("admin-only").is_err());
        assert!(serde_yaml::from_str::<AuthPolicy>("something_unknown").is_err());
    }

    #[test]
    fn test_auth_context_accessors() {
        let admin = AuthContext::from(Account::new(9, "curator", true));
        assert!(admin.is_admin());
        assert_eq!(admin.account_id(), Some(9));
        assert_eq!(AuthContext::Anonymous.account_id(), None);
    }
}
