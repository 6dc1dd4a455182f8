//! Configuration loading and management
//!
//! Two layers live here:
//! - [`ResourcesConfig`]: the explicit per-resource field allow-lists used by
//!   the query builder, the CSV encoder and the storage backends
//! - [`AppConfig`]: process settings read from the environment at startup

use crate::core::auth::AuthPolicy;
use crate::core::error::ConfigError;
use crate::core::field::FieldKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Description of one column of a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDescriptor {
    /// Column name, also the CSV header and JSON key
    pub name: String,

    /// Column type
    pub kind: FieldKind,

    /// Whether the field may appear in `order_by`
    #[serde(default = "default_true")]
    pub sortable: bool,

    /// Whether the field may be used as an exact-match filter
    #[serde(default = "default_true")]
    pub filterable: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDescriptor {
    /// Sortable and filterable field
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            sortable: true,
            filterable: true,
        }
    }

    /// Field exported and listed but not usable in `order_by` or filters
    pub fn hidden_from_queries(mut self) -> Self {
        self.sortable = false;
        self.filterable = false;
        self
    }
}

/// Configuration for a single resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// URL segment (e.g., "money")
    pub name: String,

    /// Backing table
    pub table: String,

    /// Unique key appended as the final sort key
    #[serde(default = "default_key")]
    pub key: String,

    /// Hide rows whose `deleted_at` column is set
    #[serde(default = "default_true")]
    pub soft_delete: bool,

    /// Policy guarding read access
    #[serde(default)]
    pub read_policy: AuthPolicy,

    /// Fields in canonical (CSV column) order
    pub fields: Vec<FieldDescriptor>,
}

fn default_key() -> String {
    "id".to_string()
}

impl ResourceConfig {
    /// Create a resource backed by a table of the same name
    pub fn new(name: &str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            table: name.to_string(),
            key: default_key(),
            soft_delete: true,
            read_policy: AuthPolicy::default(),
            fields,
        }
    }

    /// Look up a field descriptor by exact name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in canonical order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Names of the fields accepted in `order_by`
    pub fn sortable_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.sortable)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Names of the fields accepted as filters
    pub fn filterable_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.filterable)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Suggested download name for exports
    pub fn export_filename(&self) -> String {
        format!("{}.csv", self.name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for ident in [&self.name, &self.table, &self.key] {
            check_identifier(&self.name, ident)?;
        }
        if self.fields.is_empty() {
            return Err(invalid(&self.name, "fields", "", "at least one field is required"));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            check_identifier(&self.name, &field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(&self.name, "fields", &field.name, "duplicate field"));
            }
        }

        match self.field(&self.key) {
            Some(key) if key.sortable => Ok(()),
            Some(_) => Err(invalid(&self.name, "key", &self.key, "key field must be sortable")),
            None => Err(invalid(&self.name, "key", &self.key, "key field is not declared")),
        }
    }
}

fn invalid(resource: &str, field: &str, value: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("{}.{}", resource, field),
        value: value.to_string(),
        message: message.to_string(),
    }
}

/// Identifiers end up quoted inside SQL, so only plain names are accepted
fn check_identifier(resource: &str, ident: &str) -> Result<(), ConfigError> {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENT_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    });
    if regex.is_match(ident) {
        Ok(())
    } else {
        Err(invalid(resource, "identifier", ident, "must match [A-Za-z_][A-Za-z0-9_]*"))
    }
}

/// Complete resource configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourcesConfig {
    pub resources: Vec<ResourceConfig>,
}

impl ResourcesConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_string(),
            },
            _ => ConfigError::IoError {
                message: e.to_string(),
            },
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                file: Some(path.to_string()),
                message,
            },
            other => other,
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names, keys and identifiers of every resource
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for resource in &self.resources {
            resource.validate()?;
            if !names.insert(resource.name.as_str()) {
                return Err(invalid(&resource.name, "name", &resource.name, "duplicate resource"));
            }
        }
        Ok(())
    }

    /// Find a resource by its URL name
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// The collection schema served by the numismatics database
    pub fn default_config() -> Self {
        use FieldKind::{Integer, Text, Timestamp};

        let catalog = |name: &str| ResourceConfig::new(name, vec![FieldDescriptor::new("id", Integer)]);

        Self {
            resources: vec![
                ResourceConfig::new(
                    "money",
                    vec![
                        FieldDescriptor::new("id", Integer),
                        FieldDescriptor::new("description", Text),
                        FieldDescriptor::new("nominal_price", Integer),
                        FieldDescriptor::new("release_year", Text),
                        FieldDescriptor::new("serial_number", Text),
                        FieldDescriptor::new("type_money", Integer),
                        FieldDescriptor::new("currency", Integer),
                        FieldDescriptor::new("mint", Integer),
                        FieldDescriptor::new("issuing_state", Integer),
                        FieldDescriptor::new("user", Integer).hidden_from_queries(),
                    ],
                ),
                catalog("type_money"),
                catalog("currency"),
                catalog("mint"),
                catalog("issuing_state"),
                ResourceConfig::new(
                    "transfer",
                    vec![
                        FieldDescriptor::new("id", Integer),
                        FieldDescriptor::new("source", Integer),
                        FieldDescriptor::new("destination", Integer),
                        FieldDescriptor::new("creater", Integer),
                        FieldDescriptor::new("created_at", Timestamp),
                        FieldDescriptor::new("closed_at", Timestamp),
                        FieldDescriptor::new("comment", Text),
                        FieldDescriptor::new("money", Integer),
                        FieldDescriptor::new("status", Text),
                    ],
                ),
            ],
        }
    }
}

// =============================================================================
// Process configuration
// =============================================================================

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_EXPORT_BUFFER: usize = 64;
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// Process settings read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string (`DATABASE_URL`)
    pub database_url: String,

    /// Listen address (`BIND_ADDR`)
    pub bind_addr: SocketAddr,

    /// Optional YAML resource configuration (`RESOURCES_CONFIG`)
    pub resources_path: Option<String>,

    /// Rows prefetched ahead of the HTTP writer (`EXPORT_BUFFER`)
    pub export_buffer: usize,

    /// Per-statement timeout (`STATEMENT_TIMEOUT_SECS`)
    pub statement_timeout_secs: u64,
}

impl AppConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar {
                name: "DATABASE_URL".to_string(),
            })?;
        validate_database_url(&database_url)?;

        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "BIND_ADDR".to_string(),
                value: bind_raw.clone(),
                message: e.to_string(),
            })?;

        let export_buffer = parse_positive(&lookup, "EXPORT_BUFFER", DEFAULT_EXPORT_BUFFER as u64)? as usize;
        let statement_timeout_secs =
            parse_positive(&lookup, "STATEMENT_TIMEOUT_SECS", DEFAULT_STATEMENT_TIMEOUT_SECS)?;

        Ok(Self {
            database_url,
            bind_addr,
            resources_path: lookup("RESOURCES_CONFIG").filter(|p| !p.is_empty()),
            export_buffer,
            statement_timeout_secs,
        })
    }

    /// Load the resource configuration this process should serve
    pub fn load_resources(&self) -> Result<ResourcesConfig, ConfigError> {
        match &self.resources_path {
            Some(path) => ResourcesConfig::from_yaml_file(path),
            None => Ok(ResourcesConfig::default_config()),
        }
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw,
            message: "expected a positive integer".to_string(),
        }),
    }
}

/// Check that a DSN names a postgres scheme, a host and a database
///
/// Syntax (ports, IPv6 hosts, percent-encoding, parameters) is checked by
/// sqlx's own connection-string parser when the `postgres` feature is on.
pub fn validate_database_url(url: &str) -> Result<(), ConfigError> {
    let fail = |message: &str| ConfigError::InvalidValue {
        field: "DATABASE_URL".to_string(),
        value: redact_password(url),
        message: message.to_string(),
    };

    let rest = url
        .strip_prefix("postgres://")
        .or_else(|| url.strip_prefix("postgresql://"))
        .ok_or_else(|| fail("scheme must be postgres:// or postgresql://"))?;

    #[cfg(feature = "postgres")]
    {
        use std::str::FromStr;
        sqlx::postgres::PgConnectOptions::from_str(url).map_err(|e| fail(&e.to_string()))?;
    }

    let (authority, path) = rest
        .split_once('/')
        .ok_or_else(|| fail("missing database name"))?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    if host_port.is_empty() || host_port.starts_with(':') {
        return Err(fail("missing host"));
    }
    if path.split('?').next().unwrap_or_default().is_empty() {
        return Err(fail("missing database name"));
    }
    Ok(())
}

fn redact_password(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
