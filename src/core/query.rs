//! Sort and filter parameters for resource reads
//!
//! `order_by` is a comma-separated list of field names, each optionally
//! prefixed with `-` (descending) or `+` (ascending, the default):
//!
//! ```text
//! GET /money/upload/?order_by=-id,mint
//! GET /money/?order_by=release_year,-nominal_price&mint=3
//! ```
//!
//! Every other query parameter is an exact-match filter.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::config::ResourceConfig;
use crate::core::error::ValidationError;
use crate::core::field::FieldValue;

/// Name of the query parameter carrying the sort specification
pub const ORDER_BY_PARAM: &str = "order_by";

/// Direction of a single sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// SQL keyword for this direction
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// One `(field, direction)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Descending,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{}", self.field),
            SortDirection::Descending => write!(f, "-{}", self.field),
        }
    }
}

/// Ordered sort keys, primary key first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.keys.iter().any(|k| k.field == field)
    }

    /// Append `key ASC` as the last sort key unless the key is already sorted on
    ///
    /// With a unique key this makes the order total, so repeated reads of
    /// unchanged data come back identical.
    pub fn with_tie_break(mut self, key: &str) -> Self {
        if !self.contains(key) {
            self.keys.push(SortKey::asc(key));
        }
        self
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keys.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Set of field names accepted in `order_by`
pub trait SortAllowList {
    fn allows(&self, field: &str) -> bool;
}

impl SortAllowList for ResourceConfig {
    fn allows(&self, field: &str) -> bool {
        self.field(field).is_some_and(|f| f.sortable)
    }
}

impl SortAllowList for HashSet<String> {
    fn allows(&self, field: &str) -> bool {
        self.contains(field)
    }
}

impl SortAllowList for HashSet<&str> {
    fn allows(&self, field: &str) -> bool {
        self.contains(field)
    }
}

impl SortAllowList for BTreeSet<String> {
    fn allows(&self, field: &str) -> bool {
        self.contains(field)
    }
}

impl SortAllowList for [&str] {
    fn allows(&self, field: &str) -> bool {
        self.contains(&field)
    }
}

/// Parse an `order_by` value against an allow-list
///
/// - tokens are split on `,` and trimmed; empty tokens are skipped
/// - `-name` sorts descending, `name` or `+name` ascending
/// - field names match the allow-list exactly (case-sensitive); the first
///   unknown name rejects the whole value
/// - a repeated field keeps the direction of its first occurrence
pub fn parse_order_by<A>(raw: &str, allowed: &A) -> Result<SortSpec, ValidationError>
where
    A: SortAllowList + ?Sized,
{
    let mut keys: Vec<SortKey> = Vec::new();

    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (direction, field) = match token.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (
                SortDirection::Ascending,
                token.strip_prefix('+').unwrap_or(token),
            ),
        };

        if field.is_empty() || !allowed.allows(field) {
            return Err(ValidationError::UnknownField {
                field: field.to_string(),
            });
        }

        if keys.iter().any(|k| k.field == field) {
            continue;
        }
        keys.push(SortKey {
            field: field.to_string(),
            direction,
        });
    }

    Ok(SortSpec::new(keys))
}

/// Exact-match condition on one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

/// Validated read request for one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowQuery {
    /// Sort keys, tie-break key included
    pub sort: SortSpec,

    /// Conjunction of exact-match filters, ordered by field name
    pub filters: Vec<Filter>,
}

impl RowQuery {
    /// Build a query from raw (already percent-decoded) query parameters
    ///
    /// Validation completes before anything touches storage. Parameters that
    /// are not filterable fields are ignored.
    pub fn from_params(
        resource: &ResourceConfig,
        params: &HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let raw_order = params.get(ORDER_BY_PARAM).map(String::as_str).unwrap_or("");
        let sort = parse_order_by(raw_order, resource)?.with_tie_break(&resource.key);

        let mut names: Vec<&String> = params.keys().filter(|k| *k != ORDER_BY_PARAM).collect();
        names.sort();

        let mut filters = Vec::with_capacity(names.len());
        for name in names {
            let Some(descriptor) = resource.field(name).filter(|f| f.filterable) else {
                tracing::debug!(resource = %resource.name, param = %name, "ignoring undeclared query parameter");
                continue;
            };
            filters.push(Filter {
                field: name.clone(),
                value: descriptor.kind.parse_value(name, &params[name])?,
            });
        }

        Ok(Self { sort, filters })
    }

    /// Natural order of a resource: its key ascending, no filters
    pub fn natural(resource: &ResourceConfig) -> Self {
        Self {
            sort: SortSpec::default().with_tie_break(&resource.key),
            filters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourcesConfig;

    fn money() -> ResourceConfig {
        ResourcesConfig::default_config()
            .resource("money")
            .cloned()
            .expect("money resource")
    }

    fn allowed() -> HashSet<&'static str> {
        ["id", "mint", "description"].into_iter().collect()
    }

    #[test]
    fn test_parse_mixed_directions() {
        let spec = parse_order_by("-id,mint", &allowed()).unwrap();
        assert_eq!(spec.keys(), &[SortKey::desc("id"), SortKey::asc("mint")]);
    }

    #[test]
    fn test_parse_trims_and_skips_empty_tokens() {
        let spec = parse_order_by(" -id , ,,mint ,", &allowed()).unwrap();
        assert_eq!(spec.keys(), &[SortKey::desc("id"), SortKey::asc("mint")]);
    }

    #[test]
    fn test_empty_value_is_empty_spec() {
        assert!(parse_order_by("", &allowed()).unwrap().is_empty());
        assert!(parse_order_by(" , ", &allowed()).unwrap().is_empty());
    }

    #[test]
    fn test_plus_prefix_is_ascending() {
        let spec = parse_order_by("+mint", &allowed()).unwrap();
        assert_eq!(spec.keys(), &[SortKey::asc("mint")]);
    }

    #[test]
    fn test_unknown_field_rejects_whole_value() {
        let err = parse_order_by("id,bogus_field,-mint", &allowed()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownField {
                field: "bogus_field".to_string()
            }
        );
    }

    #[test]
    fn test_field_match_is_case_sensitive() {
        assert!(parse_order_by("ID", &allowed()).is_err());
        assert!(parse_order_by("-Mint", &allowed()).is_err());
    }

    #[test]
    fn test_bare_sign_is_rejected() {
        let err = parse_order_by("id,-", &allowed()).unwrap_err();
        assert_eq!(err, ValidationError::UnknownField { field: String::new() });
    }

    #[test]
    fn test_duplicate_keeps_first_direction() {
        let spec = parse_order_by("mint,-id,-mint,id", &allowed()).unwrap();
        assert_eq!(spec.keys(), &[SortKey::asc("mint"), SortKey::desc("id")]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = parse_order_by("description,-mint", &allowed()).unwrap();
        let second = parse_order_by("description,-mint", &allowed()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "description,-mint");
    }

    #[test]
    fn test_slice_allow_list() {
        let fields: &[&str] = &["id", "mint"];
        assert!(parse_order_by("mint", fields).is_ok());
        assert!(parse_order_by("serial_number", fields).is_err());
    }

    #[test]
    fn test_resource_allow_list_excludes_non_sortable() {
        let money = money();
        assert!(parse_order_by("-nominal_price,serial_number", &money).is_ok());
        assert!(parse_order_by("user", &money).is_err());
    }

    #[test]
    fn test_tie_break_appended_once() {
        let spec = SortSpec::new(vec![SortKey::desc("mint")]).with_tie_break("id");
        assert_eq!(spec.keys(), &[SortKey::desc("mint"), SortKey::asc("id")]);

        let spec = SortSpec::new(vec![SortKey::desc("id")]).with_tie_break("id");
        assert_eq!(spec.keys(), &[SortKey::desc("id")]);
    }

    #[test]
    fn test_row_query_from_params() {
        let params: HashMap<String, String> = [
            ("order_by".to_string(), "-mint".to_string()),
            ("currency".to_string(), "2".to_string()),
            ("description".to_string(), "Thaler".to_string()),
        ]
        .into_iter()
        .collect();

        let query = RowQuery::from_params(&money(), &params).unwrap();
        assert_eq!(query.sort.to_string(), "-mint,id");
        assert_eq!(
            query.filters,
            vec![
                Filter {
                    field: "currency".to_string(),
                    value: FieldValue::Integer(2)
                },
                Filter {
                    field: "description".to_string(),
                    value: FieldValue::from("Thaler")
                },
            ]
        );
    }

    #[test]
    fn test_row_query_ignores_undeclared_params() {
        let params: HashMap<String, String> = [
            ("weight".to_string(), "7".to_string()),
            ("_".to_string(), "1700000000".to_string()),
            ("user".to_string(), "not-a-number".to_string()),
            ("mint".to_string(), "3".to_string()),
        ]
        .into_iter()
        .collect();

        let query = RowQuery::from_params(&money(), &params).unwrap();
        assert_eq!(
            query.filters,
            vec![Filter {
                field: "mint".to_string(),
                value: FieldValue::Integer(3)
            }]
        );
    }

    #[test]
    fn test_row_query_still_rejects_unknown_sort_field() {
        let params: HashMap<String, String> = [
            ("order_by".to_string(), "weight".to_string()),
            ("_".to_string(), "1700000000".to_string()),
        ]
        .into_iter()
        .collect();
        let err = RowQuery::from_params(&money(), &params).unwrap_err();
        assert_eq!(err, ValidationError::UnknownField { field: "weight".to_string() });
    }

    #[test]
    fn test_row_query_rejects_bad_filter_value() {
        let params: HashMap<String, String> =
            [("mint".to_string(), "royal".to_string())].into_iter().collect();
        assert!(matches!(
            RowQuery::from_params(&money(), &params),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_natural_order_is_key_ascending() {
        let query = RowQuery::natural(&money());
        assert_eq!(query.sort.keys(), &[SortKey::asc("id")]);
        assert!(query.filters.is_empty());
    }
}
