//! Row and account types read from the collection database

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ResourceConfig;
use crate::core::field::FieldValue;

/// One row of a resource, keyed by field name in canonical order
///
/// Serializes as a JSON object whose keys keep the resource's field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Value of a field; absent fields read as `Null`
    pub fn get(&self, name: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.fields.get(name).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Values laid out in the resource's canonical field order
    pub fn values_in_order<'a>(
        &'a self,
        resource: &'a ResourceConfig,
    ) -> impl Iterator<Item = &'a FieldValue> + 'a {
        resource.fields.iter().map(|f| self.get(&f.name))
    }

    /// Copy of this row restricted to the resource's fields, in order
    pub fn project(&self, resource: &ResourceConfig) -> Record {
        let fields = resource
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.get(&f.name).clone()))
            .collect();
        Record { fields }
    }
}

/// A user account, as known to the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl Account {
    pub fn new(id: i64, name: &str, is_admin: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_admin,
        }
    }
}
