//! Storage key derivation
//!
//! A record's file name comes from its identity field: the table's
//! configured primary key if it has one, otherwise the first usable field
//! from the fallback list. A usable identity is a non-empty string or a
//! non-zero number.

use serde_json::Value;
use std::collections::HashMap;

use crate::config::Config;
use crate::storage::record::Record;

/// Identity found in a record
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Field the identity was read from
    pub field: String,
    /// File stem derived from the value
    pub key: String,
    /// Value as stored in the record
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct IdentityRules {
    fallback: Vec<String>,
    primary_keys: HashMap<String, String>,
}

impl IdentityRules {
    pub fn new(fallback: Vec<String>, primary_keys: HashMap<String, String>) -> Self {
        Self { fallback, primary_keys }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.identity_fields.clone(), config.primary_keys.clone())
    }

    /// Identity of `record` when stored in `table`, if any field qualifies
    pub fn resolve(&self, table: &str, record: &Record) -> Option<Identity> {
        let primary = self.primary_keys.get(table).map(String::as_str);

        primary
            .into_iter()
            .chain(self.fallback.iter().map(String::as_str))
            .find_map(|field| {
                let value = record.get(field)?;
                key_from_value(value).map(|key| Identity {
                    field: field.to_string(),
                    key,
                    value: value.clone(),
                })
            })
    }
}

impl Default for IdentityRules {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// File stem for an identity value, `None` if the value can't identify a record
pub fn key_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}
