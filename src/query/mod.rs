//! Query interpreter for filedb
//!
//! Executes parsed statements against the record store.

mod executor;
pub mod filter;
pub mod params;

pub use filter::{coerce_bool, FilterRules, Predicate};
pub use params::{Binder, Params};

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::Result;
use crate::storage::{IdentityRules, Record, RecordStore};

/// Executes statements against one record store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: RecordStore,
    identity: IdentityRules,
    filter: FilterRules,
}

impl QueryEngine {
    pub fn new(store: RecordStore, config: &Config) -> Self {
        Self {
            store,
            identity: IdentityRules::from_config(config),
            filter: FilterRules::from_config(config),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Execute one statement.
    ///
    /// An unrecognised leading keyword is an error. A recognised statement
    /// whose structure cannot be read does nothing and returns an empty
    /// result.
    pub async fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        let params = params.into();
        let stmt = match filesql::parse(sql) {
            Ok(stmt) => stmt,
            Err(filesql::ParseError::Malformed { kind, message }) => {
                tracing::warn!("Malformed {} statement ignored: {}", kind, message);
                return Ok(QueryResult::empty(kind));
            }
            Err(err) => return Err(err.into()),
        };

        executor::execute(self, stmt, &params).await
    }

    /// Execute an already parsed statement
    pub async fn execute_statement(&self, stmt: filesql::Statement, params: &Params) -> Result<QueryResult> {
        executor::execute(self, stmt, params).await
    }
}

/// Result of a query execution
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Records returned from a SELECT
    Rows(Vec<Record>),
    /// Outcome of INSERT, UPDATE, DELETE or CREATE TABLE
    Affected(WriteSummary),
    /// SHOW TABLES
    Tables { database: String, names: Vec<String> },
}

/// `affectedRows` / `insertId` pair reported for writes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteSummary {
    pub affected_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<Value>,
}

impl WriteSummary {
    pub fn affected(affected_rows: usize) -> Self {
        Self {
            affected_rows,
            insert_id: None,
        }
    }
}

impl QueryResult {
    /// The no-op result for a statement kind
    pub fn empty(kind: filesql::StatementKind) -> Self {
        match kind {
            filesql::StatementKind::Select => QueryResult::Rows(Vec::new()),
            filesql::StatementKind::ShowTables => QueryResult::Tables {
                database: String::new(),
                names: Vec::new(),
            },
            _ => QueryResult::Affected(WriteSummary::default()),
        }
    }

    /// Rows of a SELECT; empty for other results
    pub fn rows(&self) -> &[Record] {
        match self {
            QueryResult::Rows(rows) => rows,
            _ => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Record> {
        match self {
            QueryResult::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub fn affected_rows(&self) -> usize {
        match self {
            QueryResult::Affected(summary) => summary.affected_rows,
            _ => 0,
        }
    }

    pub fn insert_id(&self) -> Option<&Value> {
        match self {
            QueryResult::Affected(summary) => summary.insert_id.as_ref(),
            _ => None,
        }
    }

    /// The shape a relational client returns: a row array for reads, an
    /// `{affectedRows, insertId}` object for writes
    pub fn to_json(&self) -> Value {
        match self {
            QueryResult::Rows(rows) => Value::Array(rows.iter().cloned().map(Value::Object).collect()),
            QueryResult::Affected(summary) => json!(summary),
            QueryResult::Tables { database, names } => {
                let column = format!("Tables_in_{}", database);
                let rows = names.iter().map(|name| {
                    let mut row = Record::new();
                    row.insert(column.clone(), Value::String(name.clone()));
                    Value::Object(row)
                });
                Value::Array(rows.collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_summary_json() {
        let result = QueryResult::Affected(WriteSummary {
            affected_rows: 1,
            insert_id: Some(json!(42)),
        });
        assert_eq!(result.to_json(), json!({"affectedRows": 1, "insertId": 42}));

        let result = QueryResult::Affected(WriteSummary::affected(3));
        assert_eq!(result.to_json(), json!({"affectedRows": 3}));
        assert_eq!(result.affected_rows(), 3);
        assert!(result.rows().is_empty());
    }

    #[test]
    fn test_tables_json() {
        let result = QueryResult::Tables {
            database: "data".into(),
            names: vec!["roles".into()],
        };
        assert_eq!(result.to_json(), json!([{"Tables_in_data": "roles"}]));
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(QueryResult::empty(filesql::StatementKind::Select), QueryResult::Rows(vec![]));
        assert_eq!(QueryResult::empty(filesql::StatementKind::Delete).affected_rows(), 0);
    }
}
