//! WHERE clause evaluation
//!
//! Comparison follows the loose rules callers were written against:
//! numeric strings equal numbers, ordering is always numeric, and a field
//! that is missing or null only ever satisfies `!=` against a non-null
//! operand.

use filesql::{CompareOp, Condition};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

use super::params::Binder;
use crate::config::Config;
use crate::storage::Record;

/// A WHERE term with its operand bound
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// `LIKE` / `NOT LIKE`; `pattern` is `None` when the operand is not a string
    Like {
        field: String,
        pattern: Option<Regex>,
        negated: bool,
    },
    IsNull {
        field: String,
        negated: bool,
    },
}

/// Field-specific comparison rules
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    boolean_fields: HashSet<String>,
    dual_mode_fields: HashSet<String>,
}

impl FilterRules {
    pub fn new(
        boolean_fields: impl IntoIterator<Item = String>,
        dual_mode_fields: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            boolean_fields: boolean_fields.into_iter().collect(),
            dual_mode_fields: dual_mode_fields.into_iter().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.boolean_fields.iter().cloned(), config.dual_mode_fields.iter().cloned())
    }

    pub fn is_boolean_field(&self, field: &str) -> bool {
        self.boolean_fields.contains(field)
    }

    /// Bind WHERE terms in text order. Terms the parser could not read
    /// consume their params and are dropped.
    pub fn bind(&self, conditions: &[Condition], binder: &mut Binder<'_>) -> Vec<Predicate> {
        let mut predicates = Vec::with_capacity(conditions.len());

        for condition in conditions {
            match condition {
                Condition::Compare { field, op, value } => {
                    let value = binder.bind(value).unwrap_or(Value::Null);
                    let predicate = match op {
                        CompareOp::Like | CompareOp::NotLike => Predicate::Like {
                            field: field.clone(),
                            pattern: value.as_str().and_then(like_pattern),
                            negated: *op == CompareOp::NotLike,
                        },
                        _ => Predicate::Compare {
                            field: field.clone(),
                            op: *op,
                            value,
                        },
                    };
                    predicates.push(predicate);
                }
                Condition::IsNull { field, negated } => predicates.push(Predicate::IsNull {
                    field: field.clone(),
                    negated: *negated,
                }),
                Condition::Unparsed { text, placeholders } => {
                    tracing::debug!("Ignoring unreadable WHERE term {:?}", text);
                    binder.skip(placeholders);
                }
            }
        }

        predicates
    }

    /// True when `record` satisfies every predicate
    pub fn matches(&self, record: &Record, predicates: &[Predicate]) -> bool {
        predicates.iter().all(|p| self.evaluate(record, p))
    }

    fn evaluate(&self, record: &Record, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::IsNull { field, negated } => {
                let is_null = record.get(field).map_or(true, Value::is_null);
                is_null != *negated
            }
            Predicate::Like { field, pattern, negated } => {
                let text = match record.get(field) {
                    Some(value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => to_display(value),
                    _ => return false,
                };
                pattern.as_ref().is_some_and(|re| re.is_match(&text) != *negated)
            }
            Predicate::Compare { field, op, value } => {
                let actual = match record.get(field) {
                    None | Some(Value::Null) => return *op == CompareOp::Ne && !value.is_null(),
                    Some(actual) => actual,
                };
                self.compare(field, actual, *op, value)
            }
        }
    }

    fn compare(&self, field: &str, actual: &Value, op: CompareOp, operand: &Value) -> bool {
        let equal = || {
            if self.boolean_fields.contains(field) {
                let operand = coerce_bool(operand).map(Value::Bool).unwrap_or_else(|| operand.clone());
                actual == &operand
            } else if self.dual_mode_fields.contains(field) {
                dual_mode_eq(actual, operand)
            } else {
                loose_eq(actual, operand)
            }
        };

        match op {
            CompareOp::Eq => equal(),
            CompareOp::Ne => !equal(),
            CompareOp::Gt => numeric_cmp(actual, operand).is_some_and(Ordering::is_gt),
            CompareOp::Lt => numeric_cmp(actual, operand).is_some_and(Ordering::is_lt),
            CompareOp::Ge => numeric_cmp(actual, operand).is_some_and(Ordering::is_ge),
            CompareOp::Le => numeric_cmp(actual, operand).is_some_and(Ordering::is_le),
            // LIKE is bound to Predicate::Like
            CompareOp::Like | CompareOp::NotLike => false,
        }
    }
}

/// `true/false/1/0/'1'/'0'` (and `'true'/'false'`) as a boolean
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `%` matches any run of characters; the match is unanchored
fn like_pattern(pattern: &str) -> Option<Regex> {
    let source = regex::escape(pattern).replace('%', ".*");
    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::debug!("Unusable LIKE pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Equal as strings or as numbers
fn dual_mode_eq(a: &Value, b: &Value) -> bool {
    if to_display(a) == to_display(b) {
        return true;
    }
    let (x, y) = (to_number(a), to_number(b));
    !x.is_nan() && x == y
}

/// Loose equality: numbers equal their numeric strings, booleans compare as 0/1
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::Number(_)) => to_number(a) == to_number(b),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        // Mixed scalars compare numerically; NaN never equals anything
        _ => to_number(a) == to_number(b),
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    to_number(a).partial_cmp(&to_number(b))
}

/// Numeric reading of a value; NaN when there is none
pub(crate) fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// String reading of a scalar; integral floats print without a fraction
pub(crate) fn to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Ordering for ORDER BY: missing and null first, then numbers, then strings
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = |v: Option<&Value>| match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) | Some(Value::Number(_)) => 1,
        Some(v @ Value::String(_)) if !to_number(v).is_nan() => 1,
        Some(Value::String(_)) => 2,
        Some(_) => 3,
    };

    match (rank(a), rank(b)) {
        (1, 1) => {
            let (x, y) = (a.map_or(0.0, to_number), b.map_or(0.0, to_number));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (2, 2) => a.and_then(Value::as_str).cmp(&b.and_then(Value::as_str)),
        (ra, rb) => ra.cmp(&rb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filesql::{Operand, Placeholder};
    use serde_json::json;

    use crate::query::params::Params;

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn predicates(sql_where: &str, params: Value) -> Vec<Predicate> {
        let stmt = filesql::parse(&format!("SELECT * FROM t WHERE {}", sql_where)).unwrap();
        let filesql::Statement::Select(select) = stmt else { panic!("Expected Select") };
        let params = Params::from(params);
        let mut binder = Binder::new(&params);
        FilterRules::from_config(&Config::default()).bind(&select.where_clause, &mut binder)
    }

    fn matches(record: Value, sql_where: &str, params: Value) -> bool {
        let rules = FilterRules::from_config(&Config::default());
        rules.matches(&rec(record), &predicates(sql_where, params))
    }

    #[test]
    fn test_dual_mode_ids() {
        for param in [json!(5), json!("5")] {
            assert!(matches(json!({"user_id": "5"}), "user_id = ?", json!([param.clone()])));
            assert!(matches(json!({"user_id": 5}), "user_id = ?", json!([param.clone()])));
            assert!(!matches(json!({"user_id": 6}), "user_id = ?", json!([param])));
        }
        assert!(matches(json!({"role_id": 80.0}), "role_id = ?", json!(["80"])));
        assert!(matches(json!({"role_id": 80}), "role_id != ?", json!([81])));
    }

    #[test]
    fn test_missing_field_null_safety() {
        let record = json!({"user_id": 1});
        assert!(!matches(record.clone(), "f = ?", json!([1])));
        assert!(!matches(record.clone(), "f > ?", json!([0])));
        assert!(!matches(record.clone(), "f <= ?", json!([100])));
        assert!(!matches(record.clone(), "f LIKE ?", json!(["%"])));
        assert!(matches(record.clone(), "f != ?", json!([1])));
        assert!(matches(record.clone(), "f <> 'x'", json!([])));
        assert!(!matches(record.clone(), "f != ?", json!([null])));
        assert!(matches(json!({"f": null}), "f != ?", json!([2])));
    }

    #[test]
    fn test_is_null() {
        assert!(matches(json!({"a": 1}), "b IS NULL", json!([])));
        assert!(matches(json!({"b": null}), "b IS NULL", json!([])));
        assert!(!matches(json!({"b": 0}), "b IS NULL", json!([])));
        assert!(matches(json!({"access": 4}), "access IS NOT NULL", json!([])));
    }

    #[test]
    fn test_status_coercion() {
        assert!(matches(json!({"status": true}), "status = 1", json!([])));
        assert!(matches(json!({"status": true}), "status = ?", json!(["1"])));
        assert!(matches(json!({"status": false}), "status = ?", json!(["false"])));
        assert!(!matches(json!({"status": false}), "status = ?", json!([1])));
        // Strict once coerced: a stored number is not a boolean
        assert!(!matches(json!({"status": 1}), "status = ?", json!([true])));
    }

    #[test]
    fn test_loose_equality() {
        assert!(matches(json!({"access": 4}), "access = ?", json!(["4"])));
        assert!(matches(json!({"name": "bob"}), "name = 'bob'", json!([])));
        assert!(!matches(json!({"name": "bob"}), "name = 'Bob'", json!([])));
        assert!(matches(json!({"flag": true}), "flag = 1", json!([])));
        assert!(!matches(json!({"name": "abc"}), "name = 0", json!([])));
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(matches(json!({"balance": "150"}), "balance > ?", json!([100])));
        assert!(matches(json!({"balance": 100}), "balance >= ?", json!(["100"])));
        assert!(!matches(json!({"balance": "lots"}), "balance > ?", json!([1])));
        assert!(matches(json!({"access": 2}), "access < 4 AND access > 1", json!([])));
    }

    #[test]
    fn test_like() {
        assert!(matches(json!({"nick": "SuperCat"}), "nick LIKE ?", json!(["%Cat%"])));
        assert!(matches(json!({"nick": "SuperCat"}), "nick LIKE 'per'", json!([])));
        assert!(!matches(json!({"nick": "SuperCat"}), "nick LIKE ?", json!(["dog%"])));
        assert!(matches(json!({"nick": "a.b"}), "nick LIKE ?", json!(["a.b"])));
        assert!(!matches(json!({"nick": "axb"}), "nick LIKE ?", json!(["a.b"])));
        assert!(matches(json!({"user_id": 1234}), "user_id LIKE ?", json!(["12%"])));
        assert!(!matches(json!({"user_id": 1234}), "user_id LIKE ?", json!(["56%"])));
        assert!(matches(json!({"flag": true}), "flag LIKE 'tr%'", json!([])));
        assert!(!matches(json!({"tags": ["a"]}), "tags LIKE ?", json!(["%a%"])));
        assert!(matches(json!({"nick": "cat"}), "nick NOT LIKE ?", json!(["dog"])));
    }

    #[test]
    fn test_unparsed_terms_consume_params() {
        let preds = predicates("(a = ? OR b = ?) AND c = ?", json!([1, 2, 3]));
        assert_eq!(preds.len(), 1);
        match &preds[0] {
            Predicate::Compare { field, value, .. } => {
                assert_eq!(field, "c");
                assert_eq!(value, &json!(3));
            }
            other => panic!("Expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_param_binds_null() {
        let params = Params::none();
        let mut binder = Binder::new(&params);
        let rules = FilterRules::default();
        let conditions = vec![Condition::Compare {
            field: "a".into(),
            op: CompareOp::Eq,
            value: Operand::Placeholder(Placeholder::Positional),
        }];
        let preds = rules.bind(&conditions, &mut binder);
        assert!(!rules.matches(&rec(json!({"a": 1})), &preds));
    }

    #[test]
    fn test_compare_values_order() {
        let mut values = vec![json!("b"), json!(10), Value::Null, json!("2"), json!("a"), json!(1.5)];
        values.sort_by(|a, b| compare_values(Some(a), Some(b)));
        assert_eq!(values, vec![Value::Null, json!(1.5), json!("2"), json!(10), json!("a"), json!("b")]);
    }
}
