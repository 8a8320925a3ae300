//! Query parameters and placeholder binding

use filesql::{Operand, Placeholder};
use serde_json::{Map, Value};

use crate::storage::Record;

/// Parameters supplied with a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Consumed by placeholders in text order
    Positional(Vec<Value>),
    /// Looked up by `:name`
    Named(Map<String, Value>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    pub fn none() -> Self {
        Self::default()
    }

    /// The first positional param when it is an object.
    ///
    /// INSERT and UPDATE take their field values from it.
    pub fn object_param(&self) -> Option<&Record> {
        match self {
            Params::Positional(values) => values.first().and_then(Value::as_object),
            Params::Named(_) => None,
        }
    }

    /// Pair `columns` with the params in order, for INSERT column lists
    /// whose VALUES clause could not be read
    pub(crate) fn zip_columns(&self, columns: &[String]) -> Record {
        match self {
            Params::Positional(values) => columns.iter().cloned().zip(values.iter().cloned()).collect(),
            Params::Named(map) => columns
                .iter()
                .filter_map(|c| map.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Named(map)
    }
}

impl From<Value> for Params {
    /// Arrays are positional, objects are named, `null` is no params and any
    /// other scalar is a single positional param
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => Params::Positional(values),
            Value::Object(map) => Params::Named(map),
            Value::Null => Params::default(),
            scalar => Params::Positional(vec![scalar]),
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::default()
    }
}

/// Resolves operands against params, consuming positional params in order
#[derive(Debug)]
pub struct Binder<'p> {
    params: &'p Params,
    cursor: usize,
}

impl<'p> Binder<'p> {
    pub fn new(params: &'p Params) -> Self {
        Self::starting_at(params, 0)
    }

    /// Binder whose first positional placeholder takes `params[cursor]`
    pub fn starting_at(params: &'p Params, cursor: usize) -> Self {
        Self { params, cursor }
    }

    /// Value of an operand; `None` when a placeholder has no param
    pub fn bind(&mut self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Literal(lit) => Some(lit.to_json()),
            Operand::Placeholder(p) => self.placeholder(p),
        }
    }

    /// Consume placeholders whose values are not needed
    pub fn skip(&mut self, placeholders: &[Placeholder]) {
        for p in placeholders {
            self.placeholder(p);
        }
    }

    fn placeholder(&mut self, placeholder: &Placeholder) -> Option<Value> {
        match self.params {
            Params::Positional(values) => {
                let value = values.get(self.cursor).cloned();
                self.cursor += 1;
                value
            }
            Params::Named(map) => match placeholder {
                Placeholder::Named(name) => map.get(name).cloned(),
                Placeholder::Positional => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filesql::Literal;
    use serde_json::json;

    const POS: Operand = Operand::Placeholder(Placeholder::Positional);

    fn named(name: &str) -> Operand {
        Operand::Placeholder(Placeholder::Named(name.to_string()))
    }

    #[test]
    fn test_positional_binding() {
        let params = Params::from(json!([1, "two"]));
        let mut binder = Binder::new(&params);
        assert_eq!(binder.bind(&POS), Some(json!(1)));
        assert_eq!(binder.bind(&Operand::Literal(Literal::Int(9))), Some(json!(9)));
        assert_eq!(binder.bind(&named("x")), Some(json!("two")));
        assert_eq!(binder.bind(&POS), None);
    }

    #[test]
    fn test_named_binding() {
        let params = Params::from(json!({"peer": 5, "user": 7}));
        let mut binder = Binder::new(&params);
        assert_eq!(binder.bind(&named("user")), Some(json!(7)));
        assert_eq!(binder.bind(&named("peer")), Some(json!(5)));
        assert_eq!(binder.bind(&named("missing")), None);
        assert_eq!(binder.bind(&POS), None);
    }

    #[test]
    fn test_skip_and_offset() {
        let params = Params::from(json!([1, 2, 3]));
        let mut binder = Binder::starting_at(&params, 1);
        binder.skip(&[Placeholder::Positional]);
        assert_eq!(binder.bind(&POS), Some(json!(3)));
    }

    #[test]
    fn test_object_param() {
        let params = Params::from(vec![json!({"user_id": 1}), json!(2)]);
        assert_eq!(params.object_param().unwrap().get("user_id"), Some(&json!(1)));
        assert!(Params::from(json!([[1, 2]])).object_param().is_none());
        assert!(Params::from(json!({"a": 1})).object_param().is_none());
    }

    #[test]
    fn test_zip_columns() {
        let cols = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let record = Params::from(json!([1, 2])).zip_columns(&cols);
        assert_eq!(Value::Object(record), json!({"a": 1, "b": 2}));
    }
}
