//! Abstract Syntax Tree for the filedb SQL subset

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    ShowTables,
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
            Statement::CreateTable(_) => StatementKind::CreateTable,
            Statement::ShowTables => StatementKind::ShowTables,
        }
    }
}

/// Statement class, decided by the leading keyword alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    ShowTables,
}

impl StatementKind {
    /// True for statements that report `affectedRows`
    pub fn is_write(self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete | StatementKind::CreateTable
        )
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::CreateTable => "CREATE TABLE",
            StatementKind::ShowTables => "SHOW TABLES",
        };
        f.write_str(name)
    }
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStmt {
    /// Select list as written; rows are returned whole unless it is `COUNT(*)`
    pub columns: Vec<Column>,
    /// Table to select from
    pub from: String,
    /// AND-combined predicates (empty = every record)
    pub where_clause: Vec<Condition>,
    /// ORDER BY clauses
    pub order_by: Vec<OrderBy>,
    /// LIMIT clause, `LIMIT n` or `LIMIT offset, n`
    pub limit: Option<Limit>,
    /// OFFSET clause
    pub offset: Option<Operand>,
}

impl SelectStmt {
    /// Alias of a `COUNT(*)` select list, if this is a count query
    pub fn count_alias(&self) -> Option<&str> {
        self.columns.iter().find_map(|c| match c {
            Column::CountStar { alias } => Some(alias.as_deref().unwrap_or("count")),
            _ => None,
        })
    }
}

/// An entry in the select list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// All columns (*)
    Star,
    /// Named field
    Field(String),
    /// `COUNT(*) [AS alias]`
    CountStar { alias: Option<String> },
    /// Anything else, kept verbatim
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub offset: Option<Operand>,
    pub count: Operand,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStmt {
    pub into: String,
    pub source: InsertSource,
    /// `ON DUPLICATE KEY UPDATE` present
    pub on_duplicate: bool,
}

/// Where the inserted record comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertSource {
    /// `(cols) VALUES (...)`; `values` is `None` when the VALUES list could
    /// not be read, in which case params are zipped onto the columns
    Columns {
        columns: Vec<String>,
        values: Option<Vec<Operand>>,
    },
    /// `SET ?` or bare `INSERT INTO t`: the first param is the record
    Object,
    /// `SET a = ?, b = 'x'`
    Assignments(Vec<Assignment>),
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStmt {
    pub table: String,
    pub set: Vec<Assignment>,
    /// Placeholders written in the SET clause; positional WHERE params start after these
    pub set_placeholders: usize,
    pub where_clause: Vec<Condition>,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStmt {
    pub from: String,
    pub where_clause: Vec<Condition>,
}

/// CREATE TABLE statement; column definitions are discarded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableStmt {
    pub name: String,
    pub if_not_exists: bool,
}

/// `column = operand`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Operand,
}

/// One term of an AND-combined WHERE clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        value: Operand,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    /// A term the grammar does not understand. It never filters, but its
    /// placeholders still consume params.
    Unparsed {
        text: String,
        placeholders: Vec<Placeholder>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    /// `!=` and `<>`
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    NotLike,
}

/// Right-hand side of a predicate or assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Placeholder(Placeholder),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placeholder {
    /// `?`
    Positional,
    /// `:name`
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}
