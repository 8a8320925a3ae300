//! filesql - the SQL subset understood by the filedb record store
//!
//! Statements are parsed into a closed set of variants so the interpreter
//! never re-derives structure from the query text at execution time.
//!
//! # Syntax Overview
//!
//! ```sql
//! -- Insert by column list; params are bound to placeholders in text order
//! INSERT INTO roles_100 (user_id, role_id) VALUES (?, ?);
//!
//! -- Insert a whole record passed as the first param, merging on conflict
//! INSERT INTO conference SET ? ON DUPLICATE KEY UPDATE spam = VALUES(spam);
//!
//! -- Filter with AND-combined predicates
//! SELECT * FROM sysadmins WHERE access >= 2 AND userid != :me ORDER BY access DESC LIMIT 10;
//!
//! -- Count matches
//! SELECT COUNT(*) AS count FROM vip_users WHERE is_permanent = 1;
//!
//! -- Update with placeholders and literals
//! UPDATE conference SET spam = ?, links = 0 WHERE conference_id = ?;
//!
//! DELETE FROM sysbanned WHERE userid = ?;
//! CREATE TABLE IF NOT EXISTS tickets (id INT);
//! SHOW TABLES;
//! ```
//!
//! Table and column names are case-folded to lower case. WHERE terms the
//! grammar cannot read are kept as [`Condition::Unparsed`] so their
//! placeholders still line up with the params.

mod ast;
mod error;
mod parser;
mod scan;

pub use ast::*;
pub use error::ParseError;

/// Parse a statement string into an AST
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    parser::parse_statement(input)
}

/// Statement kind from the leading keyword, or `None` if unsupported
pub fn classify(input: &str) -> Option<StatementKind> {
    parser::classify_statement(input)
}

/// Placeholders (`?` and `:name`) outside string literals, in text order
pub fn placeholders(input: &str) -> Vec<Placeholder> {
    scan::placeholders(input)
}
