//! Statement execution

use filesql::{
    CreateTableStmt, DeleteStmt, InsertSource, InsertStmt, Operand, OrderBy, OrderDirection,
    Placeholder, SelectStmt, Statement, UpdateStmt,
};
use serde_json::Value;

use super::filter::{coerce_bool, compare_values};
use super::params::{Binder, Params};
use super::{QueryEngine, QueryResult, WriteSummary};
use crate::error::{Error, Result};
use crate::storage::Record;

/// Execute a parsed statement
pub async fn execute(engine: &QueryEngine, stmt: Statement, params: &Params) -> Result<QueryResult> {
    match stmt {
        Statement::Select(select) => execute_select(engine, select, params).await,
        Statement::Insert(insert) => execute_insert(engine, insert, params).await,
        Statement::Update(update) => execute_update(engine, update, params).await,
        Statement::Delete(delete) => execute_delete(engine, delete, params).await,
        Statement::CreateTable(create) => execute_create_table(engine, create).await,
        Statement::ShowTables => execute_show_tables(engine).await,
    }
}

async fn execute_select(engine: &QueryEngine, stmt: SelectStmt, params: &Params) -> Result<QueryResult> {
    // Bind in text order: WHERE, then LIMIT [offset,] count, then OFFSET
    let mut binder = Binder::new(params);
    let predicates = engine.filter.bind(&stmt.where_clause, &mut binder);
    let limit_offset = stmt
        .limit
        .as_ref()
        .and_then(|l| l.offset.as_ref())
        .and_then(|o| binder.bind(o));
    let limit = stmt.limit.as_ref().and_then(|l| binder.bind(&l.count));
    let offset = stmt.offset.as_ref().and_then(|o| binder.bind(o)).or(limit_offset);

    let mut scan = engine.store.scan(&stmt.from)?;
    let mut rows = Vec::new();
    while let Some((_, record)) = scan.next().await? {
        if engine.filter.matches(&record, &predicates) {
            rows.push(record);
        }
    }

    if let Some(alias) = stmt.count_alias() {
        let mut row = Record::new();
        row.insert(alias.to_string(), Value::from(rows.len()));
        return Ok(QueryResult::Rows(vec![row]));
    }

    if !stmt.order_by.is_empty() {
        sort_rows(&mut rows, &stmt.order_by);
    }

    let skip = offset.as_ref().and_then(as_count).unwrap_or(0);
    let rows = rows.into_iter().skip(skip);
    let rows = match limit.as_ref().and_then(as_count) {
        Some(n) => rows.take(n).collect(),
        None => rows.collect(),
    };

    Ok(QueryResult::Rows(rows))
}

async fn execute_insert(engine: &QueryEngine, stmt: InsertStmt, params: &Params) -> Result<QueryResult> {
    let store = &engine.store;
    let table = stmt.into.as_str();
    let mut record = insert_record(&stmt, params)?;

    if record.is_empty() {
        return Err(Error::InvalidInsertData {
            table: stmt.into.clone(),
            reason: "no fields to insert",
        });
    }

    if store.is_auto_increment(table) {
        let id = store.next_id(table).await?;
        record.insert("id".to_string(), Value::from(id));
        store.put(table, &id.to_string(), &record).await?;
        return Ok(inserted(Value::from(id)));
    }

    let Some(identity) = engine.identity.resolve(table, &record) else {
        let key = store.put_generated(table, &record).await?;
        let insert_id = key.parse::<i64>().map(Value::from).unwrap_or(Value::String(key));
        return Ok(inserted(insert_id));
    };

    let _guard = store.lock(table, &identity.key).await;
    let merged = match (stmt.on_duplicate, store.get(table, &identity.key).await?) {
        (true, Some(mut existing)) => {
            existing.extend(record);
            existing
        }
        _ => record,
    };
    store.put(table, &identity.key, &merged).await?;

    Ok(inserted(identity.value))
}

/// Fields of the record an INSERT writes
fn insert_record(stmt: &InsertStmt, params: &Params) -> Result<Record> {
    if !matches!(stmt.source, InsertSource::Assignments(_)) {
        if let Some(object) = params.object_param() {
            return Ok(object.clone());
        }
    }

    let record = match &stmt.source {
        InsertSource::Object => match params {
            Params::Named(map) => map.clone(),
            Params::Positional(_) => {
                return Err(Error::InvalidInsertData {
                    table: stmt.into.clone(),
                    reason: "the first param must be an object",
                })
            }
        },
        InsertSource::Columns { columns, values: Some(values) } => {
            let mut binder = Binder::new(params);
            columns
                .iter()
                .zip(values)
                .filter_map(|(column, value)| binder.bind(value).map(|v| (column.clone(), v)))
                .collect()
        }
        InsertSource::Columns { columns, values: None } => params.zip_columns(columns),
        InsertSource::Assignments(assignments) => {
            let mut binder = Binder::new(params);
            assignments
                .iter()
                .filter_map(|a| binder.bind(&a.value).map(|v| (a.column.clone(), v)))
                .collect()
        }
    };

    Ok(record)
}

fn inserted(insert_id: Value) -> QueryResult {
    QueryResult::Affected(WriteSummary {
        affected_rows: 1,
        insert_id: Some(insert_id),
    })
}

async fn execute_update(engine: &QueryEngine, stmt: UpdateStmt, params: &Params) -> Result<QueryResult> {
    let store = &engine.store;
    let table = stmt.table.as_str();

    // Never create a table as a side effect of an UPDATE
    if !store.table_exists(table).await? {
        return Ok(QueryResult::Affected(WriteSummary::affected(0)));
    }

    // With an object first param, SET values come from it by column name and
    // WHERE params start at index 1. Otherwise SET consumes params first.
    let (assignments, where_start): (Vec<(String, Value)>, usize) = match params.object_param() {
        Some(object) => {
            let assignments = stmt
                .set
                .iter()
                .filter_map(|a| {
                    let value = match &a.value {
                        Operand::Literal(lit) => Some(lit.to_json()),
                        Operand::Placeholder(Placeholder::Positional) => object.get(&a.column).cloned(),
                        Operand::Placeholder(Placeholder::Named(name)) => object.get(name).cloned(),
                    };
                    value.map(|v| (a.column.clone(), v))
                })
                .collect();
            (assignments, 1)
        }
        None => {
            let mut binder = Binder::new(params);
            let assignments = stmt
                .set
                .iter()
                .filter_map(|a| binder.bind(&a.value).map(|v| (a.column.clone(), v)))
                .collect();
            (assignments, stmt.set_placeholders)
        }
    };

    let mut binder = Binder::starting_at(params, where_start);
    let predicates = engine.filter.bind(&stmt.where_clause, &mut binder);

    let mut affected = 0;
    for key in matching_keys(engine, table, &predicates).await? {
        let _guard = store.lock(table, &key).await;

        // Re-check under the lock; the record may have changed since the scan
        let Some(mut record) = store.get(table, &key).await? else {
            continue;
        };
        if !engine.filter.matches(&record, &predicates) {
            continue;
        }

        for (column, value) in &assignments {
            let value = assigned_value(engine, column, record.get(column), value);
            record.insert(column.clone(), value);
        }
        store.put(table, &key, &record).await?;
        affected += 1;
    }

    Ok(QueryResult::Affected(WriteSummary::affected(affected)))
}

/// Boolean targets keep their type: `true/'true'/1/'1'` is true, anything
/// else false
fn assigned_value(engine: &QueryEngine, column: &str, existing: Option<&Value>, new: &Value) -> Value {
    match existing {
        Some(Value::Bool(_)) => Value::Bool(coerce_bool(new) == Some(true)),
        _ if engine.filter.is_boolean_field(column) => {
            coerce_bool(new).map(Value::Bool).unwrap_or_else(|| new.clone())
        }
        _ => new.clone(),
    }
}

async fn execute_delete(engine: &QueryEngine, stmt: DeleteStmt, params: &Params) -> Result<QueryResult> {
    let store = &engine.store;
    let table = stmt.from.as_str();

    let mut binder = Binder::new(params);
    let predicates = engine.filter.bind(&stmt.where_clause, &mut binder);

    let mut affected = 0;
    for key in matching_keys(engine, table, &predicates).await? {
        let _guard = store.lock(table, &key).await;
        let still_matches = store
            .get(table, &key)
            .await?
            .is_some_and(|record| engine.filter.matches(&record, &predicates));
        if still_matches && store.remove(table, &key).await? {
            affected += 1;
        }
    }

    Ok(QueryResult::Affected(WriteSummary::affected(affected)))
}

async fn matching_keys(
    engine: &QueryEngine,
    table: &str,
    predicates: &[super::Predicate],
) -> Result<Vec<String>> {
    let mut scan = engine.store.scan(table)?;
    let mut keys = Vec::new();
    while let Some((key, record)) = scan.next().await? {
        if engine.filter.matches(&record, predicates) {
            keys.push(key);
        }
    }
    Ok(keys)
}

async fn execute_create_table(engine: &QueryEngine, stmt: CreateTableStmt) -> Result<QueryResult> {
    engine.store.ensure_table(&stmt.name).await?;
    Ok(QueryResult::Affected(WriteSummary::affected(0)))
}

async fn execute_show_tables(engine: &QueryEngine) -> Result<QueryResult> {
    let store = &engine.store;
    let database = store
        .root()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("filedb")
        .to_string();

    Ok(QueryResult::Tables {
        database,
        names: store.tables().await?,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn sort_rows(rows: &mut [Record], order_by: &[OrderBy]) {
    rows.sort_by(|a, b| {
        for order in order_by {
            let cmp = compare_values(a.get(&order.column), b.get(&order.column));
            if cmp != std::cmp::Ordering::Equal {
                return match order.direction {
                    OrderDirection::Asc => cmp,
                    OrderDirection::Desc => cmp.reverse(),
                };
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// LIMIT / OFFSET operand as a count
fn as_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
