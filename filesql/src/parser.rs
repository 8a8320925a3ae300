//! Statement parser using nom
//!
//! A statement is classified by its leading keyword, cut into clauses by
//! the quote-aware scanner, and each clause body is parsed with nom.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{anychar, char, digit1, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::ast::*;
use crate::error::{nom_message, ParseError};
use crate::scan::{find_keyword, placeholders, split_conjunction, split_top_level};

/// Parse a complete statement
pub fn parse_statement(input: &str) -> Result<Statement, ParseError> {
    let input = input.trim().trim_end_matches(';').trim_end();
    let (rest, kind) = leading_keyword(input).map_err(|_| ParseError::unsupported(input))?;

    let parsed = match kind {
        StatementKind::Select => select_stmt(rest).map(Statement::Select),
        StatementKind::Insert => insert_stmt(rest).map(Statement::Insert),
        StatementKind::Update => update_stmt(rest).map(Statement::Update),
        StatementKind::Delete => delete_stmt(rest).map(Statement::Delete),
        StatementKind::CreateTable => create_table_stmt(rest).map(Statement::CreateTable),
        StatementKind::ShowTables => Ok(Statement::ShowTables),
    };

    parsed.map_err(|message| ParseError::Malformed { kind, message })
}

/// Classify a statement by its leading keyword without parsing the rest
pub fn classify_statement(input: &str) -> Option<StatementKind> {
    leading_keyword(input.trim_start()).ok().map(|(_, kind)| kind)
}

fn leading_keyword(input: &str) -> IResult<&str, StatementKind> {
    alt((
        value(
            StatementKind::Insert,
            tuple((keyword("insert"), multispace1, keyword("into"))),
        ),
        value(StatementKind::Select, keyword("select")),
        value(StatementKind::Update, keyword("update")),
        value(StatementKind::Delete, keyword("delete")),
        value(
            StatementKind::CreateTable,
            tuple((keyword("create"), multispace1, keyword("table"))),
        ),
        value(
            StatementKind::ShowTables,
            tuple((keyword("show"), multispace1, keyword("tables"))),
        ),
    ))(input)
}

// ============================================================================
// Clause splitting
// ============================================================================

const TAIL_KEYWORDS: [&str; 6] = ["where", "group by", "having", "order by", "limit", "offset"];

/// Clause bodies following a table name. `head` is whatever precedes the
/// first clause keyword.
#[derive(Debug, Default)]
struct Clauses<'a> {
    head: &'a str,
    where_body: Option<&'a str>,
    order_by: Option<&'a str>,
    limit: Option<&'a str>,
    offset: Option<&'a str>,
}

fn clauses(tail: &str) -> Clauses<'_> {
    let mut found: Vec<(usize, usize, &str)> = TAIL_KEYWORDS
        .iter()
        .filter_map(|k| find_keyword(tail, k).map(|(start, end)| (start, end, *k)))
        .collect();
    found.sort_by_key(|(start, _, _)| *start);

    let mut clauses = Clauses {
        head: tail[..found.first().map_or(tail.len(), |f| f.0)].trim(),
        ..Default::default()
    };

    for (i, (_, end, keyword)) in found.iter().enumerate() {
        let stop = found.get(i + 1).map_or(tail.len(), |next| next.0);
        let body = tail[*end..stop].trim();
        match *keyword {
            "where" => clauses.where_body = Some(body),
            "order by" => clauses.order_by = Some(body),
            "limit" => clauses.limit = Some(body),
            "offset" => clauses.offset = Some(body),
            // GROUP BY and HAVING are accepted and ignored
            _ => {}
        }
    }

    clauses
}

fn where_conditions(body: Option<&str>) -> Vec<Condition> {
    body.map(|b| split_conjunction(b).into_iter().map(parse_condition).collect())
        .unwrap_or_default()
}

// ============================================================================
// SELECT
// ============================================================================

fn select_stmt(rest: &str) -> Result<SelectStmt, String> {
    let (start, end) = find_keyword(rest, "from").ok_or_else(|| "missing FROM clause".to_string())?;
    let list = rest[..start].trim();
    let columns = if list.is_empty() {
        Vec::new()
    } else {
        split_top_level(list, b',').into_iter().map(select_column).collect()
    };

    let (tail, from) = preceded(multispace0, identifier)(&rest[end..]).map_err(nom_message)?;
    let clauses = clauses(tail);

    let order_by = clauses
        .order_by
        .map(|body| {
            split_top_level(body, b',')
                .into_iter()
                .filter_map(|item| all_consuming(order_by_item)(item).ok().map(|(_, o)| o))
                .collect()
        })
        .unwrap_or_default();

    let limit = clauses.limit.map(limit_clause).transpose()?;
    let offset = clauses.offset.map(whole_operand).transpose()?;

    Ok(SelectStmt {
        columns,
        from,
        where_clause: where_conditions(clauses.where_body),
        order_by,
        limit,
        offset,
    })
}

fn select_column(text: &str) -> Column {
    if text == "*" {
        return Column::Star;
    }
    if let Ok((_, alias)) = all_consuming(count_star)(text) {
        return Column::CountStar { alias };
    }
    if let Ok((_, name)) = all_consuming(identifier)(text) {
        return Column::Field(name);
    }
    Column::Other(text.to_string())
}

fn count_star(input: &str) -> IResult<&str, Option<String>> {
    let (input, _) = tuple((
        keyword("count"),
        multispace0,
        char('('),
        multispace0,
        alt((tag("*"), tag("1"))),
        multispace0,
        char(')'),
    ))(input)?;
    opt(preceded(
        pair(multispace1, opt(terminated(keyword("as"), multispace1))),
        identifier,
    ))(input)
}

fn order_by_item(input: &str) -> IResult<&str, OrderBy> {
    let (input, column) = identifier(input)?;
    let (input, dir) = opt(preceded(
        multispace1,
        alt((
            value(OrderDirection::Asc, keyword("asc")),
            value(OrderDirection::Desc, keyword("desc")),
        )),
    ))(input)?;

    Ok((input, OrderBy {
        column,
        direction: dir.unwrap_or_default(),
    }))
}

fn limit_clause(body: &str) -> Result<Limit, String> {
    match split_top_level(body, b',').as_slice() {
        [count] => Ok(Limit {
            offset: None,
            count: whole_operand(count)?,
        }),
        [offset, count] => Ok(Limit {
            offset: Some(whole_operand(offset)?),
            count: whole_operand(count)?,
        }),
        _ => Err(format!("unreadable LIMIT clause {:?}", body)),
    }
}

// ============================================================================
// INSERT
// ============================================================================

fn insert_stmt(rest: &str) -> Result<InsertStmt, String> {
    let (body, into) = preceded(multispace0, identifier)(rest).map_err(nom_message)?;

    let (body, on_duplicate) = match find_keyword(body, "on duplicate key update") {
        Some((start, _)) => (&body[..start], true),
        None => (body, false),
    };
    let body = body.trim();

    let source = if body.is_empty() {
        InsertSource::Object
    } else if body.starts_with('(') {
        column_source(body)?
    } else if let Ok((assignments, _)) = terminated(keyword("set"), multispace0)(body) {
        set_source(assignments)?
    } else if let Ok((values, _)) = terminated(keyword("values"), multispace0)(body) {
        all_consuming(placeholder)(values.trim())
            .map(|_| InsertSource::Object)
            .map_err(nom_message)?
    } else {
        return Err(format!("unexpected input near {:?}", body.chars().take(20).collect::<String>()));
    };

    Ok(InsertStmt {
        into,
        source,
        on_duplicate,
    })
}

fn column_source(body: &str) -> Result<InsertSource, String> {
    let (after, columns) = column_list(body).map_err(nom_message)?;
    let values = find_keyword(after, "values")
        .and_then(|(_, end)| operand_list(&after[end..]))
        .filter(|values| values.len() == columns.len());

    Ok(InsertSource::Columns { columns, values })
}

fn column_list(input: &str) -> IResult<&str, Vec<String>> {
    delimited(
        pair(char('('), multispace0),
        separated_list1(tuple((multispace0, char(','), multispace0)), identifier),
        pair(multispace0, char(')')),
    )(input)
}

/// `( operand, ... )`, or `None` if any entry is not a plain operand
fn operand_list(text: &str) -> Option<Vec<Operand>> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    split_top_level(inner, b',')
        .into_iter()
        .map(|item| all_consuming(operand)(item).ok().map(|(_, o)| o))
        .collect()
}

fn set_source(text: &str) -> Result<InsertSource, String> {
    let text = text.trim();
    if all_consuming(placeholder)(text).is_ok() {
        return Ok(InsertSource::Object);
    }

    split_top_level(text, b',')
        .into_iter()
        .map(|item| {
            all_consuming(assignment)(item)
                .map(|(_, a)| a)
                .map_err(nom_message)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(InsertSource::Assignments)
}

fn assignment(input: &str) -> IResult<&str, Assignment> {
    let (input, column) = identifier(input)?;
    let (input, _) = tuple((multispace0, char('='), multispace0))(input)?;
    let (input, value) = operand(input)?;

    Ok((input, Assignment { column, value }))
}

// ============================================================================
// UPDATE
// ============================================================================

fn update_stmt(rest: &str) -> Result<UpdateStmt, String> {
    let (after, table) = preceded(multispace0, identifier)(rest).map_err(nom_message)?;
    let (_, set_end) = find_keyword(after, "set").ok_or_else(|| "missing SET clause".to_string())?;
    let clauses = clauses(&after[set_end..]);

    // Assignments the grammar cannot read are dropped, their placeholders still count
    let set = split_top_level(clauses.head, b',')
        .into_iter()
        .filter_map(|item| all_consuming(assignment)(item).ok().map(|(_, a)| a))
        .collect();

    Ok(UpdateStmt {
        table,
        set,
        set_placeholders: placeholders(clauses.head).len(),
        where_clause: where_conditions(clauses.where_body),
    })
}

// ============================================================================
// DELETE
// ============================================================================

fn delete_stmt(rest: &str) -> Result<DeleteStmt, String> {
    let (tail, from) = preceded(
        tuple((multispace1, keyword("from"), multispace1)),
        identifier,
    )(rest)
    .map_err(nom_message)?;

    Ok(DeleteStmt {
        from,
        where_clause: where_conditions(clauses(tail).where_body),
    })
}

// ============================================================================
// CREATE TABLE
// ============================================================================

fn create_table_stmt(rest: &str) -> Result<CreateTableStmt, String> {
    let (_, (if_not_exists, name)) = preceded(
        multispace1,
        pair(
            opt(tuple((
                keyword("if"),
                multispace1,
                keyword("not"),
                multispace1,
                keyword("exists"),
                multispace1,
            ))),
            identifier,
        ),
    )(rest)
    .map_err(nom_message)?;

    Ok(CreateTableStmt {
        name,
        if_not_exists: if_not_exists.is_some(),
    })
}

// ============================================================================
// Conditions
// ============================================================================

/// Parse one WHERE term, falling back to `Condition::Unparsed`
pub(crate) fn parse_condition(text: &str) -> Condition {
    match all_consuming(delimited(multispace0, condition, multispace0))(text) {
        Ok((_, cond)) => cond,
        Err(_) => Condition::Unparsed {
            text: text.to_string(),
            placeholders: placeholders(text),
        },
    }
}

fn condition(input: &str) -> IResult<&str, Condition> {
    alt((is_null_condition, like_condition, compare_condition))(input)
}

fn is_null_condition(input: &str) -> IResult<&str, Condition> {
    let (input, field) = identifier(input)?;
    let (input, _) = tuple((multispace1, keyword("is"), multispace1))(input)?;
    let (input, negated) = opt(terminated(keyword("not"), multispace1))(input)?;
    let (input, _) = keyword("null")(input)?;

    Ok((input, Condition::IsNull {
        field,
        negated: negated.is_some(),
    }))
}

fn like_condition(input: &str) -> IResult<&str, Condition> {
    let (input, field) = identifier(input)?;
    let (input, _) = multispace1(input)?;
    let (input, negated) = opt(terminated(keyword("not"), multispace1))(input)?;
    let (input, _) = keyword("like")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = operand(input)?;

    let op = if negated.is_some() { CompareOp::NotLike } else { CompareOp::Like };
    Ok((input, Condition::Compare { field, op, value }))
}

fn compare_condition(input: &str) -> IResult<&str, Condition> {
    let (input, field) = identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = compare_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = operand(input)?;

    Ok((input, Condition::Compare { field, op, value }))
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Ne, alt((tag("!="), tag("<>")))),
        value(CompareOp::Eq, tag("=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Gt, tag(">")),
    ))(input)
}

// ============================================================================
// Primitives
// ============================================================================

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive keyword that does not run into a following word
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(word), not(satisfy(is_word_char)))
}

fn bare_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(is_word_char)(input)
}

/// Table or column name, optionally backtick-quoted, folded to lower case
fn identifier(input: &str) -> IResult<&str, String> {
    map(
        alt((delimited(char('`'), bare_identifier, char('`')), bare_identifier)),
        |s: &str| s.to_lowercase(),
    )(input)
}

fn whole_operand(text: &str) -> Result<Operand, String> {
    all_consuming(operand)(text.trim())
        .map(|(_, o)| o)
        .map_err(nom_message)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(placeholder, Operand::Placeholder),
        map(literal, Operand::Literal),
    ))(input)
}

fn placeholder(input: &str) -> IResult<&str, Placeholder> {
    alt((
        value(Placeholder::Positional, char('?')),
        map(preceded(char(':'), take_while1(is_word_char)), |name: &str| {
            Placeholder::Named(name.to_string())
        }),
    ))(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Null, keyword("null")),
        value(Literal::Bool(true), keyword("true")),
        value(Literal::Bool(false), keyword("false")),
        map(float_literal, Literal::Float),
        map(integer_literal, Literal::Int),
        map(string_literal, Literal::String),
    ))(input)
}

fn integer_literal(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

fn float_literal(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        str::parse::<f64>,
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((quoted('\''), quoted('"')))(input)
}

/// A string delimited by `q`; the quote is escaped by doubling it or with
/// a backslash
fn quoted<'a>(q: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    move |input: &'a str| {
        delimited(
            char(q),
            map(
                many0(alt((
                    map(pair(char(q), char(q)), move |_| q),
                    preceded(
                        char('\\'),
                        alt((value('\n', char('n')), value('\t', char('t')), anychar)),
                    ),
                    satisfy(move |c| c != q && c != '\\'),
                ))),
                |chars: Vec<char>| chars.into_iter().collect::<String>(),
            ),
            char(q),
        )(input)
    }
}
