/*!
# Embedded In-Memory Storage

[`MemoryStorage`] is an embedded, in-process implementation of
[`StorageBackend`](super::StorageBackend) covering exactly the statement
dialect the windowing layer emits:

- `CREATE OR REPLACE VIEW <name> AS SELECT * FROM <raw> [WHERE ...] ORDER BY timed DESC [LIMIT n]`
- `INSERT INTO <table> (<columns>) VALUES (<literals>)`
- `UPDATE <table> SET timed = <v> WHERE uid = '<uid>'`
- `DELETE FROM <table> WHERE uid = '<uid>'`
- `DROP VIEW [IF EXISTS] <name>`
- `SELECT timed FROM <table> WHERE uid = '<uid>'`
- `SELECT * FROM <table-or-view>`

Anything else is rejected with a syntax error. Views are live: the definition
is stored, not the rows, and every read re-evaluates it against the current
raw table and window-state row, so a state advance is immediately visible to
readers.

A single `RwLock` guards the engine. `execute_atomically` validates the whole
batch and applies it under one write-lock section, so concurrent readers see
either none or all of a raw-insert-plus-state-update pair.
*/

use super::{DataEnumerator, ResultSet, StorageBackend, StorageError};
use crate::sluice::stream::element::{DataField, FieldValue, StreamElement};
use log::trace;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

fn view_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^CREATE OR REPLACE VIEW (\w+) AS SELECT \* FROM (\w+)(?: WHERE timed <= \(SELECT timed FROM (\w+) WHERE uid = '([^']+)'\)(?: AND timed >= \(SELECT timed FROM \w+ WHERE uid = '[^']+'\) - (\d+))?)? ORDER BY timed DESC(?: LIMIT (\d+))?$",
        )
        .unwrap()
    })
}

fn insert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^INSERT INTO (\w+)\s*\(([^)]*)\)\s*VALUES\s*\((.*)\)$").unwrap()
    })
}

fn update_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^UPDATE (\w+) SET timed = (-?\d+) WHERE uid = '([^']+)'$").unwrap()
    })
}

fn delete_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^DELETE FROM (\w+) WHERE uid = '([^']+)'$").unwrap())
}

fn drop_view_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^DROP VIEW (IF EXISTS )?(\w+)$").unwrap())
}

fn select_timed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^SELECT timed FROM (\w+) WHERE uid = '([^']+)'$").unwrap()
    })
}

fn select_all_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^SELECT \* FROM (\w+)$").unwrap())
}

#[derive(Debug, Clone)]
struct Row {
    timed: i64,
    values: HashMap<String, FieldValue>,
}

#[derive(Debug, Clone)]
struct Table {
    fields: Vec<DataField>,
    rows: Vec<Row>,
}

/// A stored live-view definition, parsed from the emitted view statement.
#[derive(Debug, Clone)]
struct ViewDef {
    source: String,
    /// (state table, uid) bounding visible rows by the window-state row
    state_bound: Option<(String, String)>,
    /// trailing-duration lower bound in milliseconds, relative to the boundary
    history_ms: Option<i64>,
    /// row cap applied after ordering
    limit: Option<usize>,
}

#[derive(Default)]
struct Engine {
    tables: HashMap<String, Table>,
    views: HashMap<String, ViewDef>,
}

/// Parsed form of one update-style statement, validated before application.
enum Statement {
    CreateView(String, ViewDef),
    Insert {
        table: String,
        timed: i64,
        values: HashMap<String, FieldValue>,
    },
    Update {
        table: String,
        timed: i64,
        uid: String,
    },
    Delete {
        table: String,
        uid: String,
    },
    DropView { name: String, if_exists: bool },
}

/// Embedded in-memory storage backend.
pub struct MemoryStorage {
    engine: RwLock<Engine>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            engine: RwLock::new(Engine::default()),
        }
    }

    fn parse_statement(sql: &str) -> Result<Statement, StorageError> {
        let sql = sql.trim().trim_end_matches(';');
        if let Some(caps) = view_re().captures(sql) {
            let state_bound = match (caps.get(3), caps.get(4)) {
                (Some(table), Some(uid)) => {
                    Some((table.as_str().to_string(), uid.as_str().to_string()))
                }
                _ => None,
            };
            let def = ViewDef {
                source: caps[2].to_string(),
                state_bound,
                history_ms: caps.get(5).map(|m| m.as_str().parse().unwrap()),
                limit: caps.get(6).map(|m| m.as_str().parse().unwrap()),
            };
            return Ok(Statement::CreateView(caps[1].to_string(), def));
        }
        if let Some(caps) = insert_re().captures(sql) {
            let columns: Vec<String> = caps[2]
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            let literals = split_literals(&caps[3])
                .map_err(|msg| StorageError::syntax(sql, msg))?;
            if columns.len() != literals.len() {
                return Err(StorageError::syntax(
                    sql,
                    format!("{} columns but {} values", columns.len(), literals.len()),
                ));
            }
            let mut timed = None;
            let mut values = HashMap::new();
            for (column, literal) in columns.into_iter().zip(literals) {
                let value = parse_literal(&literal).map_err(|msg| StorageError::syntax(sql, msg))?;
                if column.eq_ignore_ascii_case("timed") {
                    timed = value.as_integer();
                } else {
                    values.insert(column, value);
                }
            }
            let timed = timed
                .ok_or_else(|| StorageError::syntax(sql, "missing timed column".to_string()))?;
            return Ok(Statement::Insert {
                table: caps[1].to_string(),
                timed,
                values,
            });
        }
        if let Some(caps) = update_re().captures(sql) {
            return Ok(Statement::Update {
                table: caps[1].to_string(),
                timed: caps[2].parse().map_err(|_| {
                    StorageError::syntax(sql, "timed value out of range".to_string())
                })?,
                uid: caps[3].to_string(),
            });
        }
        if let Some(caps) = delete_re().captures(sql) {
            return Ok(Statement::Delete {
                table: caps[1].to_string(),
                uid: caps[2].to_string(),
            });
        }
        if let Some(caps) = drop_view_re().captures(sql) {
            return Ok(Statement::DropView {
                name: caps[2].to_string(),
                if_exists: caps.get(1).is_some(),
            });
        }
        Err(StorageError::syntax(sql, "unrecognized statement".to_string()))
    }

    /// Validate a parsed statement against the current catalog.
    fn check(engine: &Engine, statement: &Statement, sql: &str) -> Result<(), StorageError> {
        match statement {
            Statement::CreateView(name, def) => {
                if engine.tables.contains_key(name) {
                    return Err(StorageError::RelationExists(name.clone()));
                }
                if !engine.tables.contains_key(&def.source) {
                    return Err(StorageError::UnknownRelation(def.source.clone()));
                }
                if let Some((state_table, _)) = &def.state_bound {
                    if !engine.tables.contains_key(state_table) {
                        return Err(StorageError::UnknownRelation(state_table.clone()));
                    }
                }
                Ok(())
            }
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => {
                if !engine.tables.contains_key(table) {
                    return Err(StorageError::UnknownRelation(table.clone()));
                }
                Ok(())
            }
            Statement::DropView { name, if_exists } => {
                if !if_exists && !engine.views.contains_key(name) {
                    return Err(StorageError::execution(
                        sql,
                        format!("view '{}' does not exist", name),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Apply a statement already validated by [`check`](Self::check).
    fn apply(engine: &mut Engine, statement: Statement) -> usize {
        match statement {
            Statement::CreateView(name, def) => {
                engine.views.insert(name, def);
                0
            }
            Statement::Insert {
                table,
                timed,
                values,
            } => {
                let t = engine.tables.get_mut(&table).expect("checked");
                t.rows.push(Row { timed, values });
                1
            }
            Statement::Update { table, timed, uid } => {
                let t = engine.tables.get_mut(&table).expect("checked");
                let mut affected = 0;
                for row in &mut t.rows {
                    if row_uid(row) == Some(uid.as_str()) {
                        row.timed = timed;
                        affected += 1;
                    }
                }
                affected
            }
            Statement::Delete { table, uid } => {
                let t = engine.tables.get_mut(&table).expect("checked");
                let before = t.rows.len();
                t.rows.retain(|row| row_uid(row) != Some(uid.as_str()));
                before - t.rows.len()
            }
            Statement::DropView { name, .. } => {
                engine.views.remove(&name);
                0
            }
        }
    }

    /// Evaluate `SELECT * FROM <relation>` against a table or live view.
    fn eval_select_all(engine: &Engine, relation: &str, sql: &str) -> Result<ResultSet, StorageError> {
        if let Some(table) = engine.tables.get(relation) {
            return Ok(materialize(table, table.rows.iter().collect()));
        }
        let view = engine
            .views
            .get(relation)
            .ok_or_else(|| StorageError::UnknownRelation(relation.to_string()))?;
        let source = engine
            .tables
            .get(&view.source)
            .ok_or_else(|| StorageError::UnknownRelation(view.source.clone()))?;

        let boundary = match &view.state_bound {
            Some((state_table, uid)) => {
                let state = engine
                    .tables
                    .get(state_table)
                    .ok_or_else(|| StorageError::UnknownRelation(state_table.clone()))?;
                // A missing state row reads as the never-triggered default.
                Some(
                    state
                        .rows
                        .iter()
                        .find(|row| row_uid(row) == Some(uid.as_str()))
                        .map(|row| row.timed)
                        .unwrap_or(-1),
                )
            }
            None => None,
        };

        let mut rows: Vec<&Row> = source
            .rows
            .iter()
            .filter(|row| match boundary {
                Some(b) => {
                    row.timed <= b
                        && match view.history_ms {
                            Some(ms) => row.timed >= b - ms,
                            None => true,
                        }
                }
                None => true,
            })
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.timed));
        if let Some(limit) = view.limit {
            rows.truncate(limit);
        }
        trace!("view '{}' evaluated to {} rows for '{}'", relation, rows.len(), sql);
        Ok(materialize(source, rows))
    }

    fn eval_query(engine: &Engine, sql: &str) -> Result<ResultSet, StorageError> {
        let trimmed = sql.trim().trim_end_matches(';');
        if let Some(caps) = select_timed_re().captures(trimmed) {
            let table = engine
                .tables
                .get(&caps[1])
                .ok_or_else(|| StorageError::UnknownRelation(caps[1].to_string()))?;
            let uid = &caps[2];
            let rows: Vec<Vec<FieldValue>> = table
                .rows
                .iter()
                .filter(|row| row_uid(row) == Some(uid))
                .map(|row| vec![FieldValue::Integer(row.timed)])
                .collect();
            return Ok(ResultSet {
                columns: vec!["timed".to_string()],
                rows,
            });
        }
        if let Some(caps) = select_all_re().captures(trimmed) {
            return Self::eval_select_all(engine, &caps[1], trimmed);
        }
        Err(StorageError::syntax(trimmed, "unrecognized query".to_string()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Engine> {
        self.engine.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Engine> {
        self.engine.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn create_table(&self, name: &str, fields: &[DataField]) -> Result<(), StorageError> {
        let mut engine = self.write();
        if engine.tables.contains_key(name) || engine.views.contains_key(name) {
            return Err(StorageError::RelationExists(name.to_string()));
        }
        engine.tables.insert(
            name.to_string(),
            Table {
                fields: fields.to_vec(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<(), StorageError> {
        let mut engine = self.write();
        engine
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::UnknownRelation(name.to_string()))
    }

    fn table_exists(&self, name: &str) -> bool {
        self.read().tables.contains_key(name)
    }

    fn execute_update(&self, sql: &str) -> Result<usize, StorageError> {
        let statement = Self::parse_statement(sql)?;
        let mut engine = self.write();
        Self::check(&engine, &statement, sql)?;
        Ok(Self::apply(&mut engine, statement))
    }

    fn execute_atomically(&self, statements: &[String]) -> Result<(), StorageError> {
        let parsed = statements
            .iter()
            .map(|sql| Self::parse_statement(sql))
            .collect::<Result<Vec<_>, _>>()?;
        let mut engine = self.write();
        // Validate the whole batch before mutating anything, so the unit is
        // all-or-nothing under the single write-lock section.
        for (statement, sql) in parsed.iter().zip(statements) {
            Self::check(&engine, statement, sql)?;
        }
        for statement in parsed {
            Self::apply(&mut engine, statement);
        }
        Ok(())
    }

    fn execute_query(&self, sql: &str) -> Result<DataEnumerator, StorageError> {
        let ResultSet { columns, rows } = Self::eval_query(&self.read(), sql)?;
        let timed_idx = columns.iter().position(|c| c == "timed");
        let elements = rows
            .into_iter()
            .map(|row| {
                let timestamp = timed_idx
                    .and_then(|i| row.get(i))
                    .and_then(|v| v.as_integer())
                    .unwrap_or(-1);
                let fields = columns
                    .iter()
                    .zip(&row)
                    .filter(|(name, _)| name.as_str() != "timed")
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                StreamElement::with_fields(timestamp, fields)
            })
            .collect();
        Ok(DataEnumerator::new(elements))
    }

    fn execute_query_with_result_set(&self, sql: &str) -> Result<ResultSet, StorageError> {
        Self::eval_query(&self.read(), sql)
    }
}

fn row_uid(row: &Row) -> Option<&str> {
    match row.values.get("uid") {
        Some(FieldValue::String(uid)) => Some(uid.as_str()),
        _ => None,
    }
}

/// Project rows into a result set using the table's declared column order,
/// `timed` first.
fn materialize(table: &Table, rows: Vec<&Row>) -> ResultSet {
    let mut columns = vec!["timed".to_string()];
    columns.extend(table.fields.iter().map(|f| f.name.clone()));
    let rows = rows
        .into_iter()
        .map(|row| {
            let mut out = vec![FieldValue::Integer(row.timed)];
            out.extend(
                table
                    .fields
                    .iter()
                    .map(|f| row.values.get(&f.name).cloned().unwrap_or(FieldValue::Null)),
            );
            out
        })
        .collect();
    ResultSet { columns, rows }
}

/// Split a comma-separated literal list, honoring single-quoted strings with
/// `''` escapes.
fn split_literals(text: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                current.push(c);
                if in_string && chars.peek() == Some(&'\'') {
                    current.push(chars.next().unwrap());
                } else {
                    in_string = !in_string;
                }
            }
            ',' if !in_string => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if in_string {
        return Err("unterminated string literal".to_string());
    }
    let last = current.trim();
    if !last.is_empty() {
        out.push(last.to_string());
    }
    Ok(out)
}

fn parse_literal(text: &str) -> Result<FieldValue, String> {
    if text.eq_ignore_ascii_case("NULL") {
        return Ok(FieldValue::Null);
    }
    if text.eq_ignore_ascii_case("TRUE") {
        return Ok(FieldValue::Boolean(true));
    }
    if text.eq_ignore_ascii_case("FALSE") {
        return Ok(FieldValue::Boolean(false));
    }
    if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2 {
        return Ok(FieldValue::String(
            text[1..text.len() - 1].replace("''", "'"),
        ));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(FieldValue::Integer(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Ok(FieldValue::Float(f));
    }
    Err(format!("unrecognized literal '{}'", text))
}
