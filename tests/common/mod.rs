//! Shared fixtures for the integration tests: a scripted text generator,
//! tabular fixtures, runners for both artifact targets and a small row-level
//! reference evaluator.

#![allow(dead_code)]

use async_trait::async_trait;
use plansmith::ai::{GeneratorError, PromptRequest, TextGenerator};
use plansmith::pipeline::{AggregateFunction, Comparator, JoinKind, Literal, Operation, Plan};
use plansmith::schema::ColumnType;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::Row as _;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Replays canned replies in order and records every request it sees.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GeneratorError>>>,
    pub seen: Mutex<Vec<PromptRequest>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, GeneratorError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(reply: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply.to_owned())])
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &PromptRequest) -> Result<String, GeneratorError> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Fatal("no scripted reply left".into())))
    }
}

/// A single cell, normalised so both targets compare equal: booleans and
/// integers become numbers.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Num(f64),
    Text(String),
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Num(a), Self::Num(b)) => (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Cell {
    fn key(&self) -> String {
        match self {
            Self::Null => "<null>".to_owned(),
            Self::Num(x) => format!("n:{x:.6}"),
            Self::Text(s) => format!("t:{s}"),
        }
    }
}

pub type Rows = Vec<Vec<Cell>>;

/// Rows in a canonical order, for order-insensitive comparison.
pub fn canonical(rows: &Rows) -> Vec<String> {
    let mut keys: Vec<String> = rows
        .iter()
        .map(|row| row.iter().map(Cell::key).collect::<Vec<_>>().join("|"))
        .collect();
    keys.sort();
    keys
}

/// An in-memory table that can be written as CSV or loaded into SQLite.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<(String, ColumnType)>,
    pub rows: Rows,
    csv: String,
}

impl Table {
    /// Parse `csv` (header line first, empty cells are null) with the given
    /// column types.
    pub fn from_csv(name: &str, types: &[ColumnType], csv: &str) -> Self {
        let mut lines = csv.lines();
        let header: Vec<String> = lines
            .next()
            .unwrap()
            .split(',')
            .map(ToOwned::to_owned)
            .collect();
        assert_eq!(header.len(), types.len());

        let rows = lines
            .map(|line| {
                line.split(',')
                    .zip(types)
                    .map(|(raw, ty)| parse_cell(raw, *ty))
                    .collect()
            })
            .collect();

        Self {
            name: name.to_owned(),
            columns: header.into_iter().zip(types.iter().copied()).collect(),
            rows,
            csv: csv.to_owned(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn write_csv(&self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.csv", self.name));
        std::fs::write(&path, &self.csv).unwrap();
        path
    }
}

fn parse_cell(raw: &str, ty: ColumnType) -> Cell {
    if raw.is_empty() {
        return Cell::Null;
    }
    match ty {
        ColumnType::Integer | ColumnType::Float => Cell::Num(raw.parse().unwrap()),
        ColumnType::Boolean => Cell::Num(if raw.eq_ignore_ascii_case("true") { 1.0 } else { 0.0 }),
        ColumnType::String | ColumnType::Datetime => Cell::Text(raw.to_owned()),
    }
}

fn sqlite_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::String | ColumnType::Datetime => "TEXT",
    }
}

fn decode(row: &SqliteRow, idx: usize) -> Cell {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map_or(Cell::Null, |v| Cell::Num(v as f64));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map_or(Cell::Null, Cell::Num);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map_or(Cell::Null, Cell::Text);
    }
    panic!("column {idx} has an undecodable value");
}

/// Load `tables` into a fresh in-memory SQLite database and run `sql`.
pub async fn run_sql(sql: &str, tables: &[&Table]) -> Rows {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    for table in tables {
        let defs: Vec<String> = table
            .columns
            .iter()
            .map(|(name, ty)| format!("\"{name}\" {}", sqlite_type(*ty)))
            .collect();
        sqlx::query(&format!("CREATE TABLE \"{}\" ({})", table.name, defs.join(", ")))
            .execute(&pool)
            .await
            .unwrap();

        let placeholders = vec!["?"; table.columns.len()].join(", ");
        let insert = format!("INSERT INTO \"{}\" VALUES ({placeholders})", table.name);
        for row in &table.rows {
            let mut query = sqlx::query(&insert);
            for (cell, (_, ty)) in row.iter().zip(&table.columns) {
                query = match (cell, ty) {
                    (Cell::Null, _) => query.bind(None::<String>),
                    (Cell::Num(x), ColumnType::Integer | ColumnType::Boolean) => {
                        query.bind(*x as i64)
                    }
                    (Cell::Num(x), _) => query.bind(*x),
                    (Cell::Text(s), _) => query.bind(s.clone()),
                };
            }
            query.execute(&pool).await.unwrap();
        }
    }

    let rows = sqlx::query(sql).fetch_all(&pool).await.unwrap();
    rows.iter()
        .map(|row| (0..row.len()).map(|i| decode(row, i)).collect())
        .collect()
}

pub fn pandas_available() -> bool {
    std::process::Command::new("python3")
        .args(["-c", "import pandas"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run a stdout-sink pandas script and read its JSON records back in
/// `columns` order.
pub fn run_pandas(script: &str, dir: &Path, columns: &[String]) -> Rows {
    let path = dir.join("pipeline.py");
    std::fs::write(&path, script).unwrap();
    let output = std::process::Command::new("python3")
        .arg(&path)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "script failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let records: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(&output.stdout).unwrap();
    records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| match record.get(c) {
                    None | Some(serde_json::Value::Null) => Cell::Null,
                    Some(serde_json::Value::Number(n)) => Cell::Num(n.as_f64().unwrap()),
                    Some(serde_json::Value::Bool(b)) => Cell::Num(if *b { 1.0 } else { 0.0 }),
                    Some(serde_json::Value::String(s)) => Cell::Text(s.clone()),
                    Some(other) => panic!("unexpected value {other}"),
                })
                .collect()
        })
        .collect()
}

fn literal_cell(value: &Literal) -> Cell {
    match value {
        Literal::Boolean(b) => Cell::Num(if *b { 1.0 } else { 0.0 }),
        Literal::Integer(i) => Cell::Num(*i as f64),
        Literal::Float(x) => Cell::Num(*x),
        Literal::String(s) => Cell::Text(s.clone()),
    }
}

fn compare(a: &Cell, b: &Cell) -> Option<Ordering> {
    match (a, b) {
        (Cell::Num(x), Cell::Num(y)) => x.partial_cmp(y),
        (Cell::Text(x), Cell::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches(cell: &Cell, comparator: Comparator, value: &Cell) -> bool {
    let Some(ord) = compare(cell, value) else {
        return false;
    };
    match comparator {
        Comparator::Eq => ord == Ordering::Equal,
        Comparator::Ne => ord != Ordering::Equal,
        Comparator::Gt => ord == Ordering::Greater,
        Comparator::Ge => ord != Ordering::Less,
        Comparator::Lt => ord == Ordering::Less,
        Comparator::Le => ord != Ordering::Greater,
    }
}

fn aggregate(function: AggregateFunction, values: &[&Cell]) -> Cell {
    let present: Vec<&Cell> = values
        .iter()
        .copied()
        .filter(|c| !matches!(c, Cell::Null))
        .collect();
    let numbers = || present.iter().filter_map(|c| match c {
        Cell::Num(x) => Some(*x),
        _ => None,
    });
    match function {
        AggregateFunction::Count => Cell::Num(present.len() as f64),
        AggregateFunction::CountDistinct => {
            let distinct: HashSet<String> = present.iter().map(|c| c.key()).collect();
            Cell::Num(distinct.len() as f64)
        }
        _ if present.is_empty() => Cell::Null,
        AggregateFunction::Sum => Cell::Num(numbers().sum()),
        AggregateFunction::Avg => Cell::Num(numbers().sum::<f64>() / present.len() as f64),
        AggregateFunction::Min => present
            .iter()
            .copied()
            .min_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
            .cloned()
            .unwrap_or(Cell::Null),
        AggregateFunction::Max => present
            .iter()
            .copied()
            .max_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal))
            .cloned()
            .unwrap_or(Cell::Null),
    }
}

fn position(columns: &[String], name: &str) -> usize {
    columns.iter().position(|c| c == name).unwrap()
}

/// Nulls sort last whatever the direction.
fn sort_cells(a: &Cell, b: &Cell, ascending: bool) -> Ordering {
    match (a, b) {
        (Cell::Null, Cell::Null) => Ordering::Equal,
        (Cell::Null, _) => Ordering::Greater,
        (_, Cell::Null) => Ordering::Less,
        (x, y) => {
            let ord = compare(x, y).unwrap_or(Ordering::Equal);
            if ascending { ord } else { ord.reverse() }
        }
    }
}

fn join_names(left: &[String], right: &[String]) -> Vec<String> {
    let mut names = left.to_vec();
    for name in right {
        let mut output = name.clone();
        let mut n = 1;
        while names.contains(&output) {
            output = if n == 1 {
                format!("{name}_right")
            } else {
                format!("{name}_right_{n}")
            };
            n += 1;
        }
        names.push(output);
    }
    names
}

/// Null keys never match.
fn join_rows(
    left: &[Vec<Cell>],
    left_width: usize,
    left_key: usize,
    right: &Table,
    right_key: usize,
    kind: JoinKind,
) -> Rows {
    let right_width = right.columns.len();
    let matching = |l: &Vec<Cell>, r: &Vec<Cell>| {
        compare(&l[left_key], &r[right_key]) == Some(Ordering::Equal)
    };

    let mut out = Vec::new();
    if matches!(kind, JoinKind::Right) {
        for r in &right.rows {
            let matched: Vec<&Vec<Cell>> = left.iter().filter(|l| matching(l, r)).collect();
            if matched.is_empty() {
                let mut row = vec![Cell::Null; left_width];
                row.extend(r.iter().cloned());
                out.push(row);
            }
            for l in matched {
                out.push(l.iter().chain(r).cloned().collect());
            }
        }
        return out;
    }

    let mut right_used = vec![false; right.rows.len()];
    for l in left {
        let mut found = false;
        for (i, r) in right.rows.iter().enumerate() {
            if matching(l, r) {
                found = true;
                right_used[i] = true;
                out.push(l.iter().chain(r).cloned().collect());
            }
        }
        if !found && kind.keeps_left() {
            let mut row = l.clone();
            row.extend(std::iter::repeat_n(Cell::Null, right_width));
            out.push(row);
        }
    }
    if kind.keeps_right() {
        for (r, used) in right.rows.iter().zip(right_used) {
            if !used {
                let mut row = vec![Cell::Null; left_width];
                row.extend(r.iter().cloned());
                out.push(row);
            }
        }
    }
    out
}

/// Evaluate a plan row by row over `table`, joining against `others` by
/// name.
///
/// Row order follows the generated artifacts: a sort sets it, a group over
/// ordered rows keeps first-seen order, inner and left joins keep the left
/// order, right and full joins lose it, and a limit with no order in effect
/// sorts by every column first.
pub fn evaluate(plan: &Plan, table: &Table, others: &[&Table]) -> (Vec<String>, Rows) {
    let mut columns = table.column_names();
    let mut rows = table.rows.clone();
    let mut ordered = false;

    for op in plan.operations() {
        match op {
            Operation::Filter {
                column,
                comparator,
                value,
            } => {
                let i = position(&columns, column);
                let value = literal_cell(value);
                rows.retain(|row| matches(&row[i], *comparator, &value));
            }
            Operation::GroupBy { keys, aggregations } => {
                let key_idx: Vec<usize> = keys.iter().map(|k| position(&columns, k)).collect();
                let mut groups: Vec<(String, Vec<Vec<Cell>>)> = Vec::new();
                for row in rows {
                    let key = key_idx.iter().map(|i| row[*i].key()).collect::<Vec<_>>().join("|");
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, members)) => members.push(row),
                        None => groups.push((key, vec![row])),
                    }
                }
                rows = groups
                    .into_iter()
                    .map(|(_, members)| {
                        let mut out: Vec<Cell> =
                            key_idx.iter().map(|i| members[0][*i].clone()).collect();
                        for agg in aggregations.values() {
                            let i = position(&columns, &agg.column);
                            let values: Vec<&Cell> = members.iter().map(|r| &r[i]).collect();
                            out.push(aggregate(agg.function, &values));
                        }
                        out
                    })
                    .collect();
                columns = keys.iter().cloned().chain(aggregations.keys().cloned()).collect();
            }
            Operation::Join {
                right,
                left_key,
                right_key,
                kind,
            } => {
                let other = others
                    .iter()
                    .find(|t| t.name == *right)
                    .unwrap_or_else(|| panic!("no table named {right}"));
                let right_names = other.column_names();
                let l = position(&columns, left_key);
                let r = position(&right_names, right_key);
                rows = join_rows(&rows, columns.len(), l, other, r, *kind);
                columns = join_names(&columns, &right_names);
                ordered = ordered && matches!(kind, JoinKind::Inner | JoinKind::Left);
            }
            Operation::Select { columns: selected } => {
                let idx: Vec<usize> = selected.iter().map(|c| position(&columns, c)).collect();
                rows = rows
                    .into_iter()
                    .map(|row| idx.iter().map(|i| row[*i].clone()).collect())
                    .collect();
                columns = selected.clone();
            }
            Operation::Sort { column, direction } => {
                let i = position(&columns, column);
                let ascending = direction.is_ascending();
                rows.sort_by(|a, b| sort_cells(&a[i], &b[i], ascending));
                ordered = true;
            }
            Operation::Limit { count } => {
                if !ordered {
                    rows.sort_by(|a, b| {
                        a.iter()
                            .zip(b)
                            .map(|(x, y)| sort_cells(x, y, true))
                            .find(|ord| ord.is_ne())
                            .unwrap_or(Ordering::Equal)
                    });
                    ordered = true;
                }
                rows.truncate(usize::try_from(*count).unwrap());
            }
        }
    }

    (columns, rows)
}

/// The five-row employee fixture used across tests.
pub fn employees() -> Table {
    Table::from_csv(
        "employees",
        &[ColumnType::Integer, ColumnType::String, ColumnType::Float],
        "id,dept,salary\n1,eng,85000.0\n2,eng,62000.5\n3,ops,48000.0\n4,ops,\n5,sales,51000.0\n",
    )
}
