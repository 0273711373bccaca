//! Cross-target equivalence tests
//!
//! Each plan is rendered for both targets. The SQL artifact runs against an
//! in-memory SQLite database and its rows are compared with a row-level
//! reference evaluation. The pandas artifact is run and compared too when
//! `python3` with pandas is installed; otherwise that half is skipped.

mod common;

use common::{Cell, Rows, Table, canonical, employees, evaluate, pandas_available, run_pandas, run_sql};
use plansmith::codegen::{self, Target};
use plansmith::pipeline::{Plan, ValidatedPlan, validate_plan};
use plansmith::schema::{ColumnType, InferenceOptions, SampleInput, infer_schema};
use plansmith::sources::{GenerationContext, SourceBinding, SourceLocation};
use tempfile::TempDir;

async fn binding(dir: &TempDir, table: &Table) -> SourceBinding {
    let path = table.write_csv(dir.path());
    let schema = infer_schema(&SampleInput::CsvFile(path.clone()), InferenceOptions::default())
        .await
        .unwrap();
    SourceBinding::new(table.name.clone(), SourceLocation::CsvFile(path), schema)
}

async fn context(dir: &TempDir, primary: &Table, others: &[&Table]) -> GenerationContext {
    let mut ctx = GenerationContext::new(binding(dir, primary).await);
    for other in others {
        ctx = ctx.with_source(binding(dir, other).await);
    }
    ctx
}

fn output_columns(plan: &ValidatedPlan) -> Vec<String> {
    plan.output_schema()
        .column_names()
        .map(ToOwned::to_owned)
        .collect()
}

fn assert_rows(expected: &Rows, actual: &Rows, ordered: bool, source: &str) {
    if ordered {
        assert_eq!(expected, actual, "generated source:\n{source}");
    } else {
        assert_eq!(canonical(expected), canonical(actual), "generated source:\n{source}");
    }
}

/// Run both artifacts for `plan` over `tables` (the first is primary) and
/// compare each with `expected`.
async fn assert_targets_agree(plan: &str, tables: &[&Table], expected: &Rows, ordered: bool) {
    let dir = TempDir::new().unwrap();
    let (primary, others) = tables.split_first().unwrap();
    let ctx = context(&dir, primary, others).await;
    let validated = validate_plan(Plan::from_json(plan).unwrap(), ctx.schema(), &ctx).unwrap();

    let sql = codegen::render(&validated, &ctx, Target::Sql).unwrap();
    let from_sql = run_sql(&sql.source, tables).await;
    assert_rows(expected, &from_sql, ordered, &sql.source);

    if pandas_available() {
        let script = codegen::render(&validated, &ctx, Target::DataframeScript).unwrap();
        let from_pandas = run_pandas(&script.source, dir.path(), &output_columns(&validated));
        assert_rows(expected, &from_pandas, ordered, &script.source);
    }
}

/// Compare both targets with the reference evaluator over `tables` (the
/// first is primary) and hand back the reference rows.
async fn assert_matches_reference_over(plan: &str, tables: &[&Table], ordered: bool) -> Rows {
    let (primary, others) = tables.split_first().unwrap();
    let parsed = Plan::from_json(plan).unwrap();
    let (columns, expected) = evaluate(&parsed, primary, others);

    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, primary, others).await;
    let validated = validate_plan(parsed, ctx.schema(), &ctx).unwrap();
    assert_eq!(columns, output_columns(&validated));

    assert_targets_agree(plan, tables, &expected, ordered).await;
    expected
}

/// Compare both targets with the reference evaluator on the employee table.
async fn assert_matches_reference(plan: &str, ordered: bool) -> Rows {
    assert_matches_reference_over(plan, &[&employees()], ordered).await
}

fn departments() -> Table {
    Table::from_csv(
        "departments",
        &[ColumnType::String, ColumnType::Integer],
        "dept,floor\neng,3\nops,1\nhr,2\n",
    )
}

/// Boolean and date columns, each with one missing value.
fn staff() -> Table {
    Table::from_csv(
        "staff",
        &[
            ColumnType::Integer,
            ColumnType::String,
            ColumnType::Boolean,
            ColumnType::Datetime,
        ],
        "id,name,active,hired\n1,ann,true,2023-01-15\n2,bob,false,2021-06-01\n3,cy,,2024-03-10\n4,dee,true,\n",
    )
}

fn num(x: f64) -> Cell {
    Cell::Num(x)
}

fn text(s: &str) -> Cell {
    Cell::Text(s.to_owned())
}

#[tokio::test]
async fn test_filter_then_average_per_department() {
    let plan = r#"[
        {"op":"filter","column":"salary","comparator":">","value":50000},
        {"op":"group_by","keys":["dept"],"aggregations":{"avg_salary":{"column":"salary","function":"avg"}}}
    ]"#;

    let (_, reference) = evaluate(&Plan::from_json(plan).unwrap(), &employees(), &[]);
    assert_eq!(
        canonical(&reference),
        canonical(&vec![
            vec![text("eng"), num(73500.25)],
            vec![text("sales"), num(51000.0)],
        ])
    );

    assert_matches_reference(plan, false).await;
}

#[tokio::test]
async fn test_select_all_returns_input_rows() {
    let table = employees();
    let plan = r#"[{"op":"select","columns":["id","dept","salary"]}]"#;
    let (_, rows) = evaluate(&Plan::from_json(plan).unwrap(), &table, &[]);
    assert_eq!(rows, table.rows);

    assert_matches_reference(plan, false).await;
}

#[tokio::test]
async fn test_aggregates_over_nullable_column() {
    assert_matches_reference(
        r#"[{"op":"group_by","keys":["dept"],"aggregations":{
            "n":{"column":"salary","function":"count"},
            "people":{"column":"id","function":"count_distinct"},
            "total":{"column":"salary","function":"sum"},
            "lowest":{"column":"salary","function":"min"},
            "highest":{"column":"salary","function":"max"}
        }}]"#,
        false,
    )
    .await;
}

#[tokio::test]
async fn test_sort_keeps_nulls_last() {
    assert_matches_reference(
        r#"[{"op":"sort","column":"salary","direction":"asc"}]"#,
        true,
    )
    .await;
}

#[tokio::test]
async fn test_sort_limit_then_select_preserves_order() {
    let plan = r#"[
        {"op":"sort","column":"salary","direction":"desc"},
        {"op":"limit","count":3},
        {"op":"select","columns":["dept"]}
    ]"#;
    let (_, rows) = evaluate(&Plan::from_json(plan).unwrap(), &employees(), &[]);
    assert_eq!(rows, vec![vec![text("eng")], vec![text("eng")], vec![text("sales")]]);

    assert_matches_reference(plan, true).await;
}

#[tokio::test]
async fn test_string_filter_then_sort_descending() {
    assert_matches_reference(
        r#"[
            {"op":"filter","column":"dept","comparator":"!=","value":"ops"},
            {"op":"sort","column":"id","direction":"desc"}
        ]"#,
        true,
    )
    .await;
}

#[tokio::test]
async fn test_left_join_keeps_unmatched_rows() {
    let departments = departments();
    let plan = r#"[{"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"left"}]"#;

    let expected = vec![
        vec![num(1.0), text("eng"), num(85000.0), text("eng"), num(3.0)],
        vec![num(2.0), text("eng"), num(62000.5), text("eng"), num(3.0)],
        vec![num(3.0), text("ops"), num(48000.0), text("ops"), num(1.0)],
        vec![num(4.0), text("ops"), Cell::Null, text("ops"), num(1.0)],
        vec![num(5.0), text("sales"), num(51000.0), Cell::Null, Cell::Null],
    ];

    assert_targets_agree(plan, &[&employees(), &departments], &expected, false).await;
}

#[tokio::test]
async fn test_inner_join_then_group_by_joined_column() {
    let departments = departments();
    let plan = r#"[
        {"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"inner"},
        {"op":"group_by","keys":["floor"],"aggregations":{"headcount":{"column":"id","function":"count"}}}
    ]"#;

    let expected = vec![vec![num(3.0), num(2.0)], vec![num(1.0), num(2.0)]];

    assert_targets_agree(plan, &[&employees(), &departments], &expected, false).await;
}

#[tokio::test]
async fn test_sort_group_by_limit_keeps_first_seen_groups() {
    let rows = assert_matches_reference(
        r#"[
            {"op":"sort","column":"salary","direction":"desc"},
            {"op":"group_by","keys":["dept"],"aggregations":{"n":{"column":"id","function":"count"}}},
            {"op":"limit","count":2}
        ]"#,
        true,
    )
    .await;
    assert_eq!(
        rows,
        vec![vec![text("eng"), num(2.0)], vec![text("sales"), num(1.0)]]
    );
}

#[tokio::test]
async fn test_group_by_then_limit_without_sort() {
    let rows = assert_matches_reference(
        r#"[
            {"op":"group_by","keys":["dept"],"aggregations":{"total":{"column":"salary","function":"sum"}}},
            {"op":"limit","count":2}
        ]"#,
        true,
    )
    .await;
    assert_eq!(
        rows,
        vec![vec![text("eng"), num(147000.5)], vec![text("ops"), num(48000.0)]]
    );
}

#[tokio::test]
async fn test_sort_then_inner_join_keeps_sorted_order() {
    let rows = assert_matches_reference_over(
        r#"[
            {"op":"sort","column":"salary","direction":"desc"},
            {"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"inner"}
        ]"#,
        &[&employees(), &departments()],
        true,
    )
    .await;
    let ids: Vec<Cell> = rows.iter().map(|r| r[0].clone()).collect();
    assert_eq!(ids, vec![num(1.0), num(2.0), num(3.0), num(4.0)]);
}

#[tokio::test]
async fn test_sort_then_left_join_then_limit() {
    let rows = assert_matches_reference_over(
        r#"[
            {"op":"sort","column":"salary","direction":"asc"},
            {"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"left"},
            {"op":"limit","count":3}
        ]"#,
        &[&employees(), &departments()],
        true,
    )
    .await;
    let ids: Vec<Cell> = rows.iter().map(|r| r[0].clone()).collect();
    assert_eq!(ids, vec![num(3.0), num(5.0), num(2.0)]);
}

#[tokio::test]
async fn test_join_then_limit_without_sort() {
    assert_matches_reference_over(
        r#"[
            {"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"left"},
            {"op":"limit","count":2}
        ]"#,
        &[&employees(), &departments()],
        true,
    )
    .await;
}

#[tokio::test]
async fn test_right_join_keeps_unmatched_right_rows() {
    let rows = assert_matches_reference_over(
        r#"[{"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"right"}]"#,
        &[&employees(), &departments()],
        false,
    )
    .await;
    assert_eq!(rows.len(), 5);
    assert!(rows.contains(&vec![Cell::Null, Cell::Null, Cell::Null, text("hr"), num(2.0)]));
}

#[tokio::test]
async fn test_sorted_full_join_keeps_both_unmatched_sides() {
    let rows = assert_matches_reference_over(
        r#"[
            {"op":"sort","column":"id","direction":"desc"},
            {"op":"join","right":"departments","left_key":"dept","right_key":"dept","kind":"full"}
        ]"#,
        &[&employees(), &departments()],
        false,
    )
    .await;
    assert_eq!(rows.len(), 6);
    assert!(rows.contains(&vec![num(5.0), text("sales"), num(51000.0), Cell::Null, Cell::Null]));
    assert!(rows.contains(&vec![Cell::Null, Cell::Null, Cell::Null, text("hr"), num(2.0)]));
}

#[tokio::test]
async fn test_boolean_filter() {
    let rows = assert_matches_reference_over(
        r#"[{"op":"filter","column":"active","comparator":"==","value":true}]"#,
        &[&staff()],
        false,
    )
    .await;
    let names: Vec<Cell> = rows.iter().map(|r| r[1].clone()).collect();
    assert_eq!(names, vec![text("ann"), text("dee")]);
}

#[tokio::test]
async fn test_datetime_filter_then_sort() {
    let rows = assert_matches_reference_over(
        r#"[
            {"op":"filter","column":"hired","comparator":">=","value":"2022-01-01"},
            {"op":"sort","column":"hired","direction":"desc"},
            {"op":"select","columns":["name","hired"]}
        ]"#,
        &[&staff()],
        true,
    )
    .await;
    assert_eq!(
        rows,
        vec![
            vec![text("cy"), text("2024-03-10")],
            vec![text("ann"), text("2023-01-15")],
        ]
    );
}
