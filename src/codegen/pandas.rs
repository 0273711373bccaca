//! Python + pandas rendering.
//!
//! Columns are read with pandas' nullable dtypes (`Int64`, `Float64`,
//! `boolean`, `string`) so missing values stay `<NA>` instead of silently
//! turning integers into floats. Datetime columns are kept as ISO strings;
//! comparisons and ordering on them are lexicographic, as in SQL.
//!
//! Row order is tracked the same way as in the SQL target: groups over
//! sorted rows come out in first-seen order, inner and left joins keep the
//! left order, right and full joins drop it, and a `head` with no order in
//! effect sorts by every column first.

use super::artifact::{OutputSink, PipelineArtifact, Target};
use super::{comment_text, schema_at, step_descriptions};
use crate::error::{PipelineError, Result};
use crate::pipeline::transform::{JoinSide, join_layout};
use crate::pipeline::{
    AggregateFunction, Aggregation, JoinKind, Literal, Operation, SortDirection,
    ValidatedPlan,
};
use crate::schema::{ColumnType, Schema};
use crate::sources::{GenerationContext, SourceBinding, SourceLocation};
use crate::utils::quote_py_str;
use indexmap::IndexMap;
use std::path::Path;

pub const DEPENDENCIES: &[&str] = &["pandas"];

pub fn render(plan: &ValidatedPlan, ctx: &GenerationContext) -> Result<PipelineArtifact> {
    let primary_path = csv_path(&ctx.primary)?;

    let mut script = String::new();
    script.push_str(&format!(
        "# Generated by plansmith from plan {}\n",
        plan.plan_hash()
    ));
    script.push_str("import pandas as pd\n\n");
    script.push_str(&format!(
        "df = {}\n",
        read_csv(primary_path, &ctx.primary.schema)
    ));

    let mut ordered = false;
    for (idx, op) in plan.plan().operations().iter().enumerate() {
        let before = schema_at(plan, idx)?;
        script.push_str(&format!(
            "\n# Step {}: {}\n",
            idx + 1,
            comment_text(&op.describe())
        ));
        render_operation(&mut script, op, before, ctx, &mut ordered)?;
    }

    script.push('\n');
    match &ctx.sink {
        OutputSink::Stdout => script.push_str("print(df.to_json(orient=\"records\"))\n"),
        OutputSink::CsvFile(path) => script.push_str(&format!(
            "df.to_csv({}, index=False)\n",
            py_path(path)
        )),
        OutputSink::Table(_) | OutputSink::View(_) => {
            return Err(PipelineError::CodeGeneration(
                "the dataframe target can only write to stdout or a CSV file".to_owned(),
            ));
        }
    }

    let read = format!(
        "Read {} from {}",
        ctx.primary.name,
        primary_path.display()
    );

    Ok(PipelineArtifact {
        target: Target::DataframeScript,
        source: script,
        dependencies: DEPENDENCIES.iter().map(|d| (*d).to_owned()).collect(),
        steps: step_descriptions(plan, read, ctx),
        plan_hash: plan.plan_hash().to_owned(),
    })
}

fn csv_path(binding: &SourceBinding) -> Result<&Path> {
    match &binding.location {
        SourceLocation::CsvFile(path) => Ok(path),
        SourceLocation::Table { table } => Err(PipelineError::CodeGeneration(format!(
            "the dataframe target reads CSV files only, but source '{}' is table '{table}'",
            binding.name
        ))),
    }
}

fn py_path(path: &Path) -> String {
    quote_py_str(&path.to_string_lossy())
}

fn dtype(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "Int64",
        ColumnType::Float => "Float64",
        ColumnType::Boolean => "boolean",
        ColumnType::String | ColumnType::Datetime => "string",
    }
}

fn read_csv(path: &Path, schema: &Schema) -> String {
    let dtypes: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| format!("{}: {}", quote_py_str(&c.name), quote_py_str(dtype(c.column_type))))
        .collect();
    format!(
        "pd.read_csv({}, dtype={{{}}})",
        py_path(path),
        dtypes.join(", ")
    )
}

fn col(frame: &str, name: &str) -> String {
    format!("{frame}[{}]", quote_py_str(name))
}

fn py_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| quote_py_str(n)).collect();
    format!("[{}]", quoted.join(", "))
}

fn py_literal(value: &Literal) -> String {
    match value {
        Literal::Boolean(true) => "True".to_owned(),
        Literal::Boolean(false) => "False".to_owned(),
        Literal::Integer(i) => i.to_string(),
        Literal::Float(x) => x.to_string(),
        Literal::String(s) => quote_py_str(s),
    }
}

fn aggregate_spec(agg: &Aggregation) -> String {
    let function = match agg.function {
        AggregateFunction::Count => quote_py_str("count"),
        AggregateFunction::CountDistinct => quote_py_str("nunique"),
        // min_count=1 keeps all-null groups null, like SQL SUM
        AggregateFunction::Sum => "lambda s: s.sum(min_count=1)".to_owned(),
        AggregateFunction::Avg => quote_py_str("mean"),
        AggregateFunction::Min => quote_py_str("min"),
        AggregateFunction::Max => quote_py_str("max"),
    };
    format!("({}, {function})", quote_py_str(&agg.column))
}

/// A helper column name that collides with none of `taken`.
fn position_column(taken: &[&str]) -> String {
    let mut name = "__pos".to_owned();
    let mut n = 0;
    while taken.contains(&name.as_str()) {
        n += 1;
        name = format!("__pos_{n}");
    }
    name
}

fn merge_how(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "inner",
        JoinKind::Left => "left",
        JoinKind::Right => "right",
        JoinKind::Full => "outer",
    }
}

fn render_operation(
    script: &mut String,
    op: &Operation,
    before: &Schema,
    ctx: &GenerationContext,
    ordered: &mut bool,
) -> Result<()> {
    match op {
        Operation::Filter {
            column,
            comparator,
            value,
        } => {
            script.push_str(&format!(
                "df = df[{}.notna() & ({} {} {})]\n",
                col("df", column),
                col("df", column),
                comparator.symbol(),
                py_literal(value)
            ));
        }
        Operation::GroupBy { keys, aggregations } => {
            render_group_by(script, before, keys, aggregations, *ordered);
        }
        Operation::Join {
            right,
            left_key,
            right_key,
            kind,
        } => {
            let binding = ctx.binding(right).ok_or_else(|| {
                PipelineError::CodeGeneration(format!("join source '{right}' is not in context"))
            })?;
            let keeps_order = *ordered && matches!(kind, JoinKind::Inner | JoinKind::Left);
            render_join(script, before, binding, left_key, right_key, *kind, keeps_order)?;
            *ordered = keeps_order;
        }
        Operation::Select { columns } => {
            script.push_str(&format!("df = df[{}]\n", py_list(columns)));
        }
        Operation::Sort { column, direction } => {
            let ascending = match direction {
                SortDirection::Asc => "True",
                SortDirection::Desc => "False",
            };
            script.push_str(&format!(
                "df = df.sort_values(by={}, ascending={ascending}, kind=\"mergesort\", na_position=\"last\")\n",
                quote_py_str(column)
            ));
            *ordered = true;
        }
        Operation::Limit { count } => {
            if !*ordered {
                let all: Vec<String> = before.column_names().map(ToOwned::to_owned).collect();
                script.push_str(&format!(
                    "df = df.sort_values(by={}, kind=\"mergesort\", na_position=\"last\")\n",
                    py_list(&all)
                ));
                *ordered = true;
            }
            script.push_str(&format!("df = df.head({count})\n"));
        }
    }
    Ok(())
}

/// Over ordered rows each group is placed by the position of its first row.
fn render_group_by(
    script: &mut String,
    before: &Schema,
    keys: &[String],
    aggregations: &IndexMap<String, Aggregation>,
    ordered: bool,
) {
    let mut specs: Vec<String> = aggregations
        .iter()
        .map(|(out, agg)| format!("{}: {}", quote_py_str(out), aggregate_spec(agg)))
        .collect();
    let position = ordered.then(|| {
        let taken: Vec<&str> = before
            .column_names()
            .chain(aggregations.keys().map(String::as_str))
            .collect();
        position_column(&taken)
    });
    if let Some(pos) = &position {
        let pos = quote_py_str(pos);
        script.push_str(&format!("df = df.assign(**{{{pos}: range(len(df))}})\n"));
        specs.push(format!("{pos}: ({pos}, \"min\")"));
    }
    script.push_str(&format!(
        "df = df.groupby({}, as_index=False, dropna=False, sort=False).agg(**{{{}}})\n",
        py_list(keys),
        specs.join(", ")
    ));
    if let Some(pos) = &position {
        let pos = quote_py_str(pos);
        script.push_str(&format!(
            "df = df.sort_values(by={pos}, kind=\"mergesort\").drop(columns={pos})\n"
        ));
    }
}

/// Null keys never match. Rows with a null key are set aside before the
/// merge and re-attached afterwards for the sides the join kind keeps.
/// With `keep_order` the left rows are numbered first and the result is
/// put back in that order.
fn render_join(
    script: &mut String,
    left: &Schema,
    right: &SourceBinding,
    left_key: &str,
    right_key: &str,
    kind: JoinKind,
    keep_order: bool,
) -> Result<()> {
    let path = csv_path(right)?;
    let layout = join_layout(left, &right.schema);

    let renames: Vec<String> = layout
        .iter()
        .filter(|jc| jc.side == JoinSide::Right && jc.source != jc.output)
        .map(|jc| format!("{}: {}", quote_py_str(&jc.source), quote_py_str(&jc.output)))
        .collect();
    let right_key_out = layout
        .iter()
        .find(|jc| jc.side == JoinSide::Right && jc.source == right_key)
        .map_or(right_key, |jc| jc.output.as_str());
    let outputs: Vec<String> = layout.iter().map(|jc| jc.output.clone()).collect();
    let position = keep_order.then(|| {
        let taken: Vec<&str> = outputs.iter().map(String::as_str).collect();
        position_column(&taken)
    });

    if let Some(pos) = &position {
        script.push_str(&format!(
            "df = df.assign(**{{{}: range(len(df))}})\n",
            quote_py_str(pos)
        ));
    }

    script.push_str(&format!("right = {}\n", read_csv(path, &right.schema)));
    if !renames.is_empty() {
        script.push_str(&format!(
            "right = right.rename(columns={{{}}})\n",
            renames.join(", ")
        ));
    }
    script.push_str(&format!("left_keyed = {}.notna()\n", col("df", left_key)));
    script.push_str(&format!(
        "right_keyed = {}.notna()\n",
        col("right", right_key_out)
    ));
    script.push_str(&format!(
        "joined = df[left_keyed].merge(right[right_keyed], how={}, left_on={}, right_on={})\n",
        quote_py_str(merge_how(kind)),
        quote_py_str(left_key),
        quote_py_str(right_key_out)
    ));

    let mut parts = vec!["joined".to_owned()];
    if kind.keeps_left() {
        parts.push("df[~left_keyed]".to_owned());
    }
    if kind.keeps_right() {
        parts.push("right[~right_keyed]".to_owned());
    }
    if parts.len() == 1 {
        script.push_str("df = joined\n");
    } else {
        script.push_str(&format!(
            "df = pd.concat([{}], ignore_index=True)\n",
            parts.join(", ")
        ));
    }
    if let Some(pos) = &position {
        script.push_str(&format!(
            "df = df.sort_values(by={}, kind=\"mergesort\")\n",
            quote_py_str(pos)
        ));
    }
    script.push_str(&format!("df = df[{}]\n", py_list(&outputs)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{NoSources, Plan, validate_plan};
    use crate::schema::Column;
    use crate::sources::SourceBinding;
    use std::path::PathBuf;

    fn employees() -> Schema {
        Schema::new(
            vec![
                Column::new("id", ColumnType::Integer, false),
                Column::new("dept", ColumnType::String, false),
                Column::new("salary", ColumnType::Float, true),
            ],
            vec![],
            5,
        )
        .unwrap()
    }

    fn ctx() -> GenerationContext {
        GenerationContext::new(SourceBinding::new(
            "employees",
            SourceLocation::CsvFile(PathBuf::from("data/employees.csv")),
            employees(),
        ))
    }

    fn validated(json: &str, ctx: &GenerationContext) -> ValidatedPlan {
        validate_plan(Plan::from_json(json).unwrap(), ctx.schema(), ctx).unwrap()
    }

    #[test]
    fn test_filter_then_group_by() {
        let ctx = ctx();
        let plan = validated(
            r#"[{"op":"filter","column":"salary","comparator":">","value":50000},
                {"op":"group_by","keys":["dept"],"aggregations":{"avg_salary":{"column":"salary","function":"avg"}}}]"#,
            &ctx,
        );
        let artifact = render(&plan, &ctx).unwrap();

        assert_eq!(artifact.target, Target::DataframeScript);
        assert_eq!(artifact.dependencies, vec!["pandas"]);
        assert!(artifact.source.contains(
            r#"df = pd.read_csv("data/employees.csv", dtype={"id": "Int64", "dept": "string", "salary": "Float64"})"#
        ));
        assert!(
            artifact
                .source
                .contains(r#"df = df[df["salary"].notna() & (df["salary"] > 50000)]"#)
        );
        assert!(artifact.source.contains(
            r#"df = df.groupby(["dept"], as_index=False, dropna=False, sort=False).agg(**{"avg_salary": ("salary", "mean")})"#
        ));
        assert!(artifact.source.ends_with("print(df.to_json(orient=\"records\"))\n"));
        assert_eq!(
            artifact.steps,
            vec![
                "Read employees from data/employees.csv",
                "Filter rows where salary > 50000",
                "Group by dept computing avg_salary = avg(salary)",
                "Write the result to standard output",
            ]
        );
    }

    #[test]
    fn test_sum_keeps_all_null_groups_null() {
        let ctx = ctx();
        let plan = validated(
            r#"[{"op":"group_by","keys":["dept"],"aggregations":{"total":{"column":"salary","function":"sum"}}}]"#,
            &ctx,
        );
        let artifact = render(&plan, &ctx).unwrap();
        assert!(
            artifact
                .source
                .contains(r#""total": ("salary", lambda s: s.sum(min_count=1))"#)
        );
    }

    #[test]
    fn test_sort_is_stable_with_nulls_last() {
        let ctx = ctx();
        let plan = validated(
            r#"[{"op":"sort","column":"salary","direction":"desc"},{"op":"limit","count":3}]"#,
            &ctx,
        );
        let source = render(&plan, &ctx).unwrap().source;
        assert!(source.contains(
            r#"df = df.sort_values(by="salary", ascending=False, kind="mergesort", na_position="last")"#
        ));
        assert!(source.contains("df = df.head(3)"));
    }

    #[test]
    fn test_left_join_reattaches_null_keys() {
        let depts = Schema::new(
            vec![
                Column::new("dept", ColumnType::String, false),
                Column::new("budget", ColumnType::Integer, false),
            ],
            vec![],
            2,
        )
        .unwrap();
        let ctx = ctx().with_source(SourceBinding::new(
            "depts",
            SourceLocation::CsvFile(PathBuf::from("data/depts.csv")),
            depts,
        ));
        let plan = validated(
            r#"[{"op":"join","right":"depts","left_key":"dept","right_key":"dept","kind":"left"}]"#,
            &ctx,
        );
        let source = render(&plan, &ctx).unwrap().source;

        assert!(source.contains(r#"right = right.rename(columns={"dept": "dept_right"})"#));
        assert!(source.contains(
            r#"joined = df[left_keyed].merge(right[right_keyed], how="left", left_on="dept", right_on="dept_right")"#
        ));
        assert!(source.contains("df = pd.concat([joined, df[~left_keyed]], ignore_index=True)"));
        assert!(source.contains(r#"df = df[["id", "dept", "salary", "dept_right", "budget"]]"#));
    }

    #[test]
    fn test_group_by_after_sort_keeps_first_seen_order() {
        let ctx = ctx();
        let plan = validated(
            r#"[{"op":"sort","column":"salary","direction":"desc"},
                {"op":"group_by","keys":["dept"],"aggregations":{"n":{"column":"id","function":"count"}}}]"#,
            &ctx,
        );
        let source = render(&plan, &ctx).unwrap().source;
        assert!(source.contains(r#"df = df.assign(**{"__pos": range(len(df))})"#));
        assert!(source.contains(r#".agg(**{"n": ("id", "count"), "__pos": ("__pos", "min")})"#));
        assert!(source.contains(
            r#"df = df.sort_values(by="__pos", kind="mergesort").drop(columns="__pos")"#
        ));
    }

    #[test]
    fn test_head_without_sort_orders_by_every_column() {
        let ctx = ctx();
        let plan = validated(
            r#"[{"op":"group_by","keys":["dept"],"aggregations":{"n":{"column":"id","function":"count"}}},
                {"op":"limit","count":2}]"#,
            &ctx,
        );
        let source = render(&plan, &ctx).unwrap().source;
        assert!(!source.contains("__pos"));
        assert!(source.contains(
            "df = df.sort_values(by=[\"dept\", \"n\"], kind=\"mergesort\", na_position=\"last\")\ndf = df.head(2)"
        ));
    }

    #[test]
    fn test_inner_join_after_sort_restores_left_order() {
        let depts = Schema::new(
            vec![
                Column::new("dept", ColumnType::String, false),
                Column::new("__pos", ColumnType::Integer, false),
            ],
            vec![],
            2,
        )
        .unwrap();
        let ctx = ctx().with_source(SourceBinding::new(
            "depts",
            SourceLocation::CsvFile(PathBuf::from("data/depts.csv")),
            depts,
        ));
        let plan = validated(
            r#"[{"op":"sort","column":"salary"},
                {"op":"join","right":"depts","left_key":"dept","right_key":"dept","kind":"inner"},
                {"op":"limit","count":2}]"#,
            &ctx,
        );
        let source = render(&plan, &ctx).unwrap().source;

        assert!(source.contains(r#"df = df.assign(**{"__pos_1": range(len(df))})"#));
        assert!(source.contains("df = df.sort_values(by=\"__pos_1\", kind=\"mergesort\")\ndf = df[[\"id\", \"dept\", \"salary\", \"dept_right\", \"__pos\"]]"));
        assert_eq!(source.matches("sort_values").count(), 2, "{source}");
    }

    #[test]
    fn test_table_source_and_sink_are_rejected() {
        let table_ctx = GenerationContext::new(SourceBinding::new(
            "employees",
            SourceLocation::Table {
                table: "employees".into(),
            },
            employees(),
        ));
        let plan = validate_plan(
            Plan::from_json(r#"[{"op":"limit","count":1}]"#).unwrap(),
            table_ctx.schema(),
            &NoSources,
        )
        .unwrap();
        assert!(matches!(
            render(&plan, &table_ctx),
            Err(PipelineError::CodeGeneration(_))
        ));

        let view_ctx = ctx().with_sink(OutputSink::View("v".into()));
        assert!(matches!(
            render(&plan, &view_ctx),
            Err(PipelineError::CodeGeneration(_))
        ));
    }

    #[test]
    fn test_csv_sink() {
        let ctx = ctx().with_sink(OutputSink::CsvFile(PathBuf::from("out/result.csv")));
        let plan = validated(r#"[{"op":"select","columns":["dept","id"]}]"#, &ctx);
        let artifact = render(&plan, &ctx).unwrap();
        assert!(artifact.source.contains(r#"df = df[["dept", "id"]]"#));
        assert!(
            artifact
                .source
                .ends_with("df.to_csv(\"out/result.csv\", index=False)\n")
        );
        assert_eq!(
            artifact.steps.last().map(String::as_str),
            Some("Write the result to out/result.csv")
        );
    }
}
