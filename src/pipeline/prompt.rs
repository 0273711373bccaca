//! Prompt construction and response parsing for plan generation.

use super::grammar::{Plan, PlanParseError};
use crate::ai::{PromptMessage, PromptRequest};
use crate::schema::Schema;
use crate::sources::GenerationContext;

/// Instructions that pin the generator to the operation grammar.
pub fn system_prompt() -> String {
    r#"You are the planning component of plansmith, a data pipeline generator.
Translate the user's request into a transformation plan over the tables described.

Respond with a single JSON object and nothing else:
{"operations": [ ... ]}

Each operation is one of:
- {"op": "filter", "column": C, "comparator": "==" | "!=" | ">" | ">=" | "<" | "<=", "value": V}
- {"op": "group_by", "keys": [C, ...], "aggregations": {"OUTPUT_NAME": {"column": C, "function": "count" | "count_distinct" | "sum" | "avg" | "min" | "max"}}}
- {"op": "join", "right": SOURCE_NAME, "left_key": C, "right_key": C, "kind": "inner" | "left" | "right" | "full"}
- {"op": "select", "columns": [C, ...]}
- {"op": "sort", "column": C, "direction": "asc" | "desc"}
- {"op": "limit", "count": N}

Rules:
- Use column names exactly as listed. After a group_by only the keys and output names exist.
- Filter values are JSON scalars matching the column type. Compare datetime columns with ISO-8601 strings.
- Numeric aggregates (sum, avg) only apply to integer or float columns.
- A join's right columns keep their names; names already present get a "_right" suffix.
- Operations run in the order given."#
        .to_owned()
}

fn describe_schema(out: &mut String, schema: &Schema) {
    for column in schema.columns() {
        let null = if column.nullable { ", nullable" } else { "" };
        out.push_str(&format!(
            "- {} ({}{null})\n",
            column.name, column.column_type
        ));
    }
}

fn describe_samples(out: &mut String, schema: &Schema) {
    if schema.sample_rows().is_empty() {
        return;
    }
    out.push_str("Sample rows:\n");
    for row in schema.sample_rows() {
        out.push_str(&serde_json::to_string(row).unwrap_or_default());
        out.push('\n');
    }
}

/// User message describing the sources and the request.
pub fn user_prompt(request: &str, ctx: &GenerationContext) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Primary table '{}' (about {} rows):\n",
        ctx.primary.name,
        ctx.schema().row_count_estimate()
    ));
    describe_schema(&mut prompt, ctx.schema());
    describe_samples(&mut prompt, ctx.schema());

    for binding in ctx.secondary.values() {
        prompt.push_str(&format!(
            "\nOther table '{}', available to join:\n",
            binding.name
        ));
        describe_schema(&mut prompt, &binding.schema);
    }

    if !ctx.relationships.is_empty() {
        prompt.push_str("\nKnown relationships:\n");
        for rel in &ctx.relationships {
            prompt.push_str(&format!(
                "- {}.{} -> {}.{}",
                rel.from.source, rel.from.column, rel.to.source, rel.to.column
            ));
            if let Some(kind) = &rel.kind {
                prompt.push_str(&format!(" ({kind})"));
            }
            if let Some(desc) = &rel.description {
                prompt.push_str(&format!(": {desc}"));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(&format!("\nRequest: {}\n", request.trim()));
    prompt
}

/// Corrective message sent after a response failed to parse.
pub fn feedback_prompt(error: &PlanParseError) -> String {
    format!(
        "That response could not be used: {error}. Reply again with only the JSON object described in the instructions."
    )
}

/// First conversation for a request.
pub fn initial_request(request: &str, ctx: &GenerationContext) -> PromptRequest {
    PromptRequest {
        system: system_prompt(),
        messages: vec![PromptMessage::user(user_prompt(request, ctx))],
    }
}

/// Cut the JSON payload out of a response that may be wrapped in a code
/// fence or surrounded by prose.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = trimmed.get(start + 3..).unwrap_or_default();
        let body = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = body.find("```") {
            return body.get(..end).unwrap_or_default().trim();
        }
    }

    let open = trimmed.find(['{', '[']);
    let close = trimmed.rfind(['}', ']']);
    match (open, close) {
        (Some(open), Some(close)) if open < close => trimmed.get(open..=close).unwrap_or(trimmed),
        _ => trimmed,
    }
}

/// Parse a generator response into a plan.
///
/// # Errors
///
/// Returns [`PlanParseError`] when no grammar-conformant plan can be read.
pub fn parse_response(text: &str) -> Result<Plan, PlanParseError> {
    if text.trim().is_empty() {
        return Err(PlanParseError("response was empty".to_owned()));
    }
    Plan::from_json(extract_json(text))
}
