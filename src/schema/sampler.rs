//! Sample acquisition for schema inference.
//!
//! CSV files are read through polars with type inference switched off, so
//! every cell arrives as text and the lattice in [`super::inference`] makes
//! the typing decision. Tables are sampled over sqlx's `Any` driver: the
//! column list and declared nullability come from the catalog
//! (`information_schema` on PostgreSQL, `pragma_table_info` on SQLite) and
//! every value is cast to text in the query, so dates, numerics and other
//! driver-specific types reach the lattice the same way CSV cells do.

use super::inference::infer_from_rows;
use super::types::{Column, Schema};
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::quote_ident;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sqlx::Row as _;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How to reach a table for sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// sqlx connection URL, e.g. `postgres://...` or `sqlite://data.db`.
    pub url: String,
    pub table: String,
}

/// Where the sample comes from.
#[derive(Debug, Clone)]
pub enum SampleInput {
    /// Header plus rows already in memory. Widths must agree exactly.
    Raw {
        header: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
    CsvFile(PathBuf),
    Table(ConnectionDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceOptions {
    /// Rows read from the source for type inference.
    pub sample_rows: usize,
    /// Rows kept on the schema as representative samples.
    pub prompt_sample_rows: usize,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            sample_rows: 1000,
            prompt_sample_rows: 5,
        }
    }
}

/// Infer the schema of a sample.
///
/// # Errors
///
/// Every failure, including unreadable files and unreachable databases, is
/// reported as [`PipelineError::SchemaInference`].
pub async fn infer_schema(input: &SampleInput, options: InferenceOptions) -> Result<Schema> {
    match input {
        SampleInput::Raw { header, rows } => infer_from_rows(
            header,
            rows,
            options.prompt_sample_rows,
            rows.len() as u64,
        ),
        SampleInput::CsvFile(path) => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || sample_csv(&path, options))
                .await
                .map_err(|e| PipelineError::SchemaInference(format!("CSV reader panicked: {e}")))?
        }
        SampleInput::Table(descriptor) => sample_table(descriptor, options).await,
    }
}

fn sample_csv(path: &Path, options: InferenceOptions) -> Result<Schema> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_n_rows(Some(options.sample_rows))
        .finish()?
        .collect()
        .with_context(|| format!("Failed to read CSV '{}'", path.display()))?;

    let header: Vec<String> = df
        .get_columns()
        .iter()
        .map(|c| c.name().as_str().to_owned())
        .collect();

    let mut rows: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(header.len()); df.height()];
    for column in df.get_columns() {
        let values = column.as_materialized_series().str()?;
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value.map(ToOwned::to_owned));
        }
    }

    let total = match count_csv_rows(path) {
        Ok(total) => total,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to count CSV rows, using the sample size as the estimate"
            );
            rows.len() as u64
        }
    };
    tracing::debug!(
        path = %path.display(),
        columns = header.len(),
        sampled = rows.len(),
        total,
        "Sampled CSV"
    );

    infer_from_rows(&header, &rows, options.prompt_sample_rows, total)
}

fn count_csv_rows(path: &Path) -> Result<u64> {
    let counted = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .select([len()])
        .collect()?;

    let total = counted
        .get_columns()
        .first()
        .ok_or_else(|| PipelineError::SchemaInference("row count query returned nothing".into()))?
        .as_materialized_series()
        .cast(&DataType::UInt64)?
        .u64()?
        .get(0)
        .unwrap_or(0);
    Ok(total)
}

async fn sample_table(
    descriptor: &ConnectionDescriptor,
    options: InferenceOptions,
) -> Result<Schema> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&descriptor.url)
        .await
        .context("Failed to connect to sample database (timeout after 10s)")?;

    let described = table_columns(&pool, descriptor).await?;
    if described.is_empty() {
        return Err(PipelineError::SchemaInference(format!(
            "table '{}' does not exist or has no columns",
            descriptor.table
        )));
    }
    let header: Vec<String> = described.iter().map(|(name, _)| name.clone()).collect();

    let table = quote_ident(&descriptor.table);
    let projection: Vec<String> = header
        .iter()
        .map(|name| format!("CAST({} AS TEXT)", quote_ident(name)))
        .collect();
    let sql = format!(
        "SELECT {} FROM {table} LIMIT {}",
        projection.join(", "),
        options.sample_rows
    );
    let fetched = sqlx::query(&sql)
        .fetch_all(&pool)
        .await
        .with_context(|| format!("Failed to sample table '{}'", descriptor.table))?;

    let mut rows = Vec::with_capacity(fetched.len());
    for row in &fetched {
        let values = (0..header.len())
            .map(|idx| row.try_get::<Option<String>, _>(idx))
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read a sampled row of '{}'", descriptor.table))?;
        rows.push(values);
    }

    let count_sql = format!("SELECT COUNT(*) FROM {table}");
    let total = match sqlx::query_scalar::<_, i64>(&count_sql).fetch_one(&pool).await {
        Ok(total) => u64::try_from(total).unwrap_or(0),
        Err(e) => {
            tracing::warn!(
                table = %descriptor.table,
                error = %e,
                "Failed to count table rows, using the sample size as the estimate"
            );
            rows.len() as u64
        }
    };

    pool.close().await;
    tracing::debug!(table = %descriptor.table, sampled = rows.len(), total, "Sampled table");

    let inferred = infer_from_rows(&header, &rows, options.prompt_sample_rows, total)?;
    let columns = inferred
        .columns()
        .iter()
        .zip(&described)
        .map(|(column, (_, declared_nullable))| Column {
            nullable: column.nullable || *declared_nullable,
            ..column.clone()
        })
        .collect();
    Schema::new(columns, inferred.sample_rows().to_vec(), total)
}

/// Column names in table order, each with whether the catalog allows nulls.
async fn table_columns(
    pool: &AnyPool,
    descriptor: &ConnectionDescriptor,
) -> Result<Vec<(String, bool)>> {
    let sql = if descriptor.url.starts_with("postgres") {
        "SELECT CAST(column_name AS TEXT), CAST(is_nullable AS TEXT) \
         FROM information_schema.columns \
         WHERE table_name = $1 AND table_schema = current_schema() \
         ORDER BY ordinal_position"
    } else if descriptor.url.starts_with("sqlite") {
        "SELECT name, CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END \
         FROM pragma_table_info(?) ORDER BY cid"
    } else {
        return Err(PipelineError::SchemaInference(format!(
            "cannot sample '{}': only postgres and sqlite URLs are supported",
            descriptor.url
        )));
    };

    let described: Vec<(String, String)> = sqlx::query_as(sql)
        .bind(descriptor.table.clone())
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to describe table '{}'", descriptor.table))?;
    Ok(described
        .into_iter()
        .map(|(name, nullable)| (name, nullable == "YES"))
        .collect())
}
