//! Append-only lineage stores.

use super::record::LineageRecord;
use crate::codegen::Target;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError};
use tokio::sync::Mutex;

/// Destination for lineage records. Records are never updated or removed.
#[async_trait]
pub trait LineageStore: Send + Sync {
    async fn append(&self, record: &LineageRecord) -> Result<()>;

    /// Most recent record for this schema, plan and target, if any.
    async fn find(
        &self,
        schema_fingerprint: &str,
        plan_hash: &str,
        target: Target,
    ) -> Result<Option<LineageRecord>>;

    async fn records(&self) -> Result<Vec<LineageRecord>>;
}

/// One JSON object per line in an append-only file.
///
/// Appends are serialized through a mutex shared by every store in the
/// process that points at the same file, and each line is written with a
/// single `write_all` on a blocking thread, so dropping the calling future
/// never leaves half a line behind. Writers in other processes are not
/// coordinated.
#[derive(Debug, Clone)]
pub struct JsonlLineageStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonlLineageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock: path_lock(&path),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The process-wide lock for a log file, keyed by absolute path.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key)
        .or_default()
        .clone()
}

/// Whether the file ends without a trailing newline, e.g. after a crash.
fn ends_mid_line(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    if file.seek(SeekFrom::End(-1)).is_err() {
        return false;
    }
    let mut last = [0u8; 1];
    file.read_exact(&mut last).is_ok() && last != [b'\n']
}

fn append_line(path: &Path, line: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut buf = Vec::with_capacity(line.len() + 1);
    if ends_mid_line(path) {
        tracing::warn!(path = %path.display(), "Lineage log ends mid-line, starting a new line");
        buf.push(b'\n');
    }
    buf.extend_from_slice(line);

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            PipelineError::Lineage(format!("cannot open lineage log {}: {e}", path.display()))
        })?;

    file.write_all(&buf)
        .map_err(|e| PipelineError::Lineage(format!("write error: {e}")))?;
    Ok(())
}

fn read_records(path: &Path) -> Result<Vec<LineageRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PipelineError::Lineage(format!(
                "cannot read lineage log {}: {e}",
                path.display()
            )));
        }
    };

    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LineageRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                line = idx + 1,
                path = %path.display(),
                "Skipping unreadable lineage entry: {e}"
            ),
        }
    }
    Ok(records)
}

#[async_trait]
impl LineageStore for JsonlLineageStore {
    async fn append(&self, record: &LineageRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| PipelineError::Lineage(format!("JSON serialize error: {e}")))?;
        line.push(b'\n');

        let guard = self.lock.clone().lock_owned().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            append_line(&path, &line)
        })
        .await
        .map_err(|e| PipelineError::Lineage(format!("append task failed: {e}")))??;

        tracing::info!(id = %record.id, plan_hash = %record.plan_hash, "Lineage recorded");
        Ok(())
    }

    async fn find(
        &self,
        schema_fingerprint: &str,
        plan_hash: &str,
        target: Target,
    ) -> Result<Option<LineageRecord>> {
        let records = self.records().await?;
        Ok(records
            .into_iter()
            .rev()
            .find(|r| r.matches(schema_fingerprint, plan_hash, target)))
    }

    async fn records(&self) -> Result<Vec<LineageRecord>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_records(&path))
            .await
            .map_err(|e| PipelineError::Lineage(format!("read task failed: {e}")))?
    }
}

/// In-process store, mostly for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryLineageStore {
    records: Mutex<Vec<LineageRecord>>,
}

impl MemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LineageStore for MemoryLineageStore {
    async fn append(&self, record: &LineageRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn find(
        &self,
        schema_fingerprint: &str,
        plan_hash: &str,
        target: Target,
    ) -> Result<Option<LineageRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.matches(schema_fingerprint, plan_hash, target))
            .cloned())
    }

    async fn records(&self) -> Result<Vec<LineageRecord>> {
        Ok(self.records.lock().await.clone())
    }
}
