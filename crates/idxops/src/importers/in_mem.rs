//! 🧪 An importer that imports nothing and remembers everything.
//!
//! Every call is written down behind an `Arc<Mutex<..>>`, so a test can hand a
//! clone to the orchestrator and read the log afterwards. The staged file is read
//! back and its rows counted, which is how tests prove the right file reached the
//! importer. The exit code is whatever you configured; zero unless told otherwise.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{BulkImporter, ImportReport, user_databases};
use crate::common::{ColumnSchema, ImportTarget, IndexSpec, StagingFormat};
use crate::error::{OpsError, OpsResult};
use crate::staging;

/// 📝 One thing somebody asked the importer to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportCall {
    Document {
        path: PathBuf,
        target: ImportTarget,
        rows: usize,
    },
    Delimited {
        path: PathBuf,
        fields: String,
        target: ImportTarget,
        rows: usize,
    },
    CreateIndexes {
        target: ImportTarget,
        count: usize,
    },
    ListDatabases,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryImporter {
    /// 🔒 The call log. Clone the importer, keep a handle, read it later.
    pub calls: Arc<Mutex<Vec<ImportCall>>>,
    exit_code: i32,
    databases: Vec<String>,
}

impl InMemoryImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💥 Make every call "exit" with this code. Non-zero turns into `ImportTool`.
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// 🗄️ What the "server" claims to hold, system databases included if you want them.
    pub fn with_databases<S: Into<String>>(mut self, databases: impl IntoIterator<Item = S>) -> Self {
        self.databases = databases.into_iter().map(Into::into).collect();
        self
    }

    pub async fn calls(&self) -> Vec<ImportCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: ImportCall) -> OpsResult<ImportReport> {
        debug!("🧪 in-memory importer got {:?}", call);
        self.calls.lock().await.push(call);
        if self.exit_code == 0 {
            Ok(ImportReport {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        } else {
            Err(OpsError::ImportTool {
                exit_code: Some(self.exit_code),
                stdout: String::new(),
                stderr: format!("in-memory importer configured to exit {}", self.exit_code),
            })
        }
    }
}

async fn staged_rows(path: &Path, format: StagingFormat) -> OpsResult<usize> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        warn!("💀 in-memory importer could not read {}: {}", path.display(), err);
        OpsError::staging(path, err)
    })?;
    Ok(staging::count_rows(&bytes, format))
}

#[async_trait]
impl BulkImporter for InMemoryImporter {
    async fn import_document_file(&self, path: &Path, target: &ImportTarget) -> OpsResult<ImportReport> {
        let rows = staged_rows(path, StagingFormat::Document).await?;
        self.record(ImportCall::Document {
            path: path.to_path_buf(),
            target: target.clone(),
            rows,
        })
        .await
    }

    async fn import_delimited_file(
        &self,
        path: &Path,
        schema: &ColumnSchema,
        target: &ImportTarget,
    ) -> OpsResult<ImportReport> {
        let rows = staged_rows(path, StagingFormat::Delimited).await?;
        self.record(ImportCall::Delimited {
            path: path.to_path_buf(),
            fields: schema.field_list(),
            target: target.clone(),
            rows,
        })
        .await
    }

    async fn create_indexes(&self, target: &ImportTarget, indexes: &[IndexSpec]) -> OpsResult<ImportReport> {
        self.record(ImportCall::CreateIndexes {
            target: target.clone(),
            count: indexes.len(),
        })
        .await
    }

    async fn list_databases(&self) -> OpsResult<Vec<String>> {
        self.record(ImportCall::ListDatabases).await?;
        Ok(user_databases(self.databases.iter().map(String::as_str)))
    }
}
