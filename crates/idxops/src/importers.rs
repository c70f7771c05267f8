//! 🚚 Bulk importers: take a staged file, put it in a collection.
//!
//! 🎬 *[the file is ready. the collection is waiting. between them stands a
//! subprocess with forty command-line flags and no sense of humour.]*
//!
//! 🧠 Knowledge graph:
//! - `BulkImporter` → the seam the orchestrator talks to; it never learns which tool is behind it
//! - `mongoimport` → the real one: spawns the import tool (and the shell tool for indexes)
//! - `in_mem` → the test double: records calls, counts rows, exits however you tell it to
//! - non-zero exit is an `ImportTool` error with stdout/stderr carried verbatim. no retries. 🦆

pub mod in_mem;
pub mod mongoimport;

use std::path::Path;

use async_trait::async_trait;

use crate::common::{ColumnSchema, ImportTarget, IndexSpec};
use crate::error::OpsResult;

pub use in_mem::{ImportCall, InMemoryImporter};
pub use mongoimport::{DocumentStoreConfig, MongoImport, SYSTEM_DATABASES, user_databases};

/// 📜 What the tool said on its way out, for a run that succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// 🚚 Anything that can bulk-load a staged file into the document store.
#[async_trait]
pub trait BulkImporter: std::fmt::Debug + Send + Sync {
    /// 📦 Load a JSON array file into `target`.
    async fn import_document_file(&self, path: &Path, target: &ImportTarget) -> OpsResult<ImportReport>;

    /// 📄 Load a typed CSV file into `target`. The file's header row carries
    /// `schema`'s annotations, every column in file order.
    async fn import_delimited_file(
        &self,
        path: &Path,
        schema: &ColumnSchema,
        target: &ImportTarget,
    ) -> OpsResult<ImportReport>;

    /// 🗂️ Create post-import indexes on `target`.
    async fn create_indexes(&self, target: &ImportTarget, indexes: &[IndexSpec]) -> OpsResult<ImportReport>;

    /// 🗄️ Destination databases an operator could import into, system databases left out.
    async fn list_databases(&self) -> OpsResult<Vec<String>>;
}
