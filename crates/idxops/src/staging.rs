//! 📁 Staging: turn a `TabularBatch` into a file the bulk importer can eat.
//!
//! 🎬 COLD OPEN — INT. TEMP DIRECTORY — MOMENTS AFTER A FAILED RUN
//!
//! A half-written `staged.csv` sits in the corner. Forty rows of last Tuesday's
//! data, and a line that stops mid-word. The next migration walks in, sees it,
//! and imports it. Nobody notices for a week.
//!
//! That does not happen here. Every write clears the target first, and if the
//! write fails, the partial file is removed before the error leaves this module.
//! Either there is a complete file, or there is no file.
//!
//! 🧠 Knowledge graph:
//! - `json_array` → `[{..},{..}]` for the importer's array mode
//! - `delimited` → CSV with a (possibly type-annotated) header
//! - `StagingWriter` → owns the temp dir and the fail-closed dance
//! - file names are fixed (`staged.json`, `staged.csv`); one operator, one run at a time 🦆

pub mod delimited;
pub mod json_array;

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::common::{ColumnSchema, StagedFile, StagingFormat, TabularBatch};
use crate::error::{OpsError, OpsResult};

pub const DOCUMENT_FILE_NAME: &str = "staged.json";
pub const DELIMITED_FILE_NAME: &str = "staged.csv";

/// 📁 Where staged files live.
#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
        }
    }
}

/// 📝 Writes batches to the staging directory, one complete file at a time.
#[derive(Debug, Clone)]
pub struct StagingWriter {
    config: StagingConfig,
}

impl StagingWriter {
    pub fn new(config: StagingConfig) -> Self {
        Self { config }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.config.temp_dir
    }

    pub fn document_path(&self) -> PathBuf {
        self.config.temp_dir.join(DOCUMENT_FILE_NAME)
    }

    pub fn delimited_path(&self) -> PathBuf {
        self.config.temp_dir.join(DELIMITED_FILE_NAME)
    }

    /// 📦 Stage `batch` as a JSON array of documents.
    pub async fn write_document_file(&self, batch: &TabularBatch) -> OpsResult<StagedFile> {
        let path = self.document_path();
        let body = json_array::render(batch).into_bytes();
        self.write_fail_closed(&path, Ok(body)).await?;
        info!("📦 staged {} document(s) at {}", batch.row_count(), path.display());
        Ok(StagedFile {
            path,
            format: StagingFormat::Document,
            rows: batch.row_count(),
        })
    }

    /// 📄 Stage `batch` as CSV, annotating the header when a schema is given.
    pub async fn write_delimited_file(
        &self,
        batch: &TabularBatch,
        schema: Option<&ColumnSchema>,
    ) -> OpsResult<StagedFile> {
        let path = self.delimited_path();
        self.write_fail_closed(&path, delimited::render(batch, schema)).await?;
        info!(
            "📄 staged {} row(s) as {}delimited text at {}",
            batch.row_count(),
            if schema.is_some() { "typed " } else { "" },
            path.display()
        );
        Ok(StagedFile {
            path,
            format: StagingFormat::Delimited,
            rows: batch.row_count(),
        })
    }

    /// 📎 Copy an operator-supplied file into the staging slot for its format.
    ///
    /// `.json` files go to the document slot, everything else is treated as CSV.
    /// With a schema, a CSV's header row must name the schema's columns in
    /// schema order; it is staged with the schema's `column.type()` annotations.
    pub async fn stage_uploaded_file(&self, source: &Path, schema: Option<&ColumnSchema>) -> OpsResult<StagedFile> {
        let format = format_for(source);
        let target = match format {
            StagingFormat::Document => self.document_path(),
            StagingFormat::Delimited => self.delimited_path(),
        };
        let bytes = tokio::fs::read(source).await.map_err(|err| {
            warn!("💀 could not read uploaded file {}: {}", source.display(), err);
            OpsError::staging(source, err)
        })?;
        let rows = count_rows(&bytes, format);
        let body = match (format, schema) {
            (StagingFormat::Delimited, Some(schema)) => delimited::annotate_header(&bytes, schema),
            _ => Ok(bytes),
        };
        self.write_fail_closed(&target, body).await?;
        info!(
            "📎 staged uploaded file {} → {} ({} row(s))",
            source.display(),
            target.display(),
            rows
        );
        Ok(StagedFile {
            path: target,
            format,
            rows,
        })
    }

    /// 🧹 Clear, write, and on failure clear again. `body` arrives as a result so
    /// encoding errors take the same exit as disk errors.
    async fn write_fail_closed(&self, path: &Path, body: io::Result<Vec<u8>>) -> OpsResult<()> {
        remove_if_present(path).await.map_err(|err| {
            warn!("💀 could not clear stale staged file {}: {}", path.display(), err);
            OpsError::staging(path, err)
        })?;

        let written = match body {
            Ok(bytes) => write_file(&self.config.temp_dir, path, &bytes).await,
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            warn!("💀 staging {} failed: {}", path.display(), err);
            if let Err(cleanup) = remove_if_present(path).await {
                warn!("⚠️ could not remove partial file {}: {}", path.display(), cleanup);
            }
            return Err(OpsError::staging(path, err));
        }
        debug!("✅ wrote {}", path.display());
        Ok(())
    }
}

/// 🔍 Read a staged (or any conforming) CSV file back into a batch.
pub async fn read_delimited_file(path: &Path) -> OpsResult<TabularBatch> {
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        warn!("💀 could not read {}: {}", path.display(), err);
        OpsError::staging(path, err)
    })?;
    delimited::parse(&bytes).map_err(|err| {
        warn!("💀 {} is not readable as delimited text: {}", path.display(), err);
        OpsError::staging(path, err)
    })
}

/// 🏷️ Which slot a file belongs in, by extension.
pub fn format_for(path: &Path) -> StagingFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => StagingFormat::Document,
        _ => StagingFormat::Delimited,
    }
}

/// 🔢 Data rows in a file: array length for JSON, records after the header for CSV.
///
/// Either format falls back to counting lines when it does not parse.
pub fn count_rows(bytes: &[u8], format: StagingFormat) -> usize {
    let counted = match format {
        StagingFormat::Document => json_array::count_documents(bytes),
        StagingFormat::Delimited => delimited::count_records(bytes).ok(),
    };
    counted.unwrap_or_else(|| match format {
        StagingFormat::Document => line_count(bytes),
        StagingFormat::Delimited => line_count(bytes).saturating_sub(1),
    })
}

fn line_count(bytes: &[u8]) -> usize {
    let newlines = memchr::memchr_iter(b'\n', bytes).count();
    // -- a last line without a trailing newline still counts
    match bytes.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

async fn write_file(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, bytes).await
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
