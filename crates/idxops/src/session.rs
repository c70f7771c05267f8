//! 🎟️ Session: the long-lived handles one operator run shares across operations.
//!
//! 🎬 *[one HTTP client. one SQL pool. one importer. one staging directory.
//! they are born when the session opens and they die when it closes. in between,
//! every command borrows them.]*
//!
//! 🧠 Knowledge graph:
//! - the search client is built on first use, so `idxops migrate` never needs a cluster URL
//! - the relational source is built on first use too, and the pool behind it is lazy
//! - the importer comes from `[document_store]`; without it, migrate is a missing prerequisite
//! - `close()` releases the SQL pool. dropping works too, but `close()` says goodbye properly 🦆

use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::error::{OpsError, OpsResult};
use crate::extractors::{MariaDbSource, RelationalSource};
use crate::importers::{BulkImporter, MongoImport};
use crate::migration::{BatchReport, Migrator, PlannedTask};
use crate::search::SearchClient;
use crate::staging::StagingWriter;

#[derive(Debug)]
pub struct Session {
    config: AppConfig,
    search: Option<SearchClient>,
    source: Option<Box<dyn RelationalSource>>,
    importer: Option<Box<dyn BulkImporter>>,
    writer: StagingWriter,
}

impl Session {
    /// 🚀 Open a session. Nothing touches the network yet.
    pub fn open(config: AppConfig) -> Self {
        let importer: Option<Box<dyn BulkImporter>> = config
            .document_store
            .clone()
            .map(|store| Box::new(MongoImport::new(store)) as Box<dyn BulkImporter>);
        let writer = StagingWriter::new(config.staging.clone());
        info!(
            "🎟️ session opened (relational: {}, document store: {}, staging: {})",
            config.relational.is_some(),
            importer.is_some(),
            writer.temp_dir().display()
        );
        Self {
            config,
            search: None,
            source: None,
            importer,
            writer,
        }
    }

    /// 🔌 Swap in a different relational source (tests, or a source that isn't MariaDB).
    pub fn with_source(mut self, source: Box<dyn RelationalSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// 🔌 Swap in a different importer.
    pub fn with_importer(mut self, importer: Box<dyn BulkImporter>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn writer(&self) -> &StagingWriter {
        &self.writer
    }

    /// 📡 The search client, built the first time somebody asks.
    pub fn search(&mut self) -> OpsResult<&SearchClient> {
        let client = match self.search.take() {
            Some(client) => client,
            None => SearchClient::new(self.config.search.clone())?,
        };
        Ok(self.search.insert(client))
    }

    /// 🚚 Run `plan` through extract → stage → import with this session's handles.
    pub async fn migrate(&mut self, plan: Vec<PlannedTask>, show_progress: bool) -> OpsResult<BatchReport> {
        if self.source.is_none() {
            if let Some(relational) = self.config.relational.clone() {
                self.source = Some(Box::new(MariaDbSource::connect_lazy(relational)));
            }
        }
        let importer = require_importer(&self.importer)?;

        let mut migrator = Migrator::new(&self.writer, importer).with_progress(show_progress);
        if let Some(source) = self.source.as_deref_mut() {
            migrator = migrator.with_source(source);
        }
        Ok(migrator.run_plan(plan).await)
    }

    /// 🗄️ Databases on the destination store an import could target.
    pub async fn list_databases(&self) -> OpsResult<Vec<String>> {
        require_importer(&self.importer)?.list_databases().await
    }

    /// 👋 Release the SQL pool (if one was ever made).
    pub async fn close(mut self) -> OpsResult<()> {
        if let Some(source) = self.source.as_deref_mut() {
            source.close().await?;
        }
        debug!("🎟️ session closed");
        Ok(())
    }
}

fn require_importer(importer: &Option<Box<dyn BulkImporter>>) -> OpsResult<&dyn BulkImporter> {
    importer.as_deref().ok_or_else(|| {
        OpsError::MissingPrerequisite(
            "no [document_store] section in the secrets file, so there is no destination store".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CellValue, Column, ColumnKind, MigrationTask, TabularBatch};
    use crate::extractors::InMemorySource;
    use crate::importers::InMemoryImporter;
    use crate::search::SearchConfig;
    use crate::staging::StagingConfig;
    use std::collections::BTreeMap;

    fn config(temp_dir: std::path::PathBuf) -> AppConfig {
        AppConfig {
            search: SearchConfig::default(),
            relational: None,
            document_store: None,
            staging: StagingConfig { temp_dir },
            tasks: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn the_one_where_migrate_without_a_document_store_refuses_politely() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::open(config(dir.path().to_path_buf()));
        let err = session.migrate(Vec::new(), false).await.expect_err("no importer");
        assert!(matches!(err, OpsError::MissingPrerequisite(_)));
        let err = session.list_databases().await.expect_err("no importer");
        assert!(matches!(err, OpsError::MissingPrerequisite(_)));
    }

    #[test]
    fn the_one_where_no_cluster_url_only_matters_when_you_need_the_cluster() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::open(config(dir.path().to_path_buf()));
        assert!(matches!(session.search(), Err(OpsError::MissingPrerequisite(_))));

        let mut with_url = config(dir.path().to_path_buf());
        with_url.search = SearchConfig::for_url("localhost:9200");
        let mut session = Session::open(with_url);
        assert_eq!(session.search().expect("url set").base_url(), "http://localhost:9200");
    }

    #[tokio::test]
    async fn the_one_where_the_session_lends_its_handles_to_a_migration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut batch = TabularBatch::new(vec![Column::new("id", ColumnKind::Int)]);
        batch.push_row(vec![CellValue::Int(7)]).expect("row fits");
        let source = InMemorySource::new().with_result("select id from t", batch);
        let closed = source.clone();
        let importer = InMemoryImporter::new();
        let calls = importer.clone();

        let mut session = Session::open(config(dir.path().join("temp")))
            .with_source(Box::new(source))
            .with_importer(Box::new(importer));
        let report = session
            .migrate(
                vec![MigrationTask::from_query("t", "select id from t", "mirror", "t_copy").into()],
                false,
            )
            .await
            .expect("importer present");

        assert!(report.all_succeeded());
        assert_eq!(calls.calls().await.len(), 1);
        assert!(session.list_databases().await.expect("importer present").is_empty());
        session.close().await.expect("close");
        assert!(closed.is_closed().await);
    }
}
