//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the secrets file. Nothing." (every operator at 4:55pm on a Friday) 🦆
//!
//! 🏗️ Three files and an environment walk into a Figment:
//! - the main config (`idxops.toml`): cluster, staging, tool paths
//! - the secrets file (`secrets.toml`): `[relational]` and `[document_store]` credentials
//! - the task schema file (`tasks.json` or `tasks.toml`): task name → what to migrate where
//! - `IDXOPS_*` env vars, nested with `__` (`IDXOPS_SEARCH__URL=...`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Json, Toml},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::common::{ColumnSchema, ColumnType, IndexSpec, MigrationTask, TaskSource};
use crate::error::{OpsError, OpsResult};
use crate::extractors::mariadb::RelationalConfig;
use crate::importers::mongoimport::DocumentStoreConfig;
use crate::migration::PlannedTask;
use crate::search::SearchConfig;
use crate::staging::StagingConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the search cluster lives. Mandatory, like coffee.
    #[serde(default)]
    pub search: SearchConfig,
    /// 🐬 MariaDB credentials. Only the migrate command needs them.
    #[serde(default)]
    pub relational: Option<RelationalConfig>,
    /// 🍃 MongoDB credentials + mongoimport knobs. Also only for migrate.
    #[serde(default)]
    pub document_store: Option<DocumentStoreConfig>,
    #[serde(default)]
    pub staging: StagingConfig,
    /// 🚚 Task name → task description. BTreeMap, so `idxops tasks` lists them alphabetically.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

/// 🚚 A task as written by a human in the task schema file.
///
/// Exactly one of `query` / `source_file`. `database` falls back to
/// `document_store.default_database` when omitted.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TaskConfig {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub source_file: Option<PathBuf>,
    #[serde(default)]
    pub database: Option<String>,
    pub collection: String,
    #[serde(default)]
    pub schema: Option<Vec<ColumnType>>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl TaskConfig {
    /// 🔄 Turn the human-written task into the orchestrator's `MigrationTask`.
    pub fn to_task(&self, name: &str, default_database: Option<&str>) -> OpsResult<MigrationTask> {
        let source = match (&self.query, &self.source_file) {
            (Some(query), None) => TaskSource::Query(query.clone()),
            (None, Some(file)) => TaskSource::File(file.clone()),
            (Some(_), Some(_)) => {
                return Err(OpsError::Config(format!(
                    "task '{name}' names both a query and a source_file. Pick one. Commitment is healthy."
                )));
            }
            (None, None) => {
                return Err(OpsError::Config(format!(
                    "task '{name}' has neither a query nor a source_file. There is nothing to migrate."
                )));
            }
        };
        let database = self
            .database
            .clone()
            .or_else(|| default_database.map(str::to_string))
            .unwrap_or_default();
        Ok(MigrationTask {
            name: name.to_string(),
            source,
            database,
            collection: self.collection.clone(),
            schema: self
                .schema
                .as_ref()
                .filter(|columns| !columns.is_empty())
                .map(|columns| ColumnSchema::new(columns.clone())),
            indexes: self.indexes.clone(),
        })
    }
}

impl AppConfig {
    /// 🎯 Look up one configured task by name.
    pub fn task(&self, name: &str) -> OpsResult<MigrationTask> {
        let task_config = self.tasks.get(name).ok_or_else(|| {
            OpsError::MissingPrerequisite(format!(
                "no task named '{name}' in the task schema file (known: {})",
                self.tasks.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        task_config.to_task(name, self.default_database())
    }

    /// 📋 Every configured task, alphabetically. A task whose entry doesn't make
    /// sense comes back as `Invalid` instead of sinking the others.
    pub fn planned_tasks(&self) -> Vec<PlannedTask> {
        self.tasks.keys().map(|name| self.planned_task(name)).collect()
    }

    /// 🎯 One task by name, broken or not. Unknown names are `Invalid` too.
    pub fn planned_task(&self, name: &str) -> PlannedTask {
        match self.task(name) {
            Ok(task) => PlannedTask::Ready(task),
            Err(error) => {
                warn!("⚠️ task '{}' can't run as configured: {}", name, error);
                PlannedTask::Invalid {
                    name: name.to_string(),
                    error,
                }
            }
        }
    }

    fn default_database(&self) -> Option<&str> {
        self.document_store
            .as_ref()
            .and_then(|store| store.default_database.as_deref())
    }
}

/// 📎 The optional extra files that ride alongside the main config.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigFiles<'a> {
    pub config: Option<&'a Path>,
    pub secrets: Option<&'a Path>,
    pub tasks: Option<&'a Path>,
}

/// 🚀 Load the config: from files, from env vars, or from the sheer power of hoping.
///
/// 📐 Layering (later wins): `IDXOPS_*` env → main TOML → secrets TOML.
/// The task schema file is extracted on its own and merged into `tasks`,
/// because it is a bare `name → task` map with no `[tasks]` wrapper.
pub fn load_config(files: ConfigFiles<'_>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: config={:?} secrets={:?} tasks={:?}",
        files.config, files.secrets, files.tasks
    );

    let mut figment = Figment::new().merge(Env::prefixed("IDXOPS_").split("__"));
    if let Some(config_file) = files.config {
        figment = figment.merge(Toml::file(config_file));
    }
    if let Some(secrets_file) = files.secrets {
        figment = figment.merge(Toml::file(secrets_file));
    }

    let mut app_config: AppConfig = figment.extract().context(format!(
        "💀 Failed to parse configuration (config={:?}, secrets={:?}, env IDXOPS_*). \
         Somebody put a tab where a space should be, or a string where a number should be.",
        files.config, files.secrets
    ))?;

    if let Some(tasks_file) = files.tasks {
        let tasks = load_tasks_file(tasks_file)?;
        info!("📋 Loaded {} task(s) from {}", tasks.len(), tasks_file.display());
        app_config.tasks.extend(tasks);
    }

    Ok(app_config)
}

/// 📋 Read the task schema file. `.json` goes through the JSON provider, everything else TOML.
pub fn load_tasks_file(tasks_file: &Path) -> anyhow::Result<BTreeMap<String, TaskConfig>> {
    if !tasks_file.exists() {
        anyhow::bail!(
            "💀 task schema file '{}' does not exist. Upload it (well, copy it) and try again.",
            tasks_file.display()
        );
    }
    let is_json = tasks_file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let figment = if is_json {
        Figment::from(Json::file(tasks_file))
    } else {
        Figment::from(Toml::file(tasks_file))
    };
    figment.extract().context(format!(
        "💀 task schema file '{}' is not a valid name → task map",
        tasks_file.display()
    ))
}
