//! # 📡 THE SEARCH-INDEX CLIENT
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 PM
//!
//! A new index generation finished building twenty minutes ago. It sits there,
//! full of fresh documents, with no alias pointing at it. The old generation is
//! still serving traffic. Somebody has to move the alias. Somebody has to delete
//! the three generations before that, which have been quietly eating disk since March.
//!
//! That somebody used to click through a dashboard. Now they call this module.
//!
//! 🧠 Knowledge graph:
//! - `SearchConfig` → where the cluster is and how to authenticate
//! - `SearchClient` → one `reqwest::Client`, reused for the whole session
//! - every operation is a single call-and-respond. no retries, no orchestration.
//! - pure alias logic (batch building, orphan selection) lives in [`aliases`]
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

pub mod aliases;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::{OpsError, OpsResult};
pub use aliases::{AliasAction, AliasRebindBatch, AliasTarget, select_orphans, sibling_pattern};

// ============================================================
//  🔧 SearchConfig
// ============================================================

/// 🔧 How to reach the cluster.
///
/// `url` wins over `url_file`. The file is the old "cluster URL in a text file"
/// convention: one line, maybe a trailing newline, maybe no scheme.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_file: Option<PathBuf>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🧪 An alias containing this is a dev alias, and a dev alias alone does not keep an index alive.
    #[serde(default = "default_dev_marker")]
    pub dev_marker: String,
    /// 🔒 Indices and aliases starting with this belong to the cluster, not to us.
    #[serde(default = "default_system_prefix")]
    pub system_prefix: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_dev_marker() -> String {
    "dev".to_string()
}

fn default_system_prefix() -> String {
    ".".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: None,
            url_file: None,
            username: None,
            password: None,
            api_key: None,
            dev_marker: default_dev_marker(),
            system_prefix: default_system_prefix(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SearchConfig {
    /// 🎯 Config pointing at `url`, everything else default. Handy for tests and one-liners.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// 🔗 The cluster base URL: from `url`, else from `url_file`, normalized.
    pub fn resolved_url(&self) -> OpsResult<String> {
        let raw = match (&self.url, &self.url_file) {
            (Some(url), _) => url.clone(),
            (None, Some(url_file)) => std::fs::read_to_string(url_file).map_err(|err| {
                OpsError::Config(format!(
                    "cluster URL file '{}' could not be read: {err}",
                    url_file.display()
                ))
            })?,
            (None, None) => {
                return Err(OpsError::MissingPrerequisite(
                    "no cluster URL: set search.url, search.url_file or IDXOPS_SEARCH__URL".into(),
                ));
            }
        };
        normalize_url(&raw)
    }
}

/// 🧽 Trim it, give it a scheme if it forgot one, drop the trailing slash.
pub fn normalize_url(raw: &str) -> OpsResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OpsError::MissingPrerequisite("cluster URL is empty".into()));
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    Ok(with_scheme.trim_end_matches('/').to_string())
}

/// 🎯 One concrete index name, or `MissingPrerequisite`.
///
/// Wildcards, comma lists and `_all` would let one DELETE take out many indices.
pub fn check_concrete_index(index: &str) -> OpsResult<()> {
    let trimmed = index.trim();
    if trimmed.is_empty() {
        return Err(OpsError::MissingPrerequisite("an index name is empty".into()));
    }
    if trimmed == "_all" || trimmed.contains(['*', ',', '?']) {
        return Err(OpsError::MissingPrerequisite(format!(
            "'{index}' names more than one index; delete takes concrete index names only"
        )));
    }
    Ok(())
}

// ============================================================
//  📬 Results
// ============================================================

/// 📬 What came back from a rebind. Non-2xx is a failed outcome, not an `Err`:
/// the operator gets the raw body either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindOutcome {
    pub succeeded: bool,
    pub status: u16,
    pub body: String,
}

/// 🗑️ One index that refused to die.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub index: String,
    /// `None` when the request never got a response at all
    pub status: Option<u16>,
    pub detail: String,
}

/// 🗑️ The body count after `delete_indices`. Successes are not rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

// -- 📋 wire shapes, only the fields we actually read
#[derive(Debug, Deserialize)]
struct CatIndexRow {
    index: String,
}

#[derive(Debug, Deserialize)]
struct CatAliasRow {
    alias: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct IndexAliases {
    #[serde(default)]
    aliases: BTreeMap<String, serde_json::Value>,
}

// ============================================================
//  📡 SearchClient
// ============================================================

/// 📡 The cluster whisperer. Holds one HTTP client for the whole session.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    config: SearchConfig,
}

impl SearchClient {
    /// 🚀 Build the client. No request is sent here; the first call finds out if the cluster is real.
    pub fn new(config: SearchConfig) -> OpsResult<Self> {
        let base_url = config.resolved_url()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        info!("📡 search client ready for {}", base_url);
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// 🔐 A request with auth attached: ApiKey if we have one, else basic auth, else nothing.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.request(method, url);
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("ApiKey {api_key}"));
        } else if let Some(ref username) = self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }
        request
    }

    /// 📥 GET + status check + decode. Non-2xx becomes `Upstream` with the body attached.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> OpsResult<T> {
        debug!("📡 GET {}/{}", self.base_url, path);
        let response = self.request(Method::GET, path).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("💀 GET {} answered {}: {}", path, status, body);
            return Err(OpsError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|err| {
            error!("💀 GET {} returned JSON we could not read: {}", path, err);
            OpsError::Decode(format!("{path}: {err}"))
        })
    }

    /// 📋 Index names from `_cat/indices`, optionally narrowed by a pattern (`*products*`).
    /// Newest-looking names first, the way the cluster sorts `index:desc`.
    pub async fn list_indices(&self, pattern: Option<&str>) -> OpsResult<Vec<String>> {
        let path = match pattern {
            Some(pattern) => format!("_cat/indices/{pattern}?format=json&s=index:desc"),
            None => "_cat/indices?format=json&s=index:desc".to_string(),
        };
        let rows: Vec<CatIndexRow> = self.get_json(&path).await?;
        Ok(rows.into_iter().map(|row| row.index).collect())
    }

    /// 🔗 Alias → indices, system aliases and system indices left out.
    pub async fn list_aliases(&self) -> OpsResult<BTreeMap<String, Vec<String>>> {
        let rows: Vec<CatAliasRow> = self
            .get_json("_cat/aliases?format=json&s=index:desc")
            .await?;
        let prefix = self.config.system_prefix.as_str();
        let mut alias_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            if aliases::is_system(&row.alias, prefix) || aliases::is_system(&row.index, prefix) {
                continue;
            }
            alias_map.entry(row.alias).or_default().push(row.index);
        }
        Ok(alias_map)
    }

    /// 🏷️ Aliases currently pointing at `index`, sorted. A missing index is `NotFound`.
    pub async fn aliases_for_index(&self, index: &str) -> OpsResult<Vec<String>> {
        let path = format!("{}/_alias", urlencoding::encode(index));
        let mut body: BTreeMap<String, IndexAliases> = match self.get_json(&path).await {
            Ok(body) => body,
            Err(OpsError::Upstream { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                warn!("🔍 index '{}' does not exist", index);
                return Err(OpsError::NotFound {
                    index: index.to_string(),
                });
            }
            Err(err) => return Err(err),
        };
        // -- 🔄 the key is the concrete index name. if the caller passed an alias we get
        // -- its backing indices instead, so fold them all together.
        let aliases: Vec<String> = match body.remove(index) {
            Some(entry) => entry.aliases.into_keys().collect(),
            None => {
                let mut merged: Vec<String> = body
                    .into_values()
                    .flat_map(|entry| entry.aliases.into_keys())
                    .collect();
                merged.sort();
                merged.dedup();
                merged
            }
        };
        Ok(aliases)
    }

    /// 🧹 Indices with no alias (or, unless `exclude_dev`, only a dev alias), sorted ascending.
    pub async fn indices_without_alias(&self, exclude_dev: bool) -> OpsResult<Vec<String>> {
        let body: BTreeMap<String, IndexAliases> = self.get_json("_alias").await?;
        let alias_map: BTreeMap<String, Vec<String>> = body
            .into_iter()
            .map(|(index, entry)| (index, entry.aliases.into_keys().collect()))
            .collect();
        Ok(select_orphans(
            &alias_map,
            exclude_dev,
            &self.config.dev_marker,
            &self.config.system_prefix,
        ))
    }

    /// 👪 Other generations of the same index: `v41_products` → everything matching `*products`.
    pub async fn sibling_indices(&self, index: &str) -> OpsResult<Vec<String>> {
        self.list_indices(Some(&sibling_pattern(index))).await
    }

    /// 🔄 Move `aliases` from `old_index` to `new_index` in one `_aliases` request.
    ///
    /// The cluster applies the batch as a unit. We do not retry and we do not
    /// try to undo anything: the outcome carries the status and the raw body.
    pub async fn rebind_alias<S: AsRef<str>>(
        &self,
        old_index: &str,
        new_index: &str,
        aliases: &[S],
    ) -> OpsResult<RebindOutcome> {
        if aliases.is_empty() {
            warn!("🙅 rebind requested with no aliases selected");
            return Err(OpsError::MissingPrerequisite(
                "select at least one alias to move".into(),
            ));
        }
        if old_index == new_index {
            warn!("🙅 rebind requested from '{}' onto itself", old_index);
            return Err(OpsError::MissingPrerequisite(format!(
                "old and new index are both '{old_index}'"
            )));
        }

        let batch = AliasRebindBatch::rebind(old_index, new_index, aliases);
        let alias_names: Vec<&str> = aliases.iter().map(|alias| alias.as_ref()).collect();
        info!(
            "🔄 moving {:?} from {} -> to {} ({} actions)",
            alias_names,
            old_index,
            new_index,
            batch.len()
        );

        let body = serde_json::to_vec(&batch)
            .map_err(|err| OpsError::Decode(format!("alias batch did not serialize: {err}")))?;
        let response = self
            .request(Method::POST, "_aliases")
            .header("Content-Type", "application/json; charset=utf-8")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            info!("✅ aliases moved: {}", body);
        } else {
            error!("💀 alias rebind answered {}: {}", status, body);
        }
        Ok(RebindOutcome {
            succeeded: status.is_success(),
            status: status.as_u16(),
            body,
        })
    }

    /// 🗑️ Delete each index on its own. One failure does not stop the others,
    /// and nothing that succeeded is rolled back.
    pub async fn delete_indices<S: AsRef<str>>(&self, indices: &[S]) -> OpsResult<DeleteReport> {
        if indices.is_empty() {
            return Err(OpsError::MissingPrerequisite(
                "select at least one index to delete".into(),
            ));
        }
        // -- all names are checked before the first request goes out
        for index in indices {
            if let Err(err) = check_concrete_index(index.as_ref()) {
                warn!("🙅 delete refused: {}", err);
                return Err(err);
            }
        }
        let mut report = DeleteReport::default();
        for index in indices {
            let index = index.as_ref();
            info!("🗑️ deleting index {}", index);
            match self
                .request(Method::DELETE, &urlencoding::encode(index))
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if status.is_success() {
                        report.deleted.push(index.to_string());
                    } else {
                        error!("💀 delete {} answered {}: {}", index, status, body);
                        report.failures.push(DeleteFailure {
                            index: index.to_string(),
                            status: Some(status.as_u16()),
                            detail: body,
                        });
                    }
                }
                Err(err) => {
                    error!("💀 delete {} never got an answer: {}", index, err);
                    report.failures.push(DeleteFailure {
                        index: index.to_string(),
                        status: None,
                        detail: err.to_string(),
                    });
                }
            }
        }
        if report.all_succeeded() {
            info!("✅ deleted {} index(es)", report.deleted.len());
        } else {
            warn!(
                "⚠️ deleted {} index(es), {} failed",
                report.deleted.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }
}
