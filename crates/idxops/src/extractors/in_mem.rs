//! 🧪 In-memory relational source, for tests and dry runs.
//!
//! 🎬 *[a database with no server, no port and no password. it only knows the
//! answers to the questions you told it about. it is, frankly, thriving.]*
//!
//! Queries are matched by exact text. Anything unrecognised is a `SourceQuery`
//! error, the same way a real server would reject a query against a table that
//! isn't there. Every query that comes in is recorded so tests can assert on it. 🦆

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::RelationalSource;
use crate::common::TabularBatch;
use crate::error::{OpsError, OpsResult};

/// 📦 Canned answers keyed by query text.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    results: HashMap<String, TabularBatch>,
    /// 🔒 Every query ever asked, in order. Shared so a test can keep a handle.
    pub seen: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// ➕ Teach the source one answer.
    pub fn with_result(mut self, query: impl Into<String>, batch: TabularBatch) -> Self {
        self.results.insert(query.into(), batch);
        self
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl RelationalSource for InMemorySource {
    async fn run_query(&mut self, query: &str) -> OpsResult<TabularBatch> {
        self.seen.lock().await.push(query.to_string());
        match self.results.get(query) {
            Some(batch) => {
                debug!("🧪 in-memory source answering with {} row(s)", batch.row_count());
                Ok(batch.clone())
            }
            None => Err(OpsError::SourceQuery(format!(
                "no canned result for query: {query}"
            ))),
        }
    }

    async fn close(&mut self) -> OpsResult<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}
