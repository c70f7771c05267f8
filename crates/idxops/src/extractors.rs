//! 🚰 Extractors: where the rows come from.
//!
//! 🎭 Need rows out of MariaDB? There's a backend for that. Need rows out of
//! thin air for a test? There's a backend for that too. The orchestrator
//! doesn't care which. It asks for a query result and gets a `TabularBatch`.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use async_trait::async_trait;

use crate::common::TabularBatch;
use crate::error::OpsResult;

pub mod in_mem;
pub mod mariadb;

pub use in_mem::InMemorySource;
pub use mariadb::{MariaDbSource, RelationalConfig};

/// 🚰 A relational source that can answer one query with one fully materialized table.
///
/// # Contract
/// - the whole result is in memory when `run_query` returns. no streaming.
/// - column kinds come from the driver's metadata, not from sniffing values
/// - any connection or query failure is `OpsError::SourceQuery`. no retry.
/// - zero rows is a perfectly good answer, and the columns are still there
#[async_trait]
pub trait RelationalSource: std::fmt::Debug + Send {
    /// 📦 Run `query`, hand back every row.
    async fn run_query(&mut self, query: &str) -> OpsResult<TabularBatch>;

    /// 🗑️ Let go of connections. Default: nothing to let go of.
    async fn close(&mut self) -> OpsResult<()> {
        Ok(())
    }
}
