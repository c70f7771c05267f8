//! 🐬 MariaDB extractor — sqlx over the MySQL wire protocol.
//!
//! 🎬 *[a SELECT walks into a bar. the bar has 40,000 rows. the SELECT takes all of them.]*
//!
//! 🧠 Knowledge graph:
//! - `RelationalConfig` → lives in the secrets file under `[relational]`
//! - the pool is lazy: nothing connects until the first query, so a typo in the
//!   password shows up as a `SourceQuery` error at migrate time, not at startup
//! - column metadata comes from `prepare()`, so a zero-row result still has columns
//! - rows come back over the text protocol, so every value arrives as text and
//!   dates/decimals never need a special decoder
//! - `max_connections = 1` because there is exactly one operator. always.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as _, Executor, Row, Statement, TypeInfo, ValueRef};
use tracing::{debug, error, info};

use super::RelationalSource;
use crate::common::{CellValue, Column, ColumnKind, TabularBatch};
use crate::error::{OpsError, OpsResult};

/// 🐬 Connection details for the relational source.
#[derive(Debug, Deserialize, Clone)]
pub struct RelationalConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    1
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// 🐬 A lazily connected pool plus the config it came from.
#[derive(Debug)]
pub struct MariaDbSource {
    pool: MySqlPool,
    config: RelationalConfig,
}

impl MariaDbSource {
    /// 🚀 Build the pool without touching the network.
    pub fn connect_lazy(config: RelationalConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs.max(1)))
            .connect_lazy_with(options);
        info!(
            "🐬 relational source configured for {}@{}:{}/{}",
            config.username, config.host, config.port, config.database
        );
        Self { pool, config }
    }

    fn source_error(&self, stage: &str, err: sqlx::Error) -> OpsError {
        error!(
            "💀 {} failed against {}:{}/{}: {}",
            stage, self.config.host, self.config.port, self.config.database, err
        );
        OpsError::SourceQuery(format!("{stage}: {err}"))
    }
}

/// 🏷️ MySQL type name → what we will call it. Anything exotic is text.
pub fn column_kind_for(type_name: &str) -> ColumnKind {
    let upper = type_name.to_ascii_uppercase();
    match upper.trim_end_matches(" UNSIGNED") {
        "BOOLEAN" | "BOOL" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            ColumnKind::Int
        }
        "FLOAT" | "DOUBLE" | "REAL" => ColumnKind::Float,
        _ => ColumnKind::Text,
    }
}

fn decode_cell(row: &MySqlRow, ordinal: usize, kind: ColumnKind) -> Result<CellValue, sqlx::Error> {
    if row.try_get_raw(ordinal)?.is_null() {
        return Ok(CellValue::Null);
    }
    // -- 🔓 unchecked: the text protocol hands back strings, and these decoders
    // -- parse strings regardless of the declared column type
    let cell = match kind {
        ColumnKind::Bool => CellValue::Bool(row.try_get_unchecked::<bool, _>(ordinal)?),
        ColumnKind::Int => CellValue::Int(row.try_get_unchecked::<i64, _>(ordinal)?),
        ColumnKind::Float => CellValue::Float(row.try_get_unchecked::<f64, _>(ordinal)?),
        ColumnKind::Text => CellValue::Text(row.try_get_unchecked::<String, _>(ordinal)?),
    };
    Ok(cell)
}

#[async_trait]
impl RelationalSource for MariaDbSource {
    async fn run_query(&mut self, query: &str) -> OpsResult<TabularBatch> {
        debug!("🐬 preparing query: {}", query);
        let statement = (&self.pool)
            .prepare(query)
            .await
            .map_err(|err| self.source_error("prepare", err))?;
        let columns: Vec<Column> = statement
            .columns()
            .iter()
            .map(|column| Column::new(column.name(), column_kind_for(column.type_info().name())))
            .collect();

        let rows = sqlx::raw_sql(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| self.source_error("query", err))?;

        let mut batch = TabularBatch::new(columns);
        for row in &rows {
            let mut cells = Vec::with_capacity(batch.columns.len());
            for (ordinal, column) in batch.columns.iter().enumerate() {
                let cell = decode_cell(row, ordinal, column.kind)
                    .map_err(|err| self.source_error(&format!("decode column '{}'", column.name), err))?;
                cells.push(cell);
            }
            batch
                .push_row(cells)
                .map_err(|err| OpsError::SourceQuery(err.to_string()))?;
        }
        info!(
            "📦 query returned {} row(s) x {} column(s)",
            batch.row_count(),
            batch.columns.len()
        );
        Ok(batch)
    }

    async fn close(&mut self) -> OpsResult<()> {
        self.pool.close().await;
        debug!("🗑️ relational pool closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_mysql_types_get_sorted_into_four_buckets() {
        assert_eq!(column_kind_for("BIGINT"), ColumnKind::Int);
        assert_eq!(column_kind_for("INT UNSIGNED"), ColumnKind::Int);
        assert_eq!(column_kind_for("tinyint"), ColumnKind::Int);
        assert_eq!(column_kind_for("YEAR"), ColumnKind::Int);
        assert_eq!(column_kind_for("BOOLEAN"), ColumnKind::Bool);
        assert_eq!(column_kind_for("DOUBLE"), ColumnKind::Float);
        assert_eq!(column_kind_for("FLOAT"), ColumnKind::Float);
        assert_eq!(column_kind_for("DECIMAL"), ColumnKind::Text);
        assert_eq!(column_kind_for("VARCHAR"), ColumnKind::Text);
        assert_eq!(column_kind_for("DATETIME"), ColumnKind::Text);
        // -- 🕵️ POINT ends in "INT". it is not an int. it is a geometry with an identity crisis.
        assert_eq!(column_kind_for("POINT"), ColumnKind::Text);
    }

    #[test]
    fn the_one_where_the_secrets_section_fills_in_its_own_blanks() {
        let config: RelationalConfig = toml::from_str(
            r#"
            host = "maria.internal"
            database = "catalog"
            username = "reader"
            "#,
        )
        .expect("💀 minimal relational config should parse");
        assert_eq!(config.port, 3306);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.password, "");
    }
}
