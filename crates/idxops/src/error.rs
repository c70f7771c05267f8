//! 💀 The error taxonomy. Every way an operator's afternoon can be ruined, catalogued.
//!
//! 🎬 *[a cluster returns 503. a mongoimport exits 1. a CSV refuses to be born.]*
//! *["which one of you did it?" asks the detective. they all did. separately.]*
//!
//! 🧠 Knowledge graph:
//! - `Upstream` / `NotFound` / `Transport` → the search cluster said no (or said nothing)
//! - `SourceQuery` → MariaDB said no
//! - `StagingIo` → the disk said no; no file was produced, nothing gets imported
//! - `ImportTool` → mongoimport said no, and we kept everything it muttered on the way out
//! - `MissingPrerequisite` → the operator forgot something; we refuse before touching anything
//!
//! Nothing here is retried. Everything here is logged before it surfaces. 🦆

use std::path::PathBuf;

use thiserror::Error;

/// 💀 One enum to hold every failure the library can hand back.
#[derive(Debug, Error)]
pub enum OpsError {
    /// 📡 The cluster answered, but not with a 2xx. The raw body rides along for diagnostics.
    #[error("💀 search cluster answered {status}: {body}")]
    Upstream { status: u16, body: String },

    /// 🔍 The index you asked about does not exist. We knocked. Nobody was home.
    #[error("💀 index '{index}' does not exist")]
    NotFound { index: String },

    /// 🔌 The request never got an answer at all. Firewalls, DNS, or a cluster taking a nap.
    #[error("💀 could not talk to the search cluster")]
    Transport(#[from] reqwest::Error),

    /// 🐬 The relational source refused the connection or the query.
    #[error("💀 relational query failed: {0}")]
    SourceQuery(String),

    /// 📁 The staged file could not be written. No partial file was left behind.
    #[error("💀 no staged file produced at '{}'", path.display())]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 🧨 The bulk-load tool exited non-zero (or never started). stdout/stderr are verbatim.
    #[error("💀 bulk import tool failed (exit code {exit_code:?})\nstdout: {stdout}\nstderr: {stderr}")]
    ImportTool {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// 🙅 A precondition was not met, so nothing was attempted.
    #[error("💀 missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// 🦆 The cluster sent JSON we could not make sense of.
    #[error("💀 could not decode response: {0}")]
    Decode(String),

    /// 🔧 Configuration is incomplete or contradictory.
    #[error("💀 configuration problem: {0}")]
    Config(String),
}

pub type OpsResult<T> = Result<T, OpsError>;

impl OpsError {
    /// 📁 Shorthand for the staging failure, because every call site knows its path.
    pub(crate) fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OpsError::StagingIo {
            path: path.into(),
            source,
        }
    }

    /// 🔌 True when the failure smells like "the service isn't there".
    pub fn is_connectivity(&self) -> bool {
        match self {
            OpsError::Transport(err) => err.is_connect() || err.is_timeout(),
            OpsError::SourceQuery(msg) => {
                msg.contains("Connection refused") || msg.contains("connection refused")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_import_tool_error_keeps_every_word() {
        let err = OpsError::ImportTool {
            exit_code: Some(1),
            stdout: "connected to: mongodb://localhost".to_string(),
            stderr: "Failed: E11000 duplicate key".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("exit code Some(1)"));
        assert!(rendered.contains("E11000 duplicate key"));
        assert!(rendered.contains("connected to"));
    }

    #[test]
    fn the_one_where_a_refused_sql_connection_counts_as_connectivity() {
        let err = OpsError::SourceQuery("error communicating with database: Connection refused".into());
        assert!(err.is_connectivity());
        assert!(!OpsError::MissingPrerequisite("nope".into()).is_connectivity());
    }
}
