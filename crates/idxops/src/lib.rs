//! 🧰 idxops — alias shuffling for a search cluster, and table-to-collection copies.
//!
//! 🎬 *[two jobs nobody wants, one crate that does both without complaining.]*
//!
//! 🧠 Knowledge graph:
//! - `search` → list / rebind / delete against the cluster's REST API. one call, one answer.
//! - `extractors` → rows out of MariaDB (or out of memory, in tests)
//! - `staging` → rows into a JSON array or a typed CSV under the temp dir
//! - `importers` → that file into a collection via the bulk-load tool
//! - `migration` → the three above, in order, for one task or many
//! - `session` → the handles all of it shares for one operator run 🦆

pub mod app_config;
pub mod common;
pub mod error;
pub mod extractors;
pub mod importers;
pub mod migration;
pub mod progress;
pub mod search;
pub mod session;
pub mod staging;

pub use error::{OpsError, OpsResult};
pub use session::Session;
