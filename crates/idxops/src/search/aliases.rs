//! 🔗 Alias bookkeeping: the pure half of the search client. No HTTP, just decisions.
//!
//! 🎬 *[an alias points at `v41_products`. it is asked to point at `v42_products`.]*
//! *["both at once?" it asks. "never both," says the cluster. "and never neither."]*
//!
//! 🧠 Knowledge graph:
//! - `AliasRebindBatch::rebind` → the `{"actions": [...]}` body for `POST /_aliases`
//! - `select_orphans` → which indices have no alias (or only a dev alias) worth keeping
//! - `sibling_pattern` → the wildcard that finds other generations of the same index

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 🎯 The index/alias pair inside one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub index: String,
    pub alias: String,
}

/// 🔄 One entry of the `_aliases` actions array.
///
/// Serializes as `{"remove": {"index": .., "alias": ..}}` or `{"add": {...}}`,
/// which is exactly what the cluster expects. serde's externally tagged enums
/// were born for this moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Remove(AliasTarget),
    Add(AliasTarget),
}

/// 📦 The whole batch, applied by the cluster in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRebindBatch {
    pub actions: Vec<AliasAction>,
}

impl AliasRebindBatch {
    /// 🚀 Move every alias from `old_index` to `new_index`.
    ///
    /// For each alias, in input order: remove(old) immediately followed by add(new).
    /// N aliases in, 2N actions out. No dedup, no sorting, no surprises.
    pub fn rebind<S: AsRef<str>>(old_index: &str, new_index: &str, aliases: &[S]) -> Self {
        let mut actions = Vec::with_capacity(aliases.len() * 2);
        for alias in aliases {
            let alias = alias.as_ref();
            actions.push(AliasAction::Remove(AliasTarget {
                index: old_index.to_string(),
                alias: alias.to_string(),
            }));
            actions.push(AliasAction::Add(AliasTarget {
                index: new_index.to_string(),
                alias: alias.to_string(),
            }));
        }
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// 🧹 Pick the indices nobody is pointing at.
///
/// An index qualifies when it has zero aliases, or, when `exclude_dev` is false,
/// exactly one alias whose name contains `dev_marker`. Indices whose name starts
/// with `system_prefix` are never candidates. Result is sorted ascending.
pub fn select_orphans(
    alias_map: &BTreeMap<String, Vec<String>>,
    exclude_dev: bool,
    dev_marker: &str,
    system_prefix: &str,
) -> Vec<String> {
    let mut orphans: Vec<String> = alias_map
        .iter()
        .filter(|(index, _)| !is_system(index, system_prefix))
        .filter(|(_, aliases)| match aliases.as_slice() {
            [] => true,
            [only] if !exclude_dev => !dev_marker.is_empty() && only.contains(dev_marker),
            _ => false,
        })
        .map(|(index, _)| index.clone())
        .collect();
    // -- BTreeMap iteration is already sorted, but the contract says sorted, so we say it twice
    orphans.sort();
    orphans
}

/// 🔎 `v41_products_kr` → `*products_kr`. Drops the first `_`-separated segment
/// (the generation prefix) and wildcards it, so every generation shows up.
pub fn sibling_pattern(index: &str) -> String {
    match index.split_once('_') {
        Some((_, rest)) if !rest.is_empty() => format!("*{rest}"),
        _ => format!("*{index}"),
    }
}

/// 🔒 System indices (and system aliases) start with a reserved prefix. Hands off.
pub(crate) fn is_system(name: &str, system_prefix: &str) -> bool {
    !system_prefix.is_empty() && name.starts_with(system_prefix)
}
