//! The per-session fact memory.
//!
//! A small string-key → string-value map of durable facts distilled from
//! the dialogue (`"goal" → "ship v1"`). The map is read at the start of a
//! turn and overwritten wholesale after it — there is no per-key
//! versioning and no conflict detection between concurrent turns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered mapping of short fact keys to values.
///
/// Backed by a `BTreeMap` so rendering and serialization are
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactMap(BTreeMap<String, String>);

impl FactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the non-empty entries as a `- key: value` block.
    ///
    /// Entries whose value is empty or whitespace-only are skipped.
    /// Returns `None` when nothing renders, so callers can leave the
    /// system prompt untouched.
    pub fn render_block(&self) -> Option<String> {
        let lines: Vec<String> = self
            .0
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("- {}: {}", k, v))
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    /// Right-biased shallow merge: keys from `overlay` win, keys absent
    /// from it are preserved. Never removes a key.
    pub fn merged(&self, overlay: &FactMap) -> FactMap {
        let mut out = self.0.clone();
        for (k, v) in &overlay.0 {
            out.insert(k.clone(), v.clone());
        }
        FactMap(out)
    }
}

impl FromIterator<(String, String)> for FactMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        FactMap(iter.into_iter().collect())
    }
}
