//! Differences between two configuration snapshots

use crate::FrozenConfiguration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tamaya_core::is_meta_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// Change of a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub kind: ChangeKind,
}

/// All key changes between two snapshots, ordered by key
///
/// Only ordinary keys are compared; `_key.<suffix>` rows follow their key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationChange {
    old_version: u64,
    new_version: u64,
    timestamp: DateTime<Utc>,
    changes: Vec<PropertyChange>,
}

impl ConfigurationChange {
    pub fn between(old: &FrozenConfiguration, new: &FrozenConfiguration) -> Self {
        let keys: BTreeSet<&String> = old
            .properties()
            .keys()
            .chain(new.properties().keys())
            .filter(|key| !is_meta_key(key))
            .collect();

        let changes = keys
            .into_iter()
            .filter_map(|key| {
                let before = old.get(key);
                let after = new.get(key);
                let kind = match (before, after) {
                    (None, Some(_)) => ChangeKind::Added,
                    (Some(_), None) => ChangeKind::Removed,
                    (Some(b), Some(a)) if a != b => ChangeKind::Updated,
                    _ => return None,
                };
                Some(PropertyChange {
                    key: key.clone(),
                    old_value: before.map(String::from),
                    new_value: after.map(String::from),
                    kind,
                })
            })
            .collect();

        Self {
            old_version: old.version(),
            new_version: new.version(),
            timestamp: Utc::now(),
            changes,
        }
    }

    pub fn old_version(&self) -> u64 {
        self.old_version
    }

    pub fn new_version(&self) -> u64 {
        self.new_version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn changes(&self) -> &[PropertyChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.changes.iter().any(|c| c.key == key)
    }

    pub fn added(&self) -> impl Iterator<Item = &PropertyChange> {
        self.of_kind(ChangeKind::Added)
    }

    pub fn updated(&self) -> impl Iterator<Item = &PropertyChange> {
        self.of_kind(ChangeKind::Updated)
    }

    pub fn removed(&self) -> impl Iterator<Item = &PropertyChange> {
        self.of_kind(ChangeKind::Removed)
    }

    fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &PropertyChange> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}
