//! Key/value set difference

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Value of a key present on both sides with different contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub original: String,
    pub replaced: String,
}

/// Difference between an existing (left) and replacing (right) property map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesDiff {
    /// Keys only on the replacing side
    pub added: BTreeMap<String, String>,

    /// Keys only on the existing side
    pub removed: BTreeMap<String, String>,

    /// Keys on both sides with different values
    pub changed: BTreeMap<String, PropertyChange>,

    /// Keys on both sides with equal values
    pub common: BTreeMap<String, String>,
}

impl PropertiesDiff {
    /// Compare two maps by key. Values are trimmed before comparison.
    pub fn between(left: &BTreeMap<String, String>, right: &BTreeMap<String, String>) -> Self {
        let mut diff = PropertiesDiff::default();

        for (key, value) in left {
            let original = value.trim();
            match right.get(key) {
                None => {
                    diff.removed.insert(key.clone(), original.to_string());
                }
                Some(replaced) if replaced.trim() == original => {
                    diff.common.insert(key.clone(), original.to_string());
                }
                Some(replaced) => {
                    diff.changed.insert(
                        key.clone(),
                        PropertyChange {
                            original: original.to_string(),
                            replaced: replaced.trim().to_string(),
                        },
                    );
                }
            }
        }

        for (key, value) in right {
            if !left.contains_key(key) {
                diff.added.insert(key.clone(), value.trim().to_string());
            }
        }

        diff
    }

    pub fn are_equal(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
