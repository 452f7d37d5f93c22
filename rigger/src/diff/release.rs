//! Whole-release difference

use serde::{Deserialize, Serialize};

use crate::diff::application::ApplicationManifestDifference;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDifference {
    pub differences: Vec<ApplicationManifestDifference>,
}

impl ReleaseDifference {
    pub fn new(differences: Vec<ApplicationManifestDifference>) -> Self {
        Self { differences }
    }

    pub fn are_equal(&self) -> bool {
        self.differences.iter().all(|d| d.are_equal())
    }

    /// Names of the applications with a difference, in manifest order
    pub fn changed_application_names(&self) -> Vec<String> {
        self.differences
            .iter()
            .filter(|d| !d.are_equal())
            .map(|d| d.application_name.clone())
            .collect()
    }

    pub fn summary(&self) -> String {
        self.differences.iter().map(|d| d.summary()).collect()
    }
}
