//! Per-application manifest difference

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::diff::properties::PropertiesDiff;
use crate::models::manifest::{ApplicationManifest, REPLICA_COUNT_PROPERTY};

/// Five independent sub-diffs of one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationManifestDifference {
    pub application_name: String,
    pub api_and_kind: PropertiesDiff,
    pub metadata: PropertiesDiff,
    pub resource_and_version: PropertiesDiff,
    pub application_properties: PropertiesDiff,
    pub deployment_properties: PropertiesDiff,
}

impl ApplicationManifestDifference {
    pub fn are_equal(&self) -> bool {
        self.api_and_kind.are_equal()
            && self.metadata.are_equal()
            && self.resource_and_version.are_equal()
            && self.application_properties.are_equal()
            && self.deployment_properties.are_equal()
    }

    /// Human readable description of what changed.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if self.are_equal() {
            let _ = writeln!(out, "Application [{}] is unchanged", self.application_name);
            return out;
        }
        let _ = writeln!(out, "Application [{}] has changed", self.application_name);
        for (title, diff) in [
            ("API and kind", &self.api_and_kind),
            ("Metadata", &self.metadata),
            ("Resource and version", &self.resource_and_version),
            ("Application properties", &self.application_properties),
            ("Deployment properties", &self.deployment_properties),
        ] {
            if diff.are_equal() {
                continue;
            }
            let _ = writeln!(out, "  {}:", title);
            if !diff.changed.is_empty() {
                let changed: Vec<String> = diff
                    .changed
                    .iter()
                    .map(|(k, c)| format!("{}=({}, {})", k, c.original, c.replaced))
                    .collect();
                let _ = writeln!(out, "    changed: {}", changed.join(", "));
            }
            if !diff.added.is_empty() {
                let _ = writeln!(out, "    added: {}", entries(&diff.added));
            }
            if !diff.removed.is_empty() {
                let _ = writeln!(out, "    removed: {}", entries(&diff.removed));
            }
        }
        out
    }
}

fn entries(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}=({})", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compare the existing and replacing manifest entries of one application.
pub fn diff(
    application_name: &str,
    existing: &ApplicationManifest,
    replacing: &ApplicationManifest,
) -> ApplicationManifestDifference {
    ApplicationManifestDifference {
        application_name: application_name.to_string(),
        api_and_kind: PropertiesDiff::between(&api_and_kind(existing), &api_and_kind(replacing)),
        metadata: PropertiesDiff::between(&existing.metadata, &replacing.metadata),
        resource_and_version: PropertiesDiff::between(
            &resource_and_version(existing),
            &resource_and_version(replacing),
        ),
        application_properties: PropertiesDiff::between(
            &existing.spec.application_properties,
            &replacing.spec.application_properties,
        ),
        deployment_properties: PropertiesDiff::between(
            &without_replica_count(&existing.spec.deployment_properties),
            &without_replica_count(&replacing.spec.deployment_properties),
        ),
    }
}

fn api_and_kind(manifest: &ApplicationManifest) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("apiVersion".to_string(), manifest.api_version.trim().to_string()),
        ("kind".to_string(), manifest.kind.trim().to_string()),
    ])
}

fn resource_and_version(manifest: &ApplicationManifest) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("resource".to_string(), manifest.spec.resource.trim().to_string()),
        ("version".to_string(), manifest.spec.version.trim().to_string()),
    ])
}

fn without_replica_count(properties: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut properties = properties.clone();
    properties.remove(REPLICA_COUNT_PROPERTY);
    properties
}
