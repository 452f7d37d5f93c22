//! Rendered manifest models
//!
//! A rendered manifest is a stream of YAML documents, one per application:
//!
//! ```yaml
//! apiVersion: rigger/v1
//! kind: DeployerApplication
//! metadata:
//!   name: log
//! spec:
//!   resource: registry://apps/log
//!   version: 1.0.0
//!   applicationProperties:
//!     level: DEBUG
//!   deploymentProperties:
//!     memory: 512m
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

use crate::errors::RiggerError;

/// Deployment property holding the backend managed instance count
pub const REPLICA_COUNT_PROPERTY: &str = "deployer.count";

/// The `spec` section of a manifest entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationSpec {
    pub resource: String,
    pub version: String,
    pub application_properties: BTreeMap<String, String>,
    pub deployment_properties: BTreeMap<String, String>,
}

/// One application of a rendered manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: BTreeMap<String, String>,
    pub spec: ApplicationSpec,
}

impl ApplicationManifest {
    /// Application name, taken from `metadata.name`
    pub fn name(&self) -> &str {
        self.metadata.get("name").map(String::as_str).unwrap_or_default()
    }

    fn from_value(value: &Value) -> Result<Self, RiggerError> {
        let mapping = value.as_mapping().ok_or_else(|| {
            RiggerError::Validation("Manifest document is not a mapping".to_string())
        })?;
        let spec = mapping.get("spec").cloned().unwrap_or(Value::Null);

        let manifest = Self {
            api_version: scalar(mapping.get("apiVersion")),
            kind: scalar(mapping.get("kind")),
            metadata: flatten(mapping.get("metadata")),
            spec: ApplicationSpec {
                resource: scalar(spec.get("resource")),
                version: scalar(spec.get("version")),
                application_properties: flatten(spec.get("applicationProperties")),
                deployment_properties: flatten(spec.get("deploymentProperties")),
            },
        };

        if manifest.kind.is_empty() {
            return Err(RiggerError::Validation(format!(
                "Manifest entry [{}] has no kind",
                manifest.name()
            )));
        }
        if manifest.name().trim().is_empty() {
            return Err(RiggerError::Validation(format!(
                "Manifest entry of kind [{}] has no metadata.name",
                manifest.kind
            )));
        }
        Ok(manifest)
    }
}

/// Read every application of a rendered manifest, in document order.
pub fn read_manifest(text: &str) -> Result<Vec<ApplicationManifest>, RiggerError> {
    let mut applications = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        applications.push(ApplicationManifest::from_value(&value)?);
    }
    Ok(applications)
}

/// Kind shared by the applications of a manifest, from its first entry
pub fn manifest_kind(text: &str) -> Result<String, RiggerError> {
    read_manifest(text)?
        .into_iter()
        .next()
        .map(|app| app.kind)
        .ok_or_else(|| RiggerError::Validation("Manifest has no applications".to_string()))
}

fn scalar(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Tagged(tagged)) => scalar(Some(&tagged.value)),
        Some(other) => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Nested mappings become dotted keys.
fn flatten(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(Value::Mapping(mapping)) = value {
        flatten_into("", mapping, &mut out);
    }
    out
}

fn flatten_into(prefix: &str, mapping: &serde_yaml::Mapping, out: &mut BTreeMap<String, String>) {
    for (key, value) in mapping {
        let key = scalar(Some(key));
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Mapping(nested) => flatten_into(&key, nested, out),
            other => {
                out.insert(key, scalar(Some(other)));
            }
        }
    }
}
