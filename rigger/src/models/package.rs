//! Package models

use serde::{Deserialize, Serialize};

/// Raw YAML configuration values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValues {
    /// YAML document text
    #[serde(default)]
    pub raw: String,
}

impl ConfigValues {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

/// Package identity and description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single manifest template of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub data: String,
}

/// A package: templates plus default values, optionally composed of dependent packages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub metadata: PackageMetadata,

    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub config_values: ConfigValues,

    #[serde(default)]
    pub dependencies: Vec<Package>,
}

impl Package {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

/// Reference to a stored package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentifier {
    /// Package name
    pub name: String,

    /// Package version, highest stored version when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PackageIdentifier {
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
        }
    }
}
