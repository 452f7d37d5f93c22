//! Manifest rendering contract and configuration value handling

pub mod values;

use serde_yaml::Value;

use crate::models::package::Package;

/// Produces the rendered manifest text of a package for a merged value model
pub trait ManifestRenderer: Send + Sync {
    fn render(&self, pkg: &Package, values: &Value) -> anyhow::Result<String>;
}
