//! Platform name to backend lookup

use std::collections::HashMap;
use std::sync::Arc;

use crate::deployer::backend::DeploymentBackend;
use crate::errors::RiggerError;

/// Backends registered at startup, keyed by platform name
#[derive(Clone, Default)]
pub struct DeployerRegistry {
    backends: HashMap<String, Arc<dyn DeploymentBackend>>,
}

impl DeployerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under a platform name
    pub fn register(mut self, platform: impl Into<String>, backend: Arc<dyn DeploymentBackend>) -> Self {
        self.backends.insert(platform.into(), backend);
        self
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.backends.contains_key(platform)
    }

    /// Get the backend of a platform
    pub fn get(&self, platform: &str) -> Result<Arc<dyn DeploymentBackend>, RiggerError> {
        self.backends
            .get(platform)
            .cloned()
            .ok_or_else(|| RiggerError::NotFound(format!("No platform named [{}]", platform)))
    }

    /// Registered platform names, sorted
    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for DeployerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployerRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
