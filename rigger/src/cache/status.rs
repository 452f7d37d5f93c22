//! Deployment states cache

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::models::status::DeploymentState;

/// Cache key: the sorted deployment ids and the platform they live on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatesKey {
    pub deployment_ids: Vec<String>,
    pub platform: String,
}

impl StatesKey {
    pub fn new(deployment_ids: &[String], platform: &str) -> Self {
        let mut deployment_ids = deployment_ids.to_vec();
        deployment_ids.sort();
        deployment_ids.dedup();
        Self {
            deployment_ids,
            platform: platform.to_string(),
        }
    }
}

/// Cache entry
#[derive(Debug, Clone)]
pub struct StatesCacheEntry {
    pub states: BTreeMap<String, DeploymentState>,
    pub cached_at: Instant,
}

/// Batch deployment states, expiring a fixed time after being written
pub struct StatesCache {
    entries: RwLock<HashMap<StatesKey, StatesCacheEntry>>,
    ttl: Duration,
}

impl StatesCache {
    /// Create a new states cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get unexpired states
    pub fn get(&self, key: &StatesKey) -> Option<BTreeMap<String, DeploymentState>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|e| e.cached_at.elapsed() < self.ttl)
            .map(|e| e.states.clone())
    }

    /// Insert states, dropping expired entries
    pub fn insert(&self, key: StatesKey, states: BTreeMap<String, DeploymentState>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, e| e.cached_at.elapsed() < ttl);
        entries.insert(
            key,
            StatesCacheEntry {
                states,
                cached_at: Instant::now(),
            },
        );
    }

    /// Return cached states or load and cache them. The lock is not held
    /// while loading.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: StatesKey,
        load: F,
    ) -> Result<BTreeMap<String, DeploymentState>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BTreeMap<String, DeploymentState>, E>>,
    {
        if let Some(states) = self.get(&key) {
            return Ok(states);
        }
        debug!("Loading deployment states for {:?}", key.deployment_ids);
        let states = load().await?;
        self.insert(key, states.clone());
        Ok(states)
    }

    /// Get cache size, expired entries included
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
