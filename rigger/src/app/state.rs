//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::analyzer::ReleaseAnalyzer;
use crate::app::options::AppOptions;
use crate::deployer::registry::DeployerRegistry;
use crate::deployer::resource::ResourceResolver;
use crate::errors::RiggerError;
use crate::manager::ReleaseManager;
use crate::orchestrator::actions::Actions;
use crate::orchestrator::service::ReleaseService;
use crate::render::ManifestRenderer;
use crate::store::{PackageStore, ReleaseStore};
use crate::strategy::{RedBlackStrategy, StrategyRegistry, DEPLOYER_APPLICATION_KIND};

/// Implementations of the external contracts, provided by the embedder
pub struct Collaborators {
    pub release_store: Arc<dyn ReleaseStore>,
    pub package_store: Arc<dyn PackageStore>,
    pub registry: DeployerRegistry,
    pub renderer: Arc<dyn ManifestRenderer>,
    pub resolver: Arc<dyn ResourceResolver>,
}

/// Main application state
pub struct AppState {
    /// Release manager
    pub manager: Arc<ReleaseManager>,

    /// Upgrade strategies by manifest kind
    pub strategies: StrategyRegistry,

    /// Release lifecycle operations
    pub releases: Arc<ReleaseService>,
}

impl AppState {
    /// Initialize application state
    pub fn init(options: &AppOptions, collaborators: Collaborators) -> Result<Self, RiggerError> {
        info!("Initializing release orchestrator...");

        let Collaborators {
            release_store,
            package_store,
            registry,
            renderer,
            resolver,
        } = collaborators;

        if registry.platforms().is_empty() {
            return Err(RiggerError::ConfigError(
                "At least one deployment platform must be registered".to_string(),
            ));
        }
        info!("Platforms: {:?}", registry.platforms());

        // Create manager
        let manager = Arc::new(ReleaseManager::new(
            release_store.clone(),
            registry,
            ReleaseAnalyzer::new(resolver),
            renderer,
            options.status_cache_ttl,
        ));

        // Register strategies
        let strategies = StrategyRegistry::new().register(
            DEPLOYER_APPLICATION_KIND,
            Arc::new(RedBlackStrategy::new(manager.clone())),
        );

        let actions = Arc::new(Actions::new(
            release_store.clone(),
            package_store.clone(),
            manager.clone(),
            strategies.clone(),
            options.fsm_settings.clone(),
        ));
        let releases = Arc::new(ReleaseService::new(
            actions,
            release_store,
            package_store,
            manager.clone(),
        ));

        Ok(Self {
            manager,
            strategies,
            releases,
        })
    }
}
