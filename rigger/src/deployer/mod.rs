//! Deployment backend and resource contracts

pub mod backend;
pub mod registry;
pub mod resource;

pub use backend::{AppDeploymentRequest, DeploymentBackend};
pub use registry::DeployerRegistry;
pub use resource::ResourceResolver;
