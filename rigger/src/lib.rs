//! Rigger Library
//!
//! Release lifecycle orchestration for composite application stacks:
//! install, red/black upgrade, rollback, scale and delete of versioned
//! releases on pluggable deployment platforms.

pub mod analyzer;
pub mod app;
pub mod cache;
pub mod deployer;
pub mod diff;
pub mod errors;
pub mod logs;
pub mod manager;
pub mod models;
pub mod orchestrator;
pub mod render;
pub mod settings;
pub mod store;
pub mod strategy;
