//! Manifest difference engine
//!
//! Pure comparison of rendered manifests, application by application.

pub mod application;
pub mod properties;
pub mod release;

pub use application::{diff, ApplicationManifestDifference};
pub use properties::{PropertiesDiff, PropertyChange};
pub use release::ReleaseDifference;
