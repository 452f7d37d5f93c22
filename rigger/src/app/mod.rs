//! Application wiring

pub mod options;
pub mod state;

pub use options::AppOptions;
pub use state::{AppState, Collaborators};
