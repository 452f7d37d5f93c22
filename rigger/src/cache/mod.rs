//! In-memory caches

pub mod status;

pub use status::{StatesCache, StatesKey};
