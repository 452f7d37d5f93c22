//! Release lifecycle orchestration
//!
//! Every release name gets its own state machine, driven by a task that
//! serializes the operations on that release.

pub mod actions;
pub mod actor;
pub mod context;
pub mod fsm;
pub mod service;

pub use actions::Actions;
pub use actor::ReleaseHandle;
pub use context::{ExtendedState, OperationRequest};
pub use fsm::{FsmSettings, ReleaseEvent, ReleaseFsm, ReleaseState};
pub use service::ReleaseService;
