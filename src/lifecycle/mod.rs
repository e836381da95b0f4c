//! When each payload is produced. The orchestrator is host-agnostic; the
//! `runtime` (native) and `web` (browser) drivers own the timers and feed it.

pub mod orchestrator;
pub mod state;

pub use orchestrator::Orchestrator;
pub use state::{LifecycleState, Phase};
