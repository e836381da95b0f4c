//! In-page fingerprint and interaction telemetry agent.
//!
//! The core modules are host-agnostic. `runtime` drives them natively on
//! tokio; `web` drives them inside a browser page when built for `wasm32`.

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod fingerprint;
pub mod lifecycle;
pub mod netleak;
pub mod session;
mod utils;

#[cfg(not(target_arch = "wasm32"))]
pub mod runtime;
#[cfg(not(target_arch = "wasm32"))]
pub mod telemetry;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use aggregator::{Aggregator, EventTarget, InteractionBatch, ScrollMetrics, VisibilityState};
pub use clock::{Clock, SystemClock};
pub use config::AgentConfig;
pub use delivery::{DeliveryChannel, DeliveryError, PayloadKind, Route, Transport};
pub use fingerprint::{Environment, FingerprintSnapshot, NetworkLeak};
pub use lifecycle::{Orchestrator, Phase};
pub use netleak::IceGatherer;
pub use session::SessionId;

#[cfg(not(target_arch = "wasm32"))]
pub use runtime::{AgentController, PageEvent};
