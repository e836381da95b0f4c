//! Native driver: one tokio task owns the orchestrator and is fed page events
//! over a channel. Used by headless harnesses and the test-suite.

pub mod controller;
pub mod loop_worker;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::aggregator::{EventTarget, ScrollMetrics, VisibilityState};
use crate::clock::Clock;
use crate::fingerprint::{self, Environment, FingerprintSnapshot};
use crate::netleak::{self, IceGatherer};

pub use controller::AgentController;

/// Network-leak probe handed to the driver together with the fingerprint.
pub type LeakProbe = Pin<Box<dyn Future<Output = Option<String>> + Send>>;

pub enum PageEvent {
    /// Page-ready: the synchronous fingerprint plus the running leak probe.
    Ready {
        snapshot: FingerprintSnapshot,
        leak_probe: LeakProbe,
    },
    PointerMove {
        x: i32,
        y: i32,
    },
    Click {
        x: i32,
        y: i32,
        target: EventTarget,
    },
    Scroll(ScrollMetrics),
    Visibility(VisibilityState),
    FocusIn(EventTarget),
    FocusOut(EventTarget),
    Paste(EventTarget),
    Unload,
}

impl PageEvent {
    /// Runs every probe against `env` and arms the leak probe with a tokio
    /// ceiling.
    pub fn ready<E, G>(env: &E, gatherer: G, ceiling: Duration) -> Self
    where
        E: Environment + ?Sized,
        G: IceGatherer + Send + 'static,
        G::Candidates: Send,
    {
        Self::Ready {
            snapshot: fingerprint::collect(env),
            leak_probe: leak_probe(gatherer, ceiling),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageEvent::Ready { .. } => "ready",
            PageEvent::PointerMove { .. } => "pointer_move",
            PageEvent::Click { .. } => "click",
            PageEvent::Scroll(_) => "scroll",
            PageEvent::Visibility(_) => "visibility",
            PageEvent::FocusIn(_) => "focus_in",
            PageEvent::FocusOut(_) => "focus_out",
            PageEvent::Paste(_) => "paste",
            PageEvent::Unload => "unload",
        }
    }
}

pub fn leak_probe<G>(gatherer: G, ceiling: Duration) -> LeakProbe
where
    G: IceGatherer + Send + 'static,
    G::Candidates: Send,
{
    Box::pin(netleak::discover(gatherer, tokio::time::sleep(ceiling)))
}

/// Epoch clock anchored on tokio's instant, so paused test time moves it.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    origin_ms: i64,
    anchor: Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    pub fn starting_at(origin_ms: i64) -> Self {
        Self {
            origin_ms,
            anchor: Instant::now(),
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }
}
