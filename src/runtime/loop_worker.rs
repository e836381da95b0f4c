use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::delivery::Transport;
use crate::lifecycle::{Orchestrator, Phase};

use super::{LeakProbe, PageEvent, RuntimeClock};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_info};

/// Drives one page view until it exits or the token is cancelled.
pub async fn agent_loop<T: Transport>(
    mut orchestrator: Orchestrator<T, RuntimeClock>,
    flush_interval: Duration,
    init_fallback: Duration,
    mut events: mpsc::Receiver<PageEvent>,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut leak: Option<LeakProbe> = None;
    let fallback = time::sleep(Duration::ZERO);
    tokio::pin!(fallback);
    let mut fallback_armed = false;

    loop {
        // Events first, so a tick or cancel never overtakes input queued
        // before it.
        tokio::select! {
            biased;

            event = events.recv() => match event {
                Some(PageEvent::Ready { snapshot, leak_probe }) => {
                    if orchestrator.begin_init(snapshot) {
                        leak = Some(leak_probe);
                        fallback.as_mut().reset(Instant::now() + init_fallback);
                        fallback_armed = true;
                    }
                }
                Some(event) => {
                    log_debug!("page event {}", event.name());
                    apply(&mut orchestrator, event);
                }
                None => {
                    log_info!("page event channel closed, treating as unload");
                    orchestrator.unload();
                }
            },
            _ = ticker.tick() => {
                orchestrator.flush();
            }
            address = resolve(&mut leak), if leak.is_some() => {
                leak = None;
                orchestrator.resolve_network_leak(address);
            }
            () = &mut fallback, if fallback_armed => {
                fallback_armed = false;
                orchestrator.init_fallback();
            }
            _ = cancel_token.cancelled() => {
                log_info!("agent loop shutting down");
                while let Ok(event) = events.try_recv() {
                    apply(&mut orchestrator, event);
                }
                orchestrator.unload();
                break;
            }
        }

        if orchestrator.phase() == Phase::Exited {
            break;
        }
    }
}

async fn resolve(leak: &mut Option<LeakProbe>) -> Option<String> {
    match leak {
        Some(probe) => probe.await,
        None => std::future::pending().await,
    }
}

fn apply<T: Transport>(orchestrator: &mut Orchestrator<T, RuntimeClock>, event: PageEvent) {
    match event {
        PageEvent::Ready { snapshot, .. } => {
            orchestrator.begin_init(snapshot);
        }
        PageEvent::PointerMove { x, y } => orchestrator.pointer_move(x, y),
        PageEvent::Click { x, y, target } => orchestrator.click(x, y, &target),
        PageEvent::Scroll(metrics) => orchestrator.scroll(metrics),
        PageEvent::Visibility(state) => orchestrator.visibility_change(state),
        PageEvent::FocusIn(target) => orchestrator.focus_in(&target),
        PageEvent::FocusOut(target) => orchestrator.focus_out(&target),
        PageEvent::Paste(target) => orchestrator.paste(&target),
        PageEvent::Unload => orchestrator.unload(),
    }
}
