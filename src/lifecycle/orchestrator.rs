use serde::Serialize;

use crate::aggregator::{
    Aggregator, AggregatorLimits, EventTarget, ScrollMetrics, VisibilityState,
};
use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::delivery::{DeliveryChannel, PayloadKind, Transport};
use crate::fingerprint::FingerprintSnapshot;
use crate::session::SessionId;

use super::state::{LifecycleState, Phase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Owns everything one page view produces and decides when each payload goes
/// out. Drivers feed it events and timer ticks; it never schedules anything
/// itself.
pub struct Orchestrator<T: Transport, C: Clock> {
    session_id: SessionId,
    delivery: DeliveryChannel<T>,
    aggregator: Aggregator,
    clock: C,
    state: LifecycleState,
}

impl<T: Transport, C: Clock> Orchestrator<T, C> {
    pub fn new(config: &AgentConfig, transport: T, clock: C) -> Self {
        let loaded_at = clock.now_ms();
        let session_id = SessionId::generate();
        log_info!("page session {session_id} started, reporting to {}", config.endpoint);

        Self {
            session_id,
            delivery: DeliveryChannel::new(config.endpoint.clone(), transport),
            aggregator: Aggregator::new(loaded_at, AggregatorLimits::from(config)),
            clock,
            state: LifecycleState::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Stores the page-ready fingerprint. Nothing is sent yet: the first init
    /// payload waits for the network-leak probe or the fallback timer.
    pub fn begin_init(&mut self, snapshot: FingerprintSnapshot) -> bool {
        if self.state.phase != Phase::Loading {
            log_warn!("init requested in phase {:?}, ignoring", self.state.phase);
            return false;
        }
        self.state.begin(snapshot);
        true
    }

    /// Network-leak probe finished (with or without an address). Always sends
    /// an init payload, even when the fallback already sent one.
    pub fn resolve_network_leak(&mut self, address: Option<String>) -> bool {
        if self.state.is_exited() {
            return false;
        }
        if !self.state.resolve_leak(address) {
            log_warn!("network-leak result arrived before the fingerprint, dropping it");
            return false;
        }
        self.send_init()
    }

    /// Fallback timer fired. Sends the snapshot without the network-leak
    /// field only while the probe is still pending.
    pub fn init_fallback(&mut self) -> bool {
        if self.state.is_exited() || !self.state.leak_pending() {
            return false;
        }
        log_debug!("network-leak probe still pending, sending init without it");
        self.send_init()
    }

    fn send_init(&mut self) -> bool {
        let Some(snapshot) = self.state.snapshot.as_ref() else {
            return false;
        };
        let ts = self.clock.now_ms();
        dispatch(&self.delivery, &self.session_id, PayloadKind::Init, ts, snapshot);
        self.state.init_sends += 1;
        true
    }

    pub fn pointer_move(&mut self, x: i32, y: i32) {
        if self.state.is_exited() {
            return;
        }
        let now = self.clock.now_ms();
        self.aggregator.record_pointer(x, y, now);
    }

    pub fn click(&mut self, x: i32, y: i32, target: &EventTarget) {
        if self.state.is_exited() {
            return;
        }
        let now = self.clock.now_ms();
        self.aggregator.record_click(x, y, target, now);
    }

    pub fn scroll(&mut self, metrics: ScrollMetrics) {
        if self.state.is_exited() {
            return;
        }
        self.aggregator.record_scroll(metrics);
    }

    /// Records the transition; becoming hidden also ends the session, with the
    /// hidden transition included in the exit payload.
    pub fn visibility_change(&mut self, state: VisibilityState) {
        if self.state.is_exited() {
            return;
        }
        let now = self.clock.now_ms();
        self.aggregator.record_visibility(state, now);
        if state == VisibilityState::Hidden {
            self.exit();
        }
    }

    pub fn focus_in(&mut self, target: &EventTarget) {
        if self.state.is_exited() {
            return;
        }
        let now = self.clock.now_ms();
        self.aggregator.record_focus_in(target, now);
    }

    pub fn focus_out(&mut self, target: &EventTarget) {
        if self.state.is_exited() {
            return;
        }
        let now = self.clock.now_ms();
        self.aggregator.record_focus_out(target, now);
    }

    pub fn paste(&mut self, target: &EventTarget) {
        if self.state.is_exited() {
            return;
        }
        let now = self.clock.now_ms();
        self.aggregator.record_paste(target, now);
    }

    pub fn unload(&mut self) {
        self.exit();
    }

    /// Periodic tick. Returns whether an interaction payload went out.
    pub fn flush(&mut self) -> bool {
        if self.state.is_exited() {
            return false;
        }
        let Some(batch) = self.aggregator.drain() else {
            return false;
        };
        let ts = self.clock.now_ms();
        dispatch(&self.delivery, &self.session_id, PayloadKind::Interaction, ts, &batch);
        self.state.interaction_sends += 1;
        true
    }

    /// Sends the exit payload. Only the first call does anything.
    pub fn exit(&mut self) -> bool {
        if self.state.is_exited() {
            return false;
        }
        let now = self.clock.now_ms();
        let summary = self.aggregator.exit_summary(now);
        dispatch(&self.delivery, &self.session_id, PayloadKind::Exit, now, &summary);
        self.state.finish();
        log_info!(
            "page session {} exited after {}ms ({} init, {} interaction payloads)",
            self.session_id,
            summary.duration,
            self.state.init_sends,
            self.state.interaction_sends
        );
        true
    }
}

/// Transmission outcomes are logged and dropped; nothing here may disturb the
/// host page.
fn dispatch<T: Transport, D: Serialize>(
    delivery: &DeliveryChannel<T>,
    pid: &SessionId,
    kind: PayloadKind,
    ts: i64,
    data: &D,
) {
    match delivery.send(pid, kind, ts, data) {
        Ok(route) => log_debug!("{} payload sent via {route:?}", kind.as_str()),
        Err(err) => log_debug!("{} payload dropped: {err}", kind.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::testing::RecordingTransport;
    use crate::fingerprint::NetworkLeak;
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;

    fn orchestrator() -> (Orchestrator<RecordingTransport, ManualClock>, RecordingTransport, ManualClock) {
        let transport = RecordingTransport::with_beacon();
        let clock = ManualClock::starting_at(T0);
        let orch = Orchestrator::new(&AgentConfig::default(), transport.clone(), clock.clone());
        (orch, transport, clock)
    }

    fn snapshot() -> FingerprintSnapshot {
        FingerprintSnapshot {
            canvas: Some("-lfinll".into()),
            webgl: None,
            audio: Some("3g.i".into()),
            screen: Some([1920, 1080]),
            depth: Some(24),
            dpr: Some(1.0),
            mem: None,
            cores: Some(8),
            tz: Some("Europe/Berlin".into()),
            locale: Some("de-DE".into()),
            langs: Some(vec!["de-DE".into(), "en".into()]),
            dnt: Some(false),
            touch: Some(false),
            conn: None,
            plat: Some("Linux x86_64".into()),
            vendor: None,
            perf: None,
            webrtc_ip: NetworkLeak::Pending,
        }
    }

    fn input(name: &str) -> EventTarget {
        EventTarget::new("INPUT").with_name(name)
    }

    #[test]
    fn probe_resolving_first_sends_single_init() {
        let (mut orch, transport, clock) = orchestrator();
        assert!(orch.begin_init(snapshot()));
        assert!(transport.bodies().is_empty());

        clock.advance(1_200);
        assert!(orch.resolve_network_leak(Some("192.168.1.23".into())));
        clock.advance(2_300);
        assert!(!orch.init_fallback());

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["t"], "init");
        assert_eq!(bodies[0]["data"]["webrtc_ip"], "192.168.1.23");
        assert_eq!(bodies[0]["ts"], T0 + 1_200);
        assert_eq!(bodies[0]["pid"], orch.session_id().as_str());
    }

    #[test]
    fn probe_resolving_to_nothing_still_suppresses_fallback() {
        let (mut orch, transport, _clock) = orchestrator();
        orch.begin_init(snapshot());
        orch.resolve_network_leak(None);
        assert!(!orch.init_fallback());

        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["data"]["webrtc_ip"], serde_json::Value::Null);
    }

    #[test]
    fn slow_probe_produces_two_inits() {
        let (mut orch, transport, clock) = orchestrator();
        orch.begin_init(snapshot());

        clock.advance(3_500);
        assert!(orch.init_fallback());
        clock.advance(400);
        assert!(orch.resolve_network_leak(Some("10.0.0.7".into())));

        let bodies = transport.bodies();
        assert_eq!(transport.kinds(), vec!["init", "init"]);
        assert!(bodies[0]["data"].get("webrtc_ip").is_none());
        assert_eq!(bodies[1]["data"]["webrtc_ip"], "10.0.0.7");
        assert_eq!(orch.state().init_sends, 2);
    }

    #[test]
    fn init_is_only_accepted_once() {
        let (mut orch, _transport, _clock) = orchestrator();
        assert!(orch.begin_init(snapshot()));
        assert!(!orch.begin_init(snapshot()));
        assert_eq!(orch.phase(), Phase::Running);
    }

    #[test]
    fn leak_result_without_fingerprint_is_dropped() {
        let (mut orch, transport, _clock) = orchestrator();
        assert!(!orch.resolve_network_leak(Some("10.0.0.7".into())));
        assert!(!orch.init_fallback());
        assert!(transport.bodies().is_empty());
    }

    #[test]
    fn empty_flush_sends_nothing() {
        let (mut orch, transport, clock) = orchestrator();
        orch.begin_init(snapshot());
        orch.resolve_network_leak(None);

        clock.advance(15_000);
        assert!(!orch.flush());
        assert_eq!(transport.kinds(), vec!["init"]);
    }

    #[test]
    fn paste_alone_does_not_trigger_flush() {
        let (mut orch, transport, _clock) = orchestrator();
        orch.paste(&EventTarget::new("TEXTAREA"));
        assert!(!orch.flush());
        assert!(transport.bodies().is_empty());
    }

    #[test]
    fn flush_clears_interval_buffers_and_keeps_cumulative_state() {
        let (mut orch, transport, clock) = orchestrator();
        clock.advance(100);
        orch.pointer_move(10, 20);
        orch.click(10, 20, &EventTarget::new("BUTTON").with_id("buy"));
        orch.focus_in(&input("email"));
        clock.advance(900);
        orch.focus_out(&input("email"));
        orch.paste(&input("email"));
        orch.scroll(ScrollMetrics {
            scroll_y: 500.0,
            scroll_height: 2_000.0,
            inner_height: 1_000.0,
        });

        clock.advance(14_000);
        assert!(orch.flush());
        let first = &transport.bodies()[0];
        assert_eq!(first["t"], "interaction");
        assert_eq!(first["data"]["mouse"], json!([[10, 20, 100]]));
        assert_eq!(first["data"]["clicks"][0]["id"], "buy");
        assert_eq!(first["data"]["scroll"], 50);
        assert_eq!(first["data"]["fields"]["email"], json!({"enter": 100, "order": 0, "dwell": 900}));
        assert_eq!(first["data"]["pastes"], json!([{"field": "email", "t": 1_000}]));

        // Fields and scroll persist, so the next tick still reports.
        clock.advance(15_000);
        assert!(orch.flush());
        let second = &transport.bodies()[1];
        assert_eq!(second["data"]["mouse"], json!([]));
        assert_eq!(second["data"]["clicks"], json!([]));
        assert_eq!(second["data"]["pastes"], json!([]));
        assert_eq!(second["data"]["scroll"], 50);
        assert_eq!(second["data"]["fields"]["email"]["dwell"], 900);
    }

    #[test]
    fn hidden_visibility_exits_once_with_the_transition_recorded() {
        let (mut orch, transport, clock) = orchestrator();
        orch.begin_init(snapshot());
        orch.resolve_network_leak(None);
        clock.advance(4_000);
        orch.visibility_change(VisibilityState::Visible);
        clock.advance(1_000);
        orch.visibility_change(VisibilityState::Hidden);

        assert_eq!(orch.phase(), Phase::Exited);
        orch.unload();
        assert!(!orch.exit());
        assert_eq!(transport.kinds(), vec!["init", "exit"]);

        let exit = &transport.bodies()[1];
        assert_eq!(exit["data"]["duration"], 5_000);
        assert_eq!(
            exit["data"]["visibility"],
            json!([{"state": "visible", "t": 4_000}, {"state": "hidden", "t": 5_000}])
        );
    }

    #[test]
    fn exit_carries_state_that_was_never_flushed() {
        let (mut orch, transport, clock) = orchestrator();
        clock.advance(250);
        orch.pointer_move(1, 2);
        orch.paste(&EventTarget::new("INPUT").with_id("card"));
        clock.advance(750);
        orch.unload();

        let exit = &transport.bodies()[0];
        assert_eq!(exit["t"], "exit");
        assert_eq!(exit["data"]["duration"], 1_000);
        assert_eq!(exit["data"]["mouse"], json!([[1, 2, 250]]));
        assert_eq!(exit["data"]["pastes"], json!([{"field": "card", "t": 250}]));
    }

    #[test]
    fn nothing_is_processed_after_exit() {
        let (mut orch, transport, clock) = orchestrator();
        orch.begin_init(snapshot());
        orch.exit();

        clock.advance(1_000);
        orch.pointer_move(5, 5);
        orch.click(5, 5, &EventTarget::new("A"));
        assert!(!orch.flush());
        assert!(!orch.resolve_network_leak(Some("10.0.0.1".into())));
        assert!(!orch.init_fallback());
        assert_eq!(transport.kinds(), vec!["exit"]);
        assert!(orch.aggregator().snapshot().mouse.is_empty());
    }

    #[test]
    fn delivery_failures_are_swallowed() {
        let transport = RecordingTransport {
            fail_post: true,
            ..RecordingTransport::default()
        };
        let clock = ManualClock::starting_at(T0);
        let mut orch = Orchestrator::new(&AgentConfig::default(), transport.clone(), clock);
        orch.pointer_move(1, 1);

        assert!(orch.flush());
        assert!(orch.exit());
        assert!(transport.bodies().is_empty());
        assert_eq!(orch.phase(), Phase::Exited);
    }
}
