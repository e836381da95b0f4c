use serde::Serialize;

use crate::fingerprint::{FingerprintSnapshot, NetworkLeak};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Listening, but the page has not signalled ready yet.
    #[default]
    Loading,
    /// Fingerprint taken; flushes and init dispatch are live.
    Running,
    /// Exit payload sent. Terminal.
    Exited,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleState {
    pub phase: Phase,
    pub snapshot: Option<FingerprintSnapshot>,
    pub init_sends: u32,
    pub interaction_sends: u32,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_exited(&self) -> bool {
        self.phase == Phase::Exited
    }

    /// True while a snapshot exists and its network-leak field has not
    /// resolved. This is the condition the init fallback checks.
    pub fn leak_pending(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.webrtc_ip.is_pending())
    }

    pub fn begin(&mut self, snapshot: FingerprintSnapshot) {
        self.snapshot = Some(snapshot);
        self.phase = Phase::Running;
    }

    pub fn resolve_leak(&mut self, address: Option<String>) -> bool {
        match self.snapshot.as_mut() {
            Some(snapshot) => {
                snapshot.webrtc_ip = NetworkLeak::Resolved(address);
                true
            }
            None => false,
        }
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Exited;
    }
}
