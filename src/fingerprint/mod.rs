//! Device and browser fingerprint probes.
//!
//! Every probe reads one signal through [`Environment`] and is isolated from
//! the others: an error or an unsupported API yields `None` for that field
//! and nothing else.

pub mod audio;
pub mod canvas;
pub mod environment;
pub mod radix;

use anyhow::Result;
use serde::{Serialize, Serializer};

pub use audio::{audio_digest, AudioChain, FINGERPRINT_CHAIN};
pub use canvas::{canvas_hash, CanvasScene, DrawOp, FINGERPRINT_SCENE};
pub use environment::{ConnectionInfo, NavigationTiming, PerfDeltas, ScreenInfo, TouchSupport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Host surface the probes read from. Every method answers `Ok(None)` when the
/// host simply lacks the API and `Err` when reading it failed; the default
/// bodies describe a host without any of them.
pub trait Environment {
    /// Rasterizes `scene` and returns the serialized bitmap (a data URL in
    /// browsers).
    fn render_canvas(&self, _scene: &CanvasScene) -> Result<Option<String>> {
        Ok(None)
    }

    /// Unmasked GPU renderer string from the debug-info extension.
    fn webgl_renderer(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Runs `chain` once and returns the analyser's frequency-domain sample.
    /// Implementations must tear the chain down before returning, on success
    /// and on failure.
    fn audio_frequency_data(&self, _chain: &AudioChain) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }

    fn screen(&self) -> Result<Option<ScreenInfo>> {
        Ok(None)
    }

    fn device_pixel_ratio(&self) -> Result<Option<f64>> {
        Ok(None)
    }

    fn device_memory(&self) -> Result<Option<f64>> {
        Ok(None)
    }

    fn hardware_concurrency(&self) -> Result<Option<u32>> {
        Ok(None)
    }

    fn timezone(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn language(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn languages(&self) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    /// Raw do-not-track value (`"1"`, `"0"`, `"unspecified"`...).
    fn do_not_track(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn touch_support(&self) -> Result<Option<TouchSupport>> {
        Ok(None)
    }

    fn connection(&self) -> Result<Option<ConnectionInfo>> {
        Ok(None)
    }

    fn platform(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn vendor(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn navigation_timing(&self) -> Result<Option<NavigationTiming>> {
        Ok(None)
    }
}

/// Outcome of the asynchronous network-leak probe as seen by the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkLeak {
    /// Negotiation still running; the wire record omits the field.
    #[default]
    Pending,
    /// Negotiation finished; `None` serializes as `null`.
    Resolved(Option<String>),
}

impl NetworkLeak {
    pub fn is_pending(&self) -> bool {
        matches!(self, NetworkLeak::Pending)
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            NetworkLeak::Resolved(Some(ip)) => Some(ip),
            _ => None,
        }
    }
}

impl Serialize for NetworkLeak {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NetworkLeak::Resolved(Some(ip)) => serializer.serialize_str(ip),
            NetworkLeak::Resolved(None) | NetworkLeak::Pending => serializer.serialize_none(),
        }
    }
}

/// Body of the `init` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintSnapshot {
    pub canvas: Option<String>,
    pub webgl: Option<String>,
    pub audio: Option<String>,
    pub screen: Option<[i32; 2]>,
    pub depth: Option<i32>,
    pub dpr: Option<f64>,
    pub mem: Option<f64>,
    pub cores: Option<u32>,
    pub tz: Option<String>,
    pub locale: Option<String>,
    pub langs: Option<Vec<String>>,
    pub dnt: Option<bool>,
    pub touch: Option<bool>,
    pub conn: Option<ConnectionInfo>,
    pub plat: Option<String>,
    pub vendor: Option<String>,
    pub perf: Option<PerfDeltas>,
    #[serde(skip_serializing_if = "NetworkLeak::is_pending")]
    pub webrtc_ip: NetworkLeak,
}

/// Runs a single probe, folding failures into `None`.
fn isolate<T>(probe: &str, read: impl FnOnce() -> Result<Option<T>>) -> Option<T> {
    match read() {
        Ok(value) => value,
        Err(err) => {
            log_debug!("probe {probe} failed: {err:#}");
            None
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Runs every synchronous probe once. The network-leak field starts out
/// pending; [`crate::netleak`] resolves it separately.
pub fn collect<E: Environment + ?Sized>(env: &E) -> FingerprintSnapshot {
    let screen = isolate("screen", || env.screen());

    let snapshot = FingerprintSnapshot {
        canvas: isolate("canvas", || env.render_canvas(&FINGERPRINT_SCENE))
            .map(|bitmap| canvas_hash(&bitmap)),
        webgl: isolate("webgl", || env.webgl_renderer()),
        audio: isolate("audio", || env.audio_frequency_data(&FINGERPRINT_CHAIN))
            .map(|sample| audio_digest(&sample)),
        screen: screen.map(|s| [s.width, s.height]),
        depth: screen.map(|s| s.color_depth),
        dpr: isolate("dpr", || {
            env.device_pixel_ratio()
                .map(|ratio| Some(ratio.filter(|r| *r != 0.0 && !r.is_nan()).unwrap_or(1.0)))
        }),
        mem: isolate("mem", || env.device_memory()).filter(|m| *m != 0.0 && !m.is_nan()),
        cores: isolate("cores", || env.hardware_concurrency()).filter(|c| *c != 0),
        tz: isolate("tz", || env.timezone()),
        locale: isolate("locale", || env.language()),
        langs: isolate("langs", || env.languages()),
        dnt: isolate("dnt", || {
            env.do_not_track()
                .map(|raw| Some(raw.as_deref() == Some("1")))
        }),
        touch: isolate("touch", || env.touch_support()).map(|t| t.is_touch_capable()),
        conn: isolate("conn", || env.connection()).map(ConnectionInfo::normalized),
        plat: isolate("plat", || env.platform()).and_then(non_blank),
        vendor: isolate("vendor", || env.vendor()).and_then(non_blank),
        perf: isolate("perf", || env.navigation_timing()).map(|timing| timing.deltas()),
        webrtc_ip: NetworkLeak::Pending,
    };

    log_debug!(
        "fingerprint collected: canvas={:?} webgl={:?} audio={:?}",
        snapshot.canvas,
        snapshot.webgl,
        snapshot.audio
    );
    snapshot
}
