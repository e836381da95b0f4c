use serde::Serialize;
use thiserror::Error;

use crate::session::SessionId;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::log_debug;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Init,
    Interaction,
    Exit,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Init => "init",
            PayloadKind::Interaction => "interaction",
            PayloadKind::Exit => "exit",
        }
    }
}

/// Wire wrapper shared by every payload type.
#[derive(Debug, Serialize)]
pub struct Envelope<'a, D: Serialize> {
    pub pid: &'a SessionId,
    pub t: PayloadKind,
    pub ts: i64,
    pub url: &'a str,
    pub data: &'a D,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize {kind} payload: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("beacon call threw: {0}")]
    Beacon(String),
    #[error("keepalive request failed: {0}")]
    Request(String),
}

/// Which path a payload left through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Handed to the beacon primitive; `queued` is the host's answer.
    Beacon { queued: bool },
    KeepalivePost,
}

/// Host side of transmission. Both send primitives must return without
/// waiting on the network so delivery works while the page is being torn down.
pub trait Transport {
    /// Address of the page being instrumented.
    fn page_url(&self) -> String;

    fn has_beacon(&self) -> bool;

    fn send_beacon(&self, endpoint: &str, body: &str) -> Result<bool, DeliveryError>;

    /// Fire a `POST` with `keepalive` set. Completion is never observed.
    fn post_keepalive(&self, endpoint: &str, body: &str) -> Result<(), DeliveryError>;
}

pub struct DeliveryChannel<T: Transport> {
    endpoint: String,
    transport: T,
}

impl<T: Transport> DeliveryChannel<T> {
    pub fn new(endpoint: impl Into<String>, transport: T) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
        }
    }

    /// Serializes one payload and hands it to the host. The beacon, when
    /// present, is the only attempt; a refused beacon is not retried.
    pub fn send<D: Serialize>(
        &self,
        pid: &SessionId,
        kind: PayloadKind,
        ts: i64,
        data: &D,
    ) -> Result<Route, DeliveryError> {
        let url = self.transport.page_url();
        let envelope = Envelope {
            pid,
            t: kind,
            ts,
            url: &url,
            data,
        };
        let body = serde_json::to_string(&envelope).map_err(|source| DeliveryError::Serialize {
            kind: kind.as_str(),
            source,
        })?;

        if self.transport.has_beacon() {
            let queued = self.transport.send_beacon(&self.endpoint, &body)?;
            log_debug!("{} payload beaconed ({} bytes, queued={queued})", kind.as_str(), body.len());
            return Ok(Route::Beacon { queued });
        }

        self.transport.post_keepalive(&self.endpoint, &body)?;
        log_debug!("{} payload posted ({} bytes)", kind.as_str(), body.len());
        Ok(Route::KeepalivePost)
    }
}
