//! Network-leak probe: learns a routable IPv4 address from the ICE candidates
//! a peer connection gathers, without any STUN or relay server configured.

use anyhow::Result;
use futures::future::{self, Either};
use futures::{pin_mut, Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

static IPV4_IN_CANDIDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.\d+\.\d+\.\d+)").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Source of ICE candidate strings.
///
/// `open` builds the connection, forces candidate gathering (a data channel
/// plus a local offer) and hands back the candidate stream, which ends once
/// gathering completes. `close` tears the connection down; [`discover`] calls
/// it exactly once whichever way negotiation ends.
pub trait IceGatherer {
    type Candidates: Stream<Item = String> + Unpin;

    fn open(&mut self) -> Result<Self::Candidates>;

    fn close(&mut self);
}

/// First dotted-quad in a candidate line, if any.
pub fn extract_ipv4(candidate: &str) -> Option<&str> {
    IPV4_IN_CANDIDATE
        .captures(candidate)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Races candidate gathering against `ceiling`. Resolves to the first address
/// found, or `None` when the ceiling fires, gathering completes without a
/// match, or the connection cannot be opened.
pub async fn discover<G, D>(mut gatherer: G, ceiling: D) -> Option<String>
where
    G: IceGatherer,
    D: Future<Output = ()>,
{
    let mut candidates = match gatherer.open() {
        Ok(candidates) => candidates,
        Err(err) => {
            log_debug!("peer connection unavailable: {err:#}");
            gatherer.close();
            return None;
        }
    };

    let search = async {
        while let Some(candidate) = candidates.next().await {
            if let Some(ip) = extract_ipv4(&candidate) {
                return Some(ip.to_string());
            }
        }
        None
    };
    pin_mut!(search);
    pin_mut!(ceiling);

    let found = match future::select(search, ceiling).await {
        Either::Left((found, _)) => found,
        Either::Right(((), _)) => {
            log_debug!("ice negotiation hit its ceiling without an address");
            None
        }
    };

    gatherer.close();
    if let Some(ip) = &found {
        log_info!("network-leak probe resolved {ip}");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::channel::mpsc;
    use futures::executor::block_on;
    use futures::stream::{self, BoxStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        candidates: Option<BoxStream<'static, String>>,
        closes: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(candidates: BoxStream<'static, String>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    candidates: Some(candidates),
                    closes: Arc::clone(&closes),
                },
                closes,
            )
        }
    }

    impl IceGatherer for Scripted {
        type Candidates = BoxStream<'static, String>;

        fn open(&mut self) -> Result<Self::Candidates> {
            self.candidates
                .take()
                .ok_or_else(|| anyhow!("RTCPeerConnection is not defined"))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn lines(items: &[&str]) -> BoxStream<'static, String> {
        stream::iter(items.iter().map(|s| s.to_string()).collect::<Vec<_>>()).boxed()
    }

    #[test]
    fn extracts_first_dotted_quad() {
        let host = "candidate:842163049 1 udp 1677729535 192.168.1.23 54400 typ srflx raddr 0.0.0.0 rport 0";
        assert_eq!(extract_ipv4(host), Some("192.168.1.23"));
        let mdns = "candidate:1 1 udp 2113937151 4c1f8b9e-6a5e-4d0b.local 53794 typ host";
        assert_eq!(extract_ipv4(mdns), None);
    }

    #[test]
    fn first_match_wins_and_closes_once() {
        let (gatherer, closes) = Scripted::new(lines(&[
            "candidate:1 1 udp 2113937151 abcd.local 53794 typ host",
            "candidate:2 1 udp 1677729535 10.0.0.7 50000 typ srflx",
            "candidate:3 1 udp 1677729535 10.0.0.8 50001 typ srflx",
        ]));
        let found = block_on(discover(gatherer, future::pending::<()>()));
        assert_eq!(found.as_deref(), Some("10.0.0.7"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_gathering_resolves_to_none() {
        let (gatherer, closes) = Scripted::new(lines(&["candidate:1 1 udp 1 x.local 1 typ host"]));
        let found = block_on(discover(gatherer, future::pending::<()>()));
        assert_eq!(found, None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ceiling_cuts_a_silent_negotiation() {
        let (_tx, rx) = mpsc::unbounded::<String>();
        let (gatherer, closes) = Scripted::new(rx.boxed());
        let found = block_on(discover(gatherer, future::ready(())));
        assert_eq!(found, None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unavailable_peer_connection_resolves_immediately() {
        let (mut gatherer, closes) = Scripted::new(lines(&[]));
        gatherer.candidates = None;
        let found = block_on(discover(gatherer, future::pending::<()>()));
        assert_eq!(found, None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
