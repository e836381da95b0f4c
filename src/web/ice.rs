use anyhow::Result;
use futures::channel::mpsc;
use js_sys::Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    RtcConfiguration, RtcPeerConnection, RtcPeerConnectionIceEvent, RtcSessionDescriptionInit,
};

use crate::netleak::IceGatherer;

use super::js_error;

type CandidateHandler = Closure<dyn FnMut(RtcPeerConnectionIceEvent)>;

/// Peer connection with no ICE servers; only host candidates come back.
#[derive(Default)]
pub struct WebGatherer {
    connection: Option<RtcPeerConnection>,
    on_candidate: Option<CandidateHandler>,
}

impl WebGatherer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IceGatherer for WebGatherer {
    type Candidates = mpsc::UnboundedReceiver<String>;

    fn open(&mut self) -> Result<Self::Candidates> {
        let config = RtcConfiguration::new();
        config.set_ice_servers(&Array::new());
        let connection = RtcPeerConnection::new_with_configuration(&config).map_err(js_error)?;
        connection.create_data_channel("");

        let (tx, rx) = mpsc::unbounded();

        let candidates = tx.clone();
        let on_candidate: CandidateHandler = Closure::new(move |event: RtcPeerConnectionIceEvent| {
            match event.candidate() {
                Some(candidate) => {
                    let line = candidate.candidate();
                    if !line.is_empty() {
                        let _ = candidates.unbounded_send(line);
                    }
                }
                // A null candidate marks the end of gathering.
                None => candidates.close_channel(),
            }
        });
        connection.set_onicecandidate(Some(on_candidate.as_ref().unchecked_ref()));

        let negotiating = connection.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let negotiated = async {
                let offer = JsFuture::from(negotiating.create_offer()).await?;
                let offer: RtcSessionDescriptionInit = offer.unchecked_into();
                JsFuture::from(negotiating.set_local_description(&offer)).await
            };
            if let Err(err) = negotiated.await {
                log::debug!("ice offer failed: {err:?}");
                tx.close_channel();
            }
        });

        self.connection = Some(connection);
        self.on_candidate = Some(on_candidate);
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.set_onicecandidate(None);
            connection.close();
        }
        self.on_candidate = None;
    }
}
