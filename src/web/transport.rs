use js_sys::Reflect;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::{RequestInit, Window};

use crate::delivery::{DeliveryError, Transport};

/// `navigator.sendBeacon`, falling back to a keepalive `fetch`.
pub struct WebTransport {
    window: Window,
}

impl WebTransport {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl Transport for WebTransport {
    fn page_url(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn has_beacon(&self) -> bool {
        Reflect::get(&self.window.navigator(), &JsValue::from_str("sendBeacon"))
            .map(|beacon| beacon.is_function())
            .unwrap_or(false)
    }

    fn send_beacon(&self, endpoint: &str, body: &str) -> Result<bool, DeliveryError> {
        self.window
            .navigator()
            .send_beacon_with_opt_str(endpoint, Some(body))
            .map_err(|err| DeliveryError::Beacon(format!("{err:?}")))
    }

    fn post_keepalive(&self, endpoint: &str, body: &str) -> Result<(), DeliveryError> {
        let init = RequestInit::new();
        init.set_method("POST");
        init.set_body(&JsValue::from_str(body));
        init.set_keepalive(true);

        let pending = self.window.fetch_with_str_and_init(endpoint, &init);
        // Outcome is not observed; only swallow the rejection.
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = JsFuture::from(pending).await {
                log::debug!("keepalive post rejected: {err:?}");
            }
        });
        Ok(())
    }
}
