//! Browser host. Compiled only for `wasm32`; wires the page's events, timers
//! and transport into one shared [`Orchestrator`].
//!
//! ```javascript
//! import init, { start } from "./pkg/pagepulse_lib.js";
//! await init();
//! start({ endpoint: "/cdn/pixel.gif", verbose: false });
//! ```

mod console;
pub mod environment;
pub mod ice;
mod listeners;
pub mod timers;
pub mod transport;

use std::cell::RefCell;
use std::rc::Rc;

use log::LevelFilter;
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, Window};

use crate::clock::SystemClock;
use crate::config::AgentConfig;
use crate::fingerprint;
use crate::lifecycle::Orchestrator;
use crate::netleak;

use environment::WebEnvironment;
use ice::WebGatherer;
use transport::WebTransport;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub(crate) type SharedAgent = Rc<RefCell<Orchestrator<WebTransport, SystemClock>>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StartOptions {
    #[serde(flatten)]
    config: AgentConfig,
    verbose: bool,
}

pub(crate) fn js_error(err: JsValue) -> anyhow::Error {
    match err.dyn_ref::<js_sys::Error>() {
        Some(error) => anyhow::anyhow!("{}", String::from(error.message())),
        None => anyhow::anyhow!("{err:?}"),
    }
}

/// Runs `f` against the orchestrator unless a handler further up the stack
/// already holds it.
pub(crate) fn with_agent<R>(
    agent: &SharedAgent,
    f: impl FnOnce(&mut Orchestrator<WebTransport, SystemClock>) -> R,
) -> Option<R> {
    match agent.try_borrow_mut() {
        Ok(mut orchestrator) => Some(f(&mut orchestrator)),
        Err(_) => {
            log_warn!("orchestrator busy, dropping re-entrant callback");
            None
        }
    }
}

fn decode_options(options: JsValue) -> StartOptions {
    if options.is_undefined() || options.is_null() {
        return StartOptions::default();
    }
    let decoded = match serde_wasm_bindgen::from_value::<StartOptions>(options) {
        Ok(decoded) => decoded,
        Err(err) => {
            log_warn!("unreadable start options, using defaults: {err}");
            return StartOptions::default();
        }
    };
    if let Err(err) = decoded.config.validate() {
        log_warn!("invalid start options, using defaults: {err:#}");
        return StartOptions {
            verbose: decoded.verbose,
            ..StartOptions::default()
        };
    }
    decoded
}

/// Starts the agent on the current page and returns the session id.
#[wasm_bindgen]
pub fn start(options: JsValue) -> Result<JsValue, JsValue> {
    console::init(LevelFilter::Warn);
    let StartOptions { config, verbose } = decode_options(options);
    if verbose {
        console::init(LevelFilter::Debug);
    }

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no global window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("window has no document"))?;

    let orchestrator = Orchestrator::new(
        &config,
        WebTransport::new(window.clone()),
        SystemClock,
    );
    let session_id = orchestrator.session_id().to_string();
    let agent: SharedAgent = Rc::new(RefCell::new(orchestrator));

    listeners::attach(&agent, &window, &document)?;

    let handle = agent.clone();
    timers::set_interval(&window, config.flush_interval(), move || {
        with_agent(&handle, |agent| agent.flush());
    })?;

    if document.ready_state() == "loading" {
        let (handle, win) = (agent.clone(), window.clone());
        let on_ready = Closure::once_into_js(move || {
            if let Err(err) = begin_init(&handle, &win, &config) {
                log_warn!("init scheduling failed: {err:?}");
            }
        });
        let options = AddEventListenerOptions::new();
        options.set_once(true);
        document.add_event_listener_with_callback_and_add_event_listener_options(
            "DOMContentLoaded",
            on_ready.unchecked_ref(),
            &options,
        )?;
    } else {
        begin_init(&agent, &window, &config)?;
    }

    log_info!("pagepulse session {session_id} attached");
    Ok(JsValue::from_str(&session_id))
}

/// Takes the fingerprint, then arms the network-leak probe and the init
/// fallback timer.
fn begin_init(agent: &SharedAgent, window: &Window, config: &AgentConfig) -> Result<(), JsValue> {
    let snapshot = fingerprint::collect(&WebEnvironment::new(window.clone()));
    if with_agent(agent, |agent| agent.begin_init(snapshot)) != Some(true) {
        return Ok(());
    }

    let handle = agent.clone();
    let ceiling = timers::sleep(window.clone(), config.leak_ceiling());
    wasm_bindgen_futures::spawn_local(async move {
        let address = netleak::discover(WebGatherer::new(), ceiling).await;
        with_agent(&handle, |agent| agent.resolve_network_leak(address));
    });

    let handle = agent.clone();
    timers::set_timeout(window, config.init_fallback(), move || {
        with_agent(&handle, |agent| agent.init_fallback());
    })
}
