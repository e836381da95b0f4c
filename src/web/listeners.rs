use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, Document, Element, Event, MouseEvent, Window};

use crate::aggregator::{EventTarget, ScrollMetrics, VisibilityState};

use super::{with_agent, SharedAgent};

fn listen<E, F>(target: &web_sys::EventTarget, kind: &str, passive: bool, mut handler: F) -> Result<(), JsValue>
where
    E: JsCast + 'static,
    F: FnMut(E) + 'static,
{
    let closure = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        if let Ok(event) = event.dyn_into::<E>() {
            handler(event);
        }
    });
    let options = AddEventListenerOptions::new();
    options.set_passive(passive);
    target.add_event_listener_with_callback_and_add_event_listener_options(
        kind,
        closure.as_ref().unchecked_ref(),
        &options,
    )?;
    closure.forget();
    Ok(())
}

/// Tag, id and name of the element an event fired on.
fn describe_target(event: &Event) -> EventTarget {
    let Some(element) = event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok())
    else {
        return EventTarget::default();
    };
    let name = Reflect::get(&element, &JsValue::from_str("name"))
        .ok()
        .and_then(|name| name.as_string())
        .unwrap_or_default();
    EventTarget::new(element.tag_name())
        .with_id(element.id())
        .with_name(name)
}

fn scroll_metrics(window: &Window, document: &Document) -> Option<ScrollMetrics> {
    let scroll_height = document.document_element()?.scroll_height();
    Some(ScrollMetrics {
        scroll_y: window.scroll_y().ok()?,
        scroll_height: f64::from(scroll_height),
        inner_height: window.inner_height().ok()?.as_f64()?,
    })
}

fn visibility(document: &Document) -> Option<VisibilityState> {
    Reflect::get(document, &JsValue::from_str("visibilityState"))
        .ok()?
        .as_string()
        .and_then(|state| VisibilityState::parse(&state))
}

/// Attaches every behavioral listener and the termination hooks.
pub fn attach(agent: &SharedAgent, window: &Window, document: &Document) -> Result<(), JsValue> {
    let handle = agent.clone();
    listen(document, "mousemove", true, move |event: MouseEvent| {
        with_agent(&handle, |agent| agent.pointer_move(event.client_x(), event.client_y()));
    })?;

    let handle = agent.clone();
    listen(document, "click", true, move |event: MouseEvent| {
        let target = describe_target(&event);
        with_agent(&handle, |agent| agent.click(event.client_x(), event.client_y(), &target));
    })?;

    let handle = agent.clone();
    let (win, doc) = (window.clone(), document.clone());
    listen(window, "scroll", true, move |_: Event| {
        if let Some(metrics) = scroll_metrics(&win, &doc) {
            with_agent(&handle, |agent| agent.scroll(metrics));
        }
    })?;

    // Hidden is recorded and then ends the session.
    let handle = agent.clone();
    let doc = document.clone();
    listen(document, "visibilitychange", false, move |_: Event| {
        if let Some(state) = visibility(&doc) {
            with_agent(&handle, |agent| agent.visibility_change(state));
        }
    })?;

    let handle = agent.clone();
    listen(document, "focusin", true, move |event: Event| {
        let target = describe_target(&event);
        with_agent(&handle, |agent| agent.focus_in(&target));
    })?;

    let handle = agent.clone();
    listen(document, "focusout", true, move |event: Event| {
        let target = describe_target(&event);
        with_agent(&handle, |agent| agent.focus_out(&target));
    })?;

    let handle = agent.clone();
    listen(document, "paste", true, move |event: Event| {
        let target = describe_target(&event);
        with_agent(&handle, |agent| agent.paste(&target));
    })?;

    let handle = agent.clone();
    listen(window, "beforeunload", false, move |_: Event| {
        with_agent(&handle, |agent| agent.unload());
    })?;

    Ok(())
}
