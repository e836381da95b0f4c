use std::time::Duration;

use js_sys::{Function, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::Window;

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

/// Resolves after `duration` on the page's timer queue.
pub async fn sleep(window: Window, duration: Duration) {
    let timeout = millis(duration);
    let promise = Promise::new(&mut |resolve: Function, _reject: Function| {
        if window
            .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
            .is_err()
        {
            let _ = resolve.call0(&JsValue::UNDEFINED);
        }
    });
    let _ = JsFuture::from(promise).await;
}

/// Schedules `callback` once after `duration`. The closure is leaked to the
/// page; it runs at most once.
pub fn set_timeout(window: &Window, duration: Duration, callback: impl FnOnce() + 'static) -> Result<(), JsValue> {
    let callback = Closure::once_into_js(callback);
    window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        millis(duration),
    )?;
    Ok(())
}

/// Runs `callback` every `period` for the lifetime of the page.
pub fn set_interval(window: &Window, period: Duration, callback: impl FnMut() + 'static) -> Result<(), JsValue> {
    let callback = Closure::<dyn FnMut()>::new(callback);
    window.set_interval_with_callback_and_timeout_and_arguments_0(
        callback.as_ref().unchecked_ref(),
        millis(period),
    )?;
    callback.forget();
    Ok(())
}
