use anyhow::{anyhow, Context, Result};
use js_sys::{Array, Intl, Object, Reflect};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    AudioContext, CanvasRenderingContext2d, Document, HtmlCanvasElement, Navigator,
    OscillatorType, WebGlRenderingContext, Window,
};

use crate::fingerprint::{
    AudioChain, CanvasScene, ConnectionInfo, DrawOp, Environment, NavigationTiming, ScreenInfo,
    TouchSupport,
};

use super::js_error;

const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

/// Probe surface backed by the live page.
pub struct WebEnvironment {
    window: Window,
}

impl WebEnvironment {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    fn document(&self) -> Result<Document> {
        self.window
            .document()
            .ok_or_else(|| anyhow!("window has no document"))
    }

    fn navigator(&self) -> Navigator {
        self.window.navigator()
    }

    fn create_canvas(&self) -> Result<HtmlCanvasElement> {
        self.document()?
            .create_element("canvas")
            .map_err(js_error)?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| anyhow!("created element is not a canvas"))
    }
}

fn prop(target: &JsValue, key: &str) -> Result<JsValue> {
    Reflect::get(target, &JsValue::from_str(key))
        .map_err(js_error)
        .with_context(|| format!("reading {key}"))
}

fn prop_string(target: &JsValue, key: &str) -> Result<Option<String>> {
    Ok(prop(target, key)?.as_string())
}

fn prop_f64(target: &JsValue, key: &str) -> Result<Option<f64>> {
    Ok(prop(target, key)?.as_f64())
}

/// Missing timing marks read as NaN so their deltas come out null.
fn timing_mark(entry: &JsValue, key: &str) -> Result<f64> {
    Ok(prop_f64(entry, key)?.unwrap_or(f64::NAN))
}

impl Environment for WebEnvironment {
    fn render_canvas(&self, scene: &CanvasScene) -> Result<Option<String>> {
        let canvas = self.create_canvas()?;
        let Some(context) = canvas.get_context("2d").map_err(js_error)? else {
            return Ok(None);
        };
        let context = context
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("2d context has unexpected type"))?;

        canvas.set_width(scene.width);
        canvas.set_height(scene.height);
        context.set_text_baseline(scene.text_baseline);
        context.set_font(scene.font);

        for op in scene.ops {
            match *op {
                DrawOp::FillRect {
                    style,
                    x,
                    y,
                    width,
                    height,
                } => {
                    context.set_fill_style_str(style);
                    context.fill_rect(x, y, width, height);
                }
                DrawOp::FillText { style, text, x, y } => {
                    context.set_fill_style_str(style);
                    context.fill_text(text, x, y).map_err(js_error)?;
                }
            }
        }

        canvas.to_data_url().map(Some).map_err(js_error)
    }

    fn webgl_renderer(&self) -> Result<Option<String>> {
        let canvas = self.create_canvas()?;
        let context = match canvas.get_context("webgl").map_err(js_error)? {
            Some(context) => Some(context),
            None => canvas
                .get_context("experimental-webgl")
                .map_err(js_error)?,
        };
        let Some(context) = context else {
            return Ok(None);
        };
        let gl = context
            .dyn_into::<WebGlRenderingContext>()
            .map_err(|_| anyhow!("webgl context has unexpected type"))?;

        let Some(debug_info) = gl
            .get_extension("WEBGL_debug_renderer_info")
            .map_err(js_error)?
        else {
            return Ok(None);
        };
        let pname = prop_f64(&debug_info, "UNMASKED_RENDERER_WEBGL")?
            .map(|value| value as u32)
            .unwrap_or(UNMASKED_RENDERER_WEBGL);

        Ok(gl.get_parameter(pname).map_err(js_error)?.as_string())
    }

    fn audio_frequency_data(&self, chain: &AudioChain) -> Result<Option<Vec<f32>>> {
        let context = AudioContext::new().map_err(js_error)?;
        let sample = sample_chain(&context, chain);
        if let Err(err) = context.close() {
            log::debug!("audio context close failed: {err:?}");
        }
        sample.map(Some)
    }

    fn screen(&self) -> Result<Option<ScreenInfo>> {
        let screen = self.window.screen().map_err(js_error)?;
        Ok(Some(ScreenInfo {
            width: screen.width().map_err(js_error)?,
            height: screen.height().map_err(js_error)?,
            color_depth: screen.color_depth().map_err(js_error)?,
        }))
    }

    fn device_pixel_ratio(&self) -> Result<Option<f64>> {
        Ok(Some(self.window.device_pixel_ratio()))
    }

    fn device_memory(&self) -> Result<Option<f64>> {
        prop_f64(&self.navigator(), "deviceMemory")
    }

    fn hardware_concurrency(&self) -> Result<Option<u32>> {
        let cores = self.navigator().hardware_concurrency();
        Ok((cores.is_finite() && cores > 0.0).then(|| cores as u32))
    }

    fn timezone(&self) -> Result<Option<String>> {
        let format = Intl::DateTimeFormat::new(&Array::new(), &Object::new());
        prop_string(&format.resolved_options(), "timeZone")
    }

    fn language(&self) -> Result<Option<String>> {
        Ok(self.navigator().language())
    }

    fn languages(&self) -> Result<Option<Vec<String>>> {
        let languages = prop(&self.navigator(), "languages")?;
        if languages.is_undefined() || languages.is_null() {
            return Ok(None);
        }
        Ok(Some(
            Array::from(&languages)
                .iter()
                .filter_map(|lang| lang.as_string())
                .collect(),
        ))
    }

    fn do_not_track(&self) -> Result<Option<String>> {
        prop_string(&self.navigator(), "doNotTrack")
    }

    fn touch_support(&self) -> Result<Option<TouchSupport>> {
        let touch_events = Reflect::has(&self.window, &JsValue::from_str("ontouchstart"))
            .map_err(js_error)?;
        Ok(Some(TouchSupport {
            touch_events,
            max_touch_points: self.navigator().max_touch_points(),
        }))
    }

    fn connection(&self) -> Result<Option<ConnectionInfo>> {
        let navigator = self.navigator();
        for key in ["connection", "mozConnection", "webkitConnection"] {
            let connection = prop(&navigator, key)?;
            if connection.is_undefined() || connection.is_null() {
                continue;
            }
            return Ok(Some(ConnectionInfo {
                kind: prop_string(&connection, "type")?,
                effective_type: prop_string(&connection, "effectiveType")?,
                downlink: prop_f64(&connection, "downlink")?,
            }));
        }
        Ok(None)
    }

    fn platform(&self) -> Result<Option<String>> {
        prop_string(&self.navigator(), "platform")
    }

    fn vendor(&self) -> Result<Option<String>> {
        prop_string(&self.navigator(), "vendor")
    }

    fn navigation_timing(&self) -> Result<Option<NavigationTiming>> {
        let Some(performance) = self.window.performance() else {
            return Ok(None);
        };
        let entry = performance.get_entries_by_type("navigation").get(0);
        if entry.is_undefined() {
            return Ok(None);
        }

        Ok(Some(NavigationTiming {
            start_time: prop_f64(&entry, "startTime")?.unwrap_or(0.0),
            navigation_start: prop_f64(&entry, "navigationStart")?,
            domain_lookup_start: timing_mark(&entry, "domainLookupStart")?,
            domain_lookup_end: timing_mark(&entry, "domainLookupEnd")?,
            connect_start: timing_mark(&entry, "connectStart")?,
            connect_end: timing_mark(&entry, "connectEnd")?,
            request_start: timing_mark(&entry, "requestStart")?,
            response_start: timing_mark(&entry, "responseStart")?,
            dom_content_loaded_event_end: timing_mark(&entry, "domContentLoadedEventEnd")?,
            load_event_end: timing_mark(&entry, "loadEventEnd")?,
        }))
    }
}

/// Builds the chain on `context`, reads one frequency sample and stops the
/// oscillator again. The caller closes the context.
fn sample_chain(context: &AudioContext, chain: &AudioChain) -> Result<Vec<f32>> {
    let now = context.current_time();

    let oscillator = context.create_oscillator().map_err(js_error)?;
    oscillator.set_type(
        OscillatorType::from_js_value(&JsValue::from_str(chain.oscillator_type))
            .unwrap_or(OscillatorType::Triangle),
    );
    oscillator
        .frequency()
        .set_value_at_time(chain.frequency_hz, now)
        .map_err(js_error)?;

    let compressor = context.create_dynamics_compressor().map_err(js_error)?;
    compressor.threshold().set_value_at_time(chain.threshold_db, now).map_err(js_error)?;
    compressor.knee().set_value_at_time(chain.knee_db, now).map_err(js_error)?;
    compressor.ratio().set_value_at_time(chain.ratio, now).map_err(js_error)?;
    compressor.attack().set_value_at_time(chain.attack_s, now).map_err(js_error)?;
    compressor.release().set_value_at_time(chain.release_s, now).map_err(js_error)?;

    oscillator.connect_with_audio_node(&compressor).map_err(js_error)?;
    compressor
        .connect_with_audio_node(&context.destination())
        .map_err(js_error)?;
    oscillator.start_with_when(0.0).map_err(js_error)?;

    let sample = (|| -> Result<Vec<f32>> {
        let analyser = context.create_analyser().map_err(js_error)?;
        compressor.connect_with_audio_node(&analyser).map_err(js_error)?;
        let mut data = vec![0f32; analyser.frequency_bin_count() as usize];
        analyser.get_float_frequency_data(&mut data);
        Ok(data)
    })();

    if let Err(err) = oscillator.stop() {
        log::debug!("oscillator stop failed: {err:?}");
    }
    sample
}
