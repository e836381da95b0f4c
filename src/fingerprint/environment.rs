use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: i32,
    pub height: i32,
    pub color_depth: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSupport {
    /// `ontouchstart` exists on the window.
    pub touch_events: bool,
    pub max_touch_points: i32,
}

impl TouchSupport {
    pub fn is_touch_capable(&self) -> bool {
        self.touch_events || self.max_touch_points > 0
    }
}

/// Network Information API reading. Empty strings and a zero downlink are
/// reported as absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "eff")]
    pub effective_type: Option<String>,
    #[serde(rename = "dl")]
    pub downlink: Option<f64>,
}

impl ConnectionInfo {
    pub fn normalized(self) -> Self {
        Self {
            kind: self.kind.filter(|v| !v.is_empty()),
            effective_type: self.effective_type.filter(|v| !v.is_empty()),
            downlink: self.downlink.filter(|v| *v != 0.0 && !v.is_nan()),
        }
    }
}

/// Raw navigation timing marks in milliseconds. `navigation_start` only
/// exists on the legacy timing object; Navigation Timing Level 2 entries
/// measure from `start_time` (0 for the document's own navigation).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NavigationTiming {
    pub start_time: f64,
    pub navigation_start: Option<f64>,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerfDeltas {
    pub dns: Option<i64>,
    pub tcp: Option<i64>,
    pub ttfb: Option<i64>,
    pub load: Option<i64>,
    pub dom: Option<i64>,
}

impl NavigationTiming {
    pub fn deltas(&self) -> PerfDeltas {
        let origin = self.navigation_start.unwrap_or(self.start_time);
        PerfDeltas {
            dns: rounded_delta(self.domain_lookup_end, self.domain_lookup_start),
            tcp: rounded_delta(self.connect_end, self.connect_start),
            ttfb: rounded_delta(self.response_start, self.request_start),
            load: rounded_delta(self.load_event_end, origin),
            dom: rounded_delta(self.dom_content_loaded_event_end, origin),
        }
    }
}

fn rounded_delta(end: f64, start: f64) -> Option<i64> {
    let delta = ((end - start) + 0.5).floor();
    if delta.is_finite() {
        Some(delta as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_are_rounded_differences() {
        let timing = NavigationTiming {
            start_time: 0.0,
            navigation_start: None,
            domain_lookup_start: 10.2,
            domain_lookup_end: 32.9,
            connect_start: 33.0,
            connect_end: 80.5,
            request_start: 81.0,
            response_start: 190.5,
            dom_content_loaded_event_end: 640.49,
            load_event_end: 1_020.5,
        };
        assert_eq!(
            timing.deltas(),
            PerfDeltas {
                dns: Some(23),
                tcp: Some(48),
                ttfb: Some(110),
                load: Some(1_021),
                dom: Some(640),
            }
        );
    }

    #[test]
    fn legacy_navigation_start_is_the_origin() {
        let timing = NavigationTiming {
            navigation_start: Some(1_000.0),
            load_event_end: 3_500.0,
            dom_content_loaded_event_end: 2_000.0,
            ..NavigationTiming::default()
        };
        let deltas = timing.deltas();
        assert_eq!(deltas.load, Some(2_500));
        assert_eq!(deltas.dom, Some(1_000));
    }

    #[test]
    fn missing_marks_read_as_absent() {
        let timing = NavigationTiming {
            load_event_end: f64::NAN,
            ..NavigationTiming::default()
        };
        assert_eq!(timing.deltas().load, None);
        assert_eq!(timing.deltas().dns, Some(0));
    }

    #[test]
    fn connection_blanks_become_null() {
        let conn = ConnectionInfo {
            kind: Some(String::new()),
            effective_type: Some("4g".into()),
            downlink: Some(0.0),
        }
        .normalized();
        assert_eq!(
            serde_json::to_value(&conn).unwrap(),
            serde_json::json!({"type": null, "eff": "4g", "dl": null})
        );
    }

    #[test]
    fn touch_from_either_signal() {
        assert!(TouchSupport { touch_events: true, max_touch_points: 0 }.is_touch_capable());
        assert!(TouchSupport { touch_events: false, max_touch_points: 5 }.is_touch_capable());
        assert!(!TouchSupport { touch_events: false, max_touch_points: 0 }.is_touch_capable());
    }
}
