use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[x, y, t]` where `t` is milliseconds since page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSample(pub i32, pub i32, pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickSample {
    pub x: i32,
    pub y: i32,
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub t: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityState {
    Visible,
    Hidden,
    Prerender,
}

impl VisibilityState {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "visible" => Some(Self::Visible),
            "hidden" => Some(Self::Hidden),
            "prerender" => Some(Self::Prerender),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityChange {
    pub state: VisibilityState,
    pub t: i64,
}

/// Per-field focus record. `dwell` appears once the field has lost focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDwell {
    pub enter: i64,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteEvent {
    pub field: Option<String>,
    pub t: i64,
}

/// The element an event was dispatched to, reduced to what the payloads keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTarget {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
}

impl EventTarget {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = non_empty(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = non_empty(name.into());
        self
    }

    /// Name wins over id; elements carrying neither have no key.
    pub fn field_key(&self) -> Option<&str> {
        self.name.as_deref().or(self.id.as_deref())
    }
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Raw scroll geometry as read from the window at event time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_y: f64,
    pub scroll_height: f64,
    pub inner_height: f64,
}

impl ScrollMetrics {
    /// Percentage of the scrollable range covered, or `None` when the page
    /// does not scroll at all.
    pub fn depth_percent(&self) -> Option<i64> {
        let range = self.scroll_height - self.inner_height;
        if range.is_nan() || range <= 0.0 {
            return None;
        }
        let percent = js_round(self.scroll_y / range * 100.0);
        if percent.is_finite() {
            Some(percent as i64)
        } else {
            None
        }
    }
}

/// `Math.round`: halves go towards positive infinity.
fn js_round(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Point-in-time copy of the interaction state, as carried by the
/// `interaction` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionBatch {
    pub mouse: Vec<PointerSample>,
    pub clicks: Vec<ClickSample>,
    pub scroll: i64,
    pub visibility: Vec<VisibilityChange>,
    pub fields: BTreeMap<String, FieldDwell>,
    pub pastes: Vec<PasteEvent>,
}

/// Terminal snapshot carried by the `exit` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSummary {
    pub duration: i64,
    #[serde(flatten)]
    pub interaction: InteractionBatch,
}
