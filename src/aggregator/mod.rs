//! Behavioral state accumulated between flushes.
//!
//! The aggregator is a plain value: it never reads a clock or talks to the
//! page. Callers stamp every event with the current epoch time and the
//! aggregator turns that into load-relative offsets.

pub mod ring;
pub mod types;

use std::collections::BTreeMap;

use crate::config::AgentConfig;

pub use ring::RingBuffer;
pub use types::{
    ClickSample, EventTarget, ExitSummary, FieldDwell, InteractionBatch, PasteEvent,
    PointerSample, ScrollMetrics, VisibilityChange, VisibilityState,
};

// Fires on every pointer move; keep quiet unless chasing a bug.
const ENABLE_LOGS: bool = false;

use crate::log_debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorLimits {
    pub pointer_capacity: usize,
    pub click_capacity: usize,
    pub pointer_throttle_ms: i64,
}

impl Default for AggregatorLimits {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for AggregatorLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            pointer_capacity: config.pointer_capacity,
            click_capacity: config.click_capacity,
            pointer_throttle_ms: i64::try_from(config.pointer_throttle_ms).unwrap_or(i64::MAX),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    origin_ms: i64,
    limits: AggregatorLimits,
    mouse: RingBuffer<PointerSample>,
    clicks: RingBuffer<ClickSample>,
    last_pointer_ms: Option<i64>,
    scroll: i64,
    visibility: Vec<VisibilityChange>,
    fields: BTreeMap<String, FieldDwell>,
    next_focus_order: u32,
    pastes: Vec<PasteEvent>,
}

impl Aggregator {
    /// `origin_ms` is the page-load instant every offset is measured from.
    pub fn new(origin_ms: i64, limits: AggregatorLimits) -> Self {
        Self {
            origin_ms,
            limits,
            mouse: RingBuffer::with_capacity(limits.pointer_capacity),
            clicks: RingBuffer::with_capacity(limits.click_capacity),
            last_pointer_ms: None,
            scroll: 0,
            visibility: Vec::new(),
            fields: BTreeMap::new(),
            next_focus_order: 0,
            pastes: Vec::new(),
        }
    }

    fn offset(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.origin_ms)
    }

    /// Records a pointer position unless one was taken within the throttle
    /// window. Returns whether the sample was kept.
    pub fn record_pointer(&mut self, x: i32, y: i32, now_ms: i64) -> bool {
        if let Some(last) = self.last_pointer_ms {
            if now_ms.saturating_sub(last) < self.limits.pointer_throttle_ms {
                return false;
            }
        }
        self.last_pointer_ms = Some(now_ms);
        let sample = PointerSample(x, y, self.offset(now_ms));
        if let Some(evicted) = self.mouse.push(sample) {
            log_debug!("pointer ring full, evicted sample at t={}", evicted.2);
        }
        true
    }

    pub fn record_click(&mut self, x: i32, y: i32, target: &EventTarget, now_ms: i64) {
        let sample = ClickSample {
            x,
            y,
            tag: target.tag.clone(),
            id: target.id.clone(),
            name: target.name.clone(),
            t: self.offset(now_ms),
        };
        if let Some(evicted) = self.clicks.push(sample) {
            log_debug!("click ring full, evicted {} at t={}", evicted.tag, evicted.t);
        }
    }

    /// Folds a scroll position into the running maximum depth.
    pub fn record_scroll(&mut self, metrics: ScrollMetrics) {
        if let Some(depth) = metrics.depth_percent() {
            if depth > self.scroll {
                self.scroll = depth;
            }
        }
    }

    pub fn record_visibility(&mut self, state: VisibilityState, now_ms: i64) {
        let t = self.offset(now_ms);
        self.visibility.push(VisibilityChange { state, t });
    }

    /// Starts (or restarts) the dwell timer for the target's field key.
    pub fn record_focus_in(&mut self, target: &EventTarget, now_ms: i64) {
        let Some(key) = target.field_key() else {
            return;
        };
        let entry = FieldDwell {
            enter: self.offset(now_ms),
            order: self.next_focus_order,
            dwell: None,
        };
        self.next_focus_order = self.next_focus_order.saturating_add(1);
        self.fields.insert(key.to_string(), entry);
    }

    /// Closes the dwell timer for the target's field key. Unknown keys are
    /// ignored.
    pub fn record_focus_out(&mut self, target: &EventTarget, now_ms: i64) {
        let Some(key) = target.field_key() else {
            return;
        };
        let t = self.offset(now_ms);
        if let Some(entry) = self.fields.get_mut(key) {
            entry.dwell = Some(t.saturating_sub(entry.enter).max(0));
        }
    }

    pub fn record_paste(&mut self, target: &EventTarget, now_ms: i64) {
        let t = self.offset(now_ms);
        self.pastes.push(PasteEvent {
            field: target.field_key().map(str::to_string),
            t,
        });
    }

    /// Whether a periodic flush has anything worth sending. Pastes alone do
    /// not count; they ride along with the next non-empty flush or the exit.
    pub fn has_activity(&self) -> bool {
        !self.mouse.is_empty()
            || !self.clicks.is_empty()
            || self.scroll != 0
            || !self.visibility.is_empty()
            || !self.fields.is_empty()
    }

    pub fn snapshot(&self) -> InteractionBatch {
        InteractionBatch {
            mouse: self.mouse.to_vec(),
            clicks: self.clicks.to_vec(),
            scroll: self.scroll,
            visibility: self.visibility.clone(),
            fields: self.fields.clone(),
            pastes: self.pastes.clone(),
        }
    }

    /// Copies the current state for an interaction payload and empties the
    /// per-interval buffers. Scroll depth and the field map are cumulative
    /// and survive the drain.
    pub fn drain(&mut self) -> Option<InteractionBatch> {
        if !self.has_activity() {
            return None;
        }
        let batch = self.snapshot();
        self.mouse.clear();
        self.clicks.clear();
        self.visibility.clear();
        self.pastes.clear();
        Some(batch)
    }

    pub fn exit_summary(&self, now_ms: i64) -> ExitSummary {
        ExitSummary {
            duration: self.offset(now_ms),
            interaction: self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn aggregator() -> Aggregator {
        Aggregator::new(T0, AggregatorLimits::default())
    }

    #[test]
    fn pointer_samples_are_throttled_per_window() {
        let mut agg = aggregator();
        // One event every 100ms for 2.05s: windows start at 0, 500, 1000, 1500, 2000.
        let kept = (0..=20)
            .filter(|i| agg.record_pointer(*i, *i, T0 + i64::from(*i) * 100))
            .count();
        assert_eq!(kept, 5);
        let times: Vec<i64> = agg.snapshot().mouse.iter().map(|s| s.2).collect();
        assert_eq!(times, vec![0, 500, 1_000, 1_500, 2_000]);
    }

    #[test]
    fn first_pointer_sample_is_always_kept() {
        let mut agg = aggregator();
        assert!(agg.record_pointer(3, 4, T0 + 10));
        assert!(!agg.record_pointer(5, 6, T0 + 509));
        assert!(agg.record_pointer(7, 8, T0 + 510));
    }

    #[test]
    fn pointer_ring_evicts_oldest_at_one_hundred() {
        let mut agg = aggregator();
        for i in 0..130 {
            agg.record_pointer(i, 0, T0 + i64::from(i) * 500);
        }
        let mouse = agg.snapshot().mouse;
        assert_eq!(mouse.len(), 100);
        assert_eq!(mouse.first(), Some(&PointerSample(30, 0, 15_000)));
        assert_eq!(mouse.last(), Some(&PointerSample(129, 0, 64_500)));
    }

    #[test]
    fn click_ring_evicts_oldest_at_fifty() {
        let mut agg = aggregator();
        let button = EventTarget::new("BUTTON").with_id("go");
        for i in 0..75 {
            agg.record_click(i, i, &button, T0 + i64::from(i));
        }
        let clicks = agg.snapshot().clicks;
        assert_eq!(clicks.len(), 50);
        assert_eq!(clicks[0].x, 25);
        assert_eq!(clicks[49].x, 74);
        assert_eq!(clicks[0].id.as_deref(), Some("go"));
        assert_eq!(clicks[0].name, None);
    }

    #[test]
    fn anonymous_click_still_takes_a_slot() {
        let mut agg = aggregator();
        agg.record_click(1, 1, &EventTarget::new("DIV"), T0);
        assert_eq!(agg.snapshot().clicks.len(), 1);
        assert!(agg.snapshot().fields.is_empty());
    }

    #[test]
    fn scroll_depth_never_decreases() {
        let mut agg = aggregator();
        let at = |y: f64| ScrollMetrics {
            scroll_y: y,
            scroll_height: 2_000.0,
            inner_height: 1_000.0,
        };
        agg.record_scroll(at(300.0));
        agg.record_scroll(at(700.0));
        agg.record_scroll(at(100.0));
        assert_eq!(agg.snapshot().scroll, 70);
    }

    #[test]
    fn focus_dwell_is_time_between_in_and_out() {
        let mut agg = aggregator();
        let email = EventTarget::new("INPUT").with_name("email");
        agg.record_focus_in(&email, T0 + 1_000);
        agg.record_focus_out(&email, T0 + 4_250);
        let fields = agg.snapshot().fields;
        assert_eq!(
            fields.get("email"),
            Some(&FieldDwell {
                enter: 1_000,
                order: 0,
                dwell: Some(3_250),
            })
        );
    }

    #[test]
    fn focus_out_without_focus_in_is_ignored() {
        let mut agg = aggregator();
        agg.record_focus_out(&EventTarget::new("INPUT").with_id("phone"), T0 + 10);
        assert!(agg.snapshot().fields.is_empty());
        assert!(!agg.has_activity());
    }

    #[test]
    fn refocus_restarts_timer_with_new_order() {
        let mut agg = aggregator();
        let a = EventTarget::new("INPUT").with_name("a");
        let b = EventTarget::new("INPUT").with_id("b");
        agg.record_focus_in(&a, T0 + 100);
        agg.record_focus_out(&a, T0 + 200);
        agg.record_focus_in(&b, T0 + 300);
        agg.record_focus_in(&a, T0 + 400);
        let fields = agg.snapshot().fields;
        assert_eq!(fields["a"], FieldDwell { enter: 400, order: 2, dwell: None });
        assert_eq!(fields["b"].order, 1);
    }

    #[test]
    fn unnamed_fields_are_not_tracked() {
        let mut agg = aggregator();
        agg.record_focus_in(&EventTarget::new("TEXTAREA"), T0);
        assert!(agg.snapshot().fields.is_empty());
    }

    #[test]
    fn paste_records_field_key_or_null() {
        let mut agg = aggregator();
        agg.record_paste(&EventTarget::new("INPUT").with_id("otp"), T0 + 5);
        agg.record_paste(&EventTarget::new("DIV"), T0 + 6);
        let pastes = agg.snapshot().pastes;
        assert_eq!(pastes[0].field.as_deref(), Some("otp"));
        assert_eq!(pastes[1].field, None);
    }

    #[test]
    fn empty_state_does_not_drain() {
        let mut agg = aggregator();
        assert_eq!(agg.drain(), None);
        // A lone paste is not enough to warrant a flush.
        agg.record_paste(&EventTarget::new("INPUT"), T0);
        assert_eq!(agg.drain(), None);
    }

    #[test]
    fn drain_clears_interval_buffers_but_keeps_cumulative_state() {
        let mut agg = aggregator();
        let field = EventTarget::new("INPUT").with_name("q");
        agg.record_pointer(1, 1, T0);
        agg.record_click(1, 1, &field, T0);
        agg.record_visibility(VisibilityState::Hidden, T0 + 1);
        agg.record_focus_in(&field, T0 + 2);
        agg.record_paste(&field, T0 + 3);
        agg.record_scroll(ScrollMetrics {
            scroll_y: 500.0,
            scroll_height: 1_500.0,
            inner_height: 500.0,
        });

        let batch = agg.drain().expect("activity recorded");
        assert_eq!(batch.mouse.len(), 1);
        assert_eq!(batch.pastes.len(), 1);
        assert_eq!(batch.scroll, 50);

        let after = agg.snapshot();
        assert!(after.mouse.is_empty());
        assert!(after.clicks.is_empty());
        assert!(after.visibility.is_empty());
        assert!(after.pastes.is_empty());
        assert_eq!(after.scroll, 50);
        assert!(after.fields.contains_key("q"));
    }

    #[test]
    fn exit_summary_reports_elapsed_and_current_state() {
        let mut agg = aggregator();
        agg.record_pointer(9, 9, T0 + 100);
        let summary = agg.exit_summary(T0 + 61_000);
        assert_eq!(summary.duration, 61_000);
        assert_eq!(summary.interaction.mouse, vec![PointerSample(9, 9, 100)]);
        // Exit reads; it never clears.
        assert_eq!(agg.snapshot().mouse.len(), 1);
    }
}
