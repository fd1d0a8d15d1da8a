//! Auto-scroll decisions for the message list.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ViewportMetrics {
    #[must_use]
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }

    #[must_use]
    pub fn is_near_bottom(&self, threshold_px: f64) -> bool {
        self.distance_from_bottom() <= threshold_px
    }
}

/// What caused a list change. Own sends and the first load always land on the
/// newest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTrigger {
    Initial,
    Poll,
    OwnSend,
    Backfill,
    Refresh,
    Delete,
}

impl MergeTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Poll => "poll",
            Self::OwnSend => "own_send",
            Self::Backfill => "backfill",
            Self::Refresh => "refresh",
            Self::Delete => "delete",
        }
    }

    #[must_use]
    pub fn forces_scroll(self) -> bool {
        matches!(self, Self::Initial | Self::OwnSend | Self::Refresh)
    }
}

#[must_use]
pub fn should_auto_scroll(
    was_near_bottom: bool,
    actively_scrolling: bool,
    trigger: MergeTrigger,
) -> bool {
    if trigger.forces_scroll() {
        return true;
    }
    if trigger == MergeTrigger::Backfill {
        return false;
    }
    was_near_bottom && !actively_scrolling
}

/// Debounced "user is scrolling" flag.
#[derive(Debug, Clone)]
pub struct ScrollActivity {
    idle_after: Duration,
    min_delta_px: f64,
    last_scroll_top: Option<f64>,
    last_scrolled_at: Option<Instant>,
}

impl ScrollActivity {
    #[must_use]
    pub fn new(idle_after: Duration, min_delta_px: f64) -> Self {
        Self {
            idle_after,
            min_delta_px,
            last_scroll_top: None,
            last_scrolled_at: None,
        }
    }

    /// Record a scroll position. Returns true when the move counted as user
    /// scrolling.
    pub fn record(&mut self, scroll_top: f64, now: Instant) -> bool {
        let previous = self.last_scroll_top.replace(scroll_top);
        let moved = previous.is_some_and(|previous| (scroll_top - previous).abs() > self.min_delta_px);
        if moved {
            self.last_scrolled_at = Some(now);
        }
        moved
    }

    /// Programmatic scrolls move the baseline without counting as activity.
    pub fn sync_position(&mut self, scroll_top: f64) {
        self.last_scroll_top = Some(scroll_top);
    }

    #[must_use]
    pub fn is_active(&self, now: Instant) -> bool {
        self.last_scrolled_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.idle_after)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{MergeTrigger, ScrollActivity, ViewportMetrics, should_auto_scroll};

    #[test]
    fn near_bottom_uses_remaining_distance() {
        let metrics = ViewportMetrics {
            scroll_top: 1_300.0,
            scroll_height: 2_000.0,
            client_height: 600.0,
        };
        assert!((metrics.distance_from_bottom() - 100.0).abs() < f64::EPSILON);
        assert!(metrics.is_near_bottom(150.0));
        assert!(!metrics.is_near_bottom(50.0));
    }

    #[test]
    fn auto_scroll_follows_reader_position() {
        assert!(should_auto_scroll(true, false, MergeTrigger::Poll));
        assert!(!should_auto_scroll(true, true, MergeTrigger::Poll));
        assert!(!should_auto_scroll(false, false, MergeTrigger::Poll));
    }

    #[test]
    fn own_send_and_initial_load_always_scroll() {
        assert!(should_auto_scroll(false, true, MergeTrigger::OwnSend));
        assert!(should_auto_scroll(false, true, MergeTrigger::Initial));
        assert!(!should_auto_scroll(true, false, MergeTrigger::Backfill));
    }

    #[test]
    fn scrolling_flag_debounces_and_ignores_jitter() {
        let start = Instant::now();
        let mut activity = ScrollActivity::new(Duration::from_millis(1_500), 5.0);

        assert!(!activity.record(100.0, start));
        assert!(!activity.record(104.0, start));
        assert!(!activity.is_active(start));

        assert!(activity.record(120.0, start));
        assert!(activity.is_active(start + Duration::from_millis(1_499)));
        assert!(!activity.is_active(start + Duration::from_millis(1_500)));
    }

    #[test]
    fn programmatic_scroll_is_not_user_activity() {
        let start = Instant::now();
        let mut activity = ScrollActivity::new(Duration::from_millis(1_500), 5.0);
        let _ = activity.record(0.0, start);
        activity.sync_position(900.0);
        assert!(!activity.record(902.0, start));
        assert!(!activity.is_active(start));
    }
}
