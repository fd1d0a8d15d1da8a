//! Host-side inputs the session reacts to.
//!
//! A browser shell maps `visibilitychange`, key/click/touch listeners and
//! scroll events onto [`EnvironmentSignal`]; tests inject them directly.

use crate::scheduler::ActivityKind;
use crate::viewport::ViewportMetrics;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvironmentSignal {
    VisibilityChanged { visible: bool },
    Activity(ActivityKind),
    Scrolled { scroll_top: f64 },
}

/// The scrollable list the messages are rendered into.
///
/// Listeners registered on the session run before the session reads
/// [`Viewport::metrics`], so a synchronous renderer reports post-render sizes.
pub trait Viewport: Send + Sync {
    fn metrics(&self) -> ViewportMetrics;

    fn set_scroll_top(&self, scroll_top: f64);

    fn scroll_to_bottom(&self) {
        let metrics = self.metrics();
        self.set_scroll_top((metrics.scroll_height - metrics.client_height).max(0.0));
    }
}

/// Viewport for hosts without a scrollable surface, such as a terminal tail.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedViewport;

impl Viewport for DetachedViewport {
    fn metrics(&self) -> ViewportMetrics {
        ViewportMetrics::default()
    }

    fn set_scroll_top(&self, _scroll_top: f64) {}
}
