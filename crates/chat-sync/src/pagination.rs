//! Cursor state for loading older history.

/// Scroll position captured right before an older page is prepended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    pub scroll_top: f64,
    pub scroll_height: f64,
}

impl ScrollAnchor {
    /// Scroll offset that keeps the previously visible content in place once
    /// the list has grown to `scroll_height_after`.
    #[must_use]
    pub fn compensated_scroll_top(&self, scroll_height_after: f64) -> f64 {
        self.scroll_top + (scroll_height_after - self.scroll_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillSkip {
    Loading,
    Exhausted,
    NotNearTop,
}

impl BackfillSkip {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Exhausted => "exhausted",
            Self::NotNearTop => "not_near_top",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSnapshot {
    pub current_page: u32,
    pub has_more: bool,
    pub loading: bool,
}

#[derive(Debug, Clone)]
pub struct BackfillController {
    threshold_px: f64,
    current_page: u32,
    has_more: bool,
    loading: bool,
}

impl BackfillController {
    #[must_use]
    pub fn new(threshold_px: f64) -> Self {
        Self {
            threshold_px,
            current_page: 1,
            has_more: true,
            loading: false,
        }
    }

    #[must_use]
    pub fn is_near_top(&self, scroll_top: f64) -> bool {
        scroll_top <= self.threshold_px
    }

    /// Scroll-driven trigger: only fires near the top of the viewport.
    pub fn begin_if_near_top(&mut self, scroll_top: f64) -> Result<u32, BackfillSkip> {
        if !self.is_near_top(scroll_top) {
            return Err(BackfillSkip::NotNearTop);
        }
        self.begin()
    }

    /// Explicit trigger. Returns the page number to fetch.
    pub fn begin(&mut self) -> Result<u32, BackfillSkip> {
        if self.loading {
            return Err(BackfillSkip::Loading);
        }
        if !self.has_more {
            return Err(BackfillSkip::Exhausted);
        }
        self.loading = true;
        Ok(self.current_page.saturating_add(1))
    }

    /// Record a successful fetch of `page`. An empty page ends the history.
    pub fn complete(&mut self, page: u32, fetched: usize) {
        self.loading = false;
        if fetched == 0 {
            self.has_more = false;
            return;
        }
        self.current_page = self.current_page.max(page);
    }

    /// A failed fetch leaves the cursor where it was so the same page is
    /// requested again next time.
    pub fn fail(&mut self) {
        self.loading = false;
    }

    pub fn reset(&mut self) {
        self.current_page = 1;
        self.has_more = true;
        self.loading = false;
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn snapshot(&self) -> BackfillSnapshot {
        BackfillSnapshot {
            current_page: self.current_page,
            has_more: self.has_more,
            loading: self.loading,
        }
    }
}
