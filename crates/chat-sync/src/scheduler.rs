//! Adaptive live-poll cadence.
//!
//! The scheduler is a pure state machine: the session feeds it visibility and
//! activity signals plus the current instant, and asks it for the interval to
//! arm next. Pausing is orthogonal to cadence.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::{PollIntervals, SyncConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCadence {
    Active,
    Slow,
    Hidden,
}

impl PollCadence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Slow => "slow",
            Self::Hidden => "hidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Backfilling,
    Refreshing,
    Hidden,
}

impl PauseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backfilling => "backfilling",
            Self::Refreshing => "refreshing",
            Self::Hidden => "hidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    KeyPress,
    Click,
    Touch,
}

impl ActivityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyPress => "key_press",
            Self::Click => "click",
            Self::Touch => "touch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTransition {
    pub from: PollCadence,
    pub to: PollCadence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSnapshot {
    pub cadence: PollCadence,
    pub interval: Duration,
    pub paused_reason: Option<PauseReason>,
    pub visible: bool,
    pub last_activity_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PauseSet {
    backfilling: bool,
    refreshing: bool,
    hidden: bool,
}

impl PauseSet {
    fn slot(&mut self, reason: PauseReason) -> &mut bool {
        match reason {
            PauseReason::Backfilling => &mut self.backfilling,
            PauseReason::Refreshing => &mut self.refreshing,
            PauseReason::Hidden => &mut self.hidden,
        }
    }

    fn reason(self) -> Option<PauseReason> {
        if self.backfilling {
            Some(PauseReason::Backfilling)
        } else if self.refreshing {
            Some(PauseReason::Refreshing)
        } else if self.hidden {
            Some(PauseReason::Hidden)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollScheduler {
    intervals: PollIntervals,
    inactivity_delay: Duration,
    pause_when_hidden: bool,
    cadence: PollCadence,
    visible: bool,
    last_activity_at: Instant,
    paused: PauseSet,
}

impl PollScheduler {
    #[must_use]
    pub fn new(config: &SyncConfig, now: Instant) -> Self {
        Self {
            intervals: config.intervals,
            inactivity_delay: config.inactivity_delay,
            pause_when_hidden: config.pause_when_hidden,
            cadence: PollCadence::Active,
            visible: true,
            last_activity_at: now,
            paused: PauseSet::default(),
        }
    }

    #[must_use]
    pub fn cadence(&self) -> PollCadence {
        self.cadence
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        match self.cadence {
            PollCadence::Active => self.intervals.active,
            PollCadence::Slow => self.intervals.slow,
            PollCadence::Hidden => self.intervals.hidden,
        }
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn paused_reason(&self) -> Option<PauseReason> {
        self.paused.reason()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.reason().is_some()
    }

    /// Returns true when the reason was not already held.
    pub fn pause(&mut self, reason: PauseReason) -> bool {
        let slot = self.paused.slot(reason);
        let changed = !*slot;
        *slot = true;
        changed
    }

    /// Releases one reason. Returns true when polling may run again.
    pub fn resume(&mut self, reason: PauseReason) -> bool {
        let slot = self.paused.slot(reason);
        let was_held = *slot;
        *slot = false;
        was_held && !self.is_paused()
    }

    pub fn on_visibility_change(&mut self, visible: bool, now: Instant) -> Option<PollTransition> {
        if self.visible == visible {
            return None;
        }
        self.visible = visible;
        if visible {
            self.paused.hidden = false;
            self.last_activity_at = now;
            return self.transition(PollCadence::Active);
        }
        if self.pause_when_hidden {
            self.paused.hidden = true;
            return None;
        }
        self.transition(PollCadence::Hidden)
    }

    /// Input activity only counts while the document is visible.
    pub fn on_activity(&mut self, _kind: ActivityKind, now: Instant) -> Option<PollTransition> {
        if !self.visible {
            return None;
        }
        self.last_activity_at = now;
        self.transition(PollCadence::Active)
    }

    /// Moves `Active` to `Slow` once the inactivity delay has elapsed.
    pub fn on_inactivity_check(&mut self, now: Instant) -> Option<PollTransition> {
        match self.inactivity_deadline() {
            Some(deadline) if now >= deadline => self.transition(PollCadence::Slow),
            _ => None,
        }
    }

    /// When the inactivity timer fires next, if it is running at all.
    #[must_use]
    pub fn inactivity_deadline(&self) -> Option<Instant> {
        if self.visible && self.cadence == PollCadence::Active {
            Some(self.last_activity_at + self.inactivity_delay)
        } else {
            None
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            cadence: self.cadence,
            interval: self.interval(),
            paused_reason: self.paused_reason(),
            visible: self.visible,
            last_activity_at: self.last_activity_at,
        }
    }

    fn transition(&mut self, to: PollCadence) -> Option<PollTransition> {
        let from = self.cadence;
        if from == to {
            return None;
        }
        self.cadence = to;
        Some(PollTransition { from, to })
    }
}
