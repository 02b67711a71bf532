//! Status graphs and the append-only timeline shared by orders and preorders.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// A closed status enum with a forward-only flow and a cancellation exit.
pub trait LifecycleStatus:
    Copy + Eq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Forward order of every non-cancelled status.
    const FLOW: &'static [Self];
    const CANCELLED: Self;

    fn as_str(self) -> &'static str;
    fn is_terminal(self) -> bool;
    /// Whether `CANCELLED` may follow `self`.
    fn cancellable_from(self) -> bool;

    fn rank(self) -> Option<usize> { Self::FLOW.iter().position(|s| *s == self) }

    fn can_transition_to(self, next: Self) -> bool {
        if self == next || self.is_terminal() {
            return false;
        }
        if next == Self::CANCELLED {
            return self.cancellable_from();
        }
        matches!((self.rank(), next.rank()), (Some(from), Some(to)) if to > from)
    }

    /// Every status reachable in one step, flow order, cancellation last.
    fn next_statuses(self) -> Vec<Self> {
        Self::FLOW
            .iter()
            .copied()
            .chain(std::iter::once(Self::CANCELLED))
            .filter(|s| self.can_transition_to(*s))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry<S> {
    pub status: S,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Current status plus its history. The last entry always carries the current status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusTrack<S> {
    status: S,
    timeline: Vec<TimelineEntry<S>>,
}

impl<S: LifecycleStatus> StatusTrack<S> {
    pub fn start(initial: S, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: initial,
            timeline: vec![TimelineEntry { status: initial, description: description.into(), timestamp: now }],
        }
    }

    pub fn status(&self) -> S { self.status }
    pub fn timeline(&self) -> &[TimelineEntry<S>] { &self.timeline }

    /// Validates first, then appends and sets status together. On error nothing changes.
    pub fn advance(&mut self, next: S, description: impl Into<String>, now: DateTime<Utc>) -> Result<&TimelineEntry<S>, LifecycleError> {
        if !self.status.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition { current: self.status.as_str(), requested: next.as_str() });
        }
        let timestamp = match self.timeline.last() {
            Some(last) if last.timestamp >= now => last.timestamp + Duration::microseconds(1),
            _ => now,
        };
        self.timeline.push(TimelineEntry { status: next, description: description.into(), timestamp });
        self.status = next;
        Ok(&self.timeline[self.timeline.len() - 1])
    }

    /// True when the history is strictly chronological and ends on the current status.
    pub fn is_consistent(&self) -> bool {
        let ordered = self.timeline.windows(2).all(|w| w[0].timestamp < w[1].timestamp);
        ordered && self.timeline.last().is_some_and(|e| e.status == self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot move from {current} to {requested}")]
    InvalidTransition { current: &'static str, requested: &'static str },
}
