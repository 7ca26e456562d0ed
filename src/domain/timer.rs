//! Elapsed-time projections for kitchen and floor timers.

use chrono::{NaiveDateTime, TimeDelta};
use std::fmt;

pub const WARNING_MINUTES: i64 = 20;
pub const DANGER_MINUTES: i64 = 30;

/// How late something is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
  Normal,
  Warning,
  Danger,
}

/// Non-negative time since a start timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Elapsed(TimeDelta);

impl Elapsed {
  /// Time from `start` to `now`; clock skew into the future reads as zero.
  pub fn between(start: NaiveDateTime, now: NaiveDateTime) -> Self {
    Self((now - start).max(TimeDelta::zero()))
  }

  pub fn minutes(&self) -> i64 {
    self.0.num_minutes()
  }

  pub fn seconds(&self) -> i64 {
    self.0.num_seconds()
  }

  pub fn urgency(&self) -> Urgency {
    match self.minutes() {
      m if m >= DANGER_MINUTES => Urgency::Danger,
      m if m >= WARNING_MINUTES => Urgency::Warning,
      _ => Urgency::Normal,
    }
  }
}

/// `MM:SS`, or `HH:MM:SS` from one hour on.
impl fmt::Display for Elapsed {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let total = self.seconds();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
      write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
      write!(f, "{:02}:{:02}", minutes, seconds)
    }
  }
}
