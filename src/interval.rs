use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::problem::TimeValue;

/// Half-open time interval `[from, to)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Display)]
#[derive(Serialize, Deserialize)]
#[display(fmt = "[{},{})", from, to)]
pub struct LeftClosedInterval {
    pub from: TimeValue,
    pub to: TimeValue,
}

impl LeftClosedInterval {
    pub fn new(from: TimeValue, to: TimeValue) -> Self {
        LeftClosedInterval { from, to }
    }

    pub fn overlap(&self, other: &Self) -> bool {
        !(self.to <= other.from || other.to <= self.from)
    }

    pub fn contains(&self, t: TimeValue) -> bool {
        self.from <= t && t < self.to
    }

    pub fn length(&self) -> TimeValue {
        self.to - self.from
    }

    /// The integer time steps covered by the interval.
    pub fn time_steps(&self) -> std::ops::Range<TimeValue> {
        self.from..self.to
    }
}
