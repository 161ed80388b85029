use std::fmt;

/// Fixed ratio between the tolerated and satisfied thresholds.
pub const TOLERATED_MULTIPLIER: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApdexBucket {
    Satisfied,
    Tolerated,
    Frustrated,
}

impl ApdexBucket {
    /// Classify `request_time` against the satisfied threshold `t`.
    ///
    /// Bands are closed on their upper end: `t` itself is satisfied and
    /// `4t` is tolerated.
    pub fn classify(request_time: f64, t: f64) -> Self {
        if request_time <= t {
            Self::Satisfied
        } else if request_time <= t * TOLERATED_MULTIPLIER {
            Self::Tolerated
        } else {
            Self::Frustrated
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::Tolerated => "tolerated",
            Self::Frustrated => "frustrated",
        }
    }
}

impl fmt::Display for ApdexBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
