//! Outcome of a settle measurement run.

use core::time::Duration;

/// Terminal state of a completed measurement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Verdict {
    /// The rolling average dropped below the threshold before the timeout.
    Settled,
    /// The timeout elapsed without the rolling average reaching the threshold.
    TimedOut,
}

/// Result of a settle measurement run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outcome {
    pub settled: bool,

    /// Smallest rolling average observed during the run (µA).
    ///
    /// `+inf` if no samples were ever received.
    pub min_rolling_average: f64,

    /// Number of poll ticks executed.
    pub polls: u64,

    /// Wall time from the first poll to the terminal state.
    pub elapsed: Duration,
}

impl Outcome {
    /// Returns the terminal state this outcome represents.
    pub fn verdict(&self) -> Verdict {
        if self.settled {
            Verdict::Settled
        } else {
            Verdict::TimedOut
        }
    }

    /// Returns true if at least one sample contributed to the minimum.
    pub fn has_measurement(&self) -> bool {
        self.min_rolling_average.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_settled_flag() {
        let mut outcome = Outcome {
            settled: true,
            min_rolling_average: 4.2,
            polls: 12,
            elapsed: Duration::from_millis(120),
        };
        assert_eq!(outcome.verdict(), Verdict::Settled);
        assert!(outcome.has_measurement());

        outcome.settled = false;
        outcome.min_rolling_average = f64::INFINITY;
        assert_eq!(outcome.verdict(), Verdict::TimedOut);
        assert!(!outcome.has_measurement());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_verdict_serializes_snake_case() {
        let json = serde_json::to_string(&Verdict::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
