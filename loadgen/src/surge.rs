//! Per-second intensity multipliers used to simulate traffic spikes.

use serde::Deserialize;

use crate::error::ConfigError;

/// A time-bounded intensity override.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Surge {
    /// First second of the surge, relative to the start of the run.
    pub start: u64,
    /// Number of seconds covered by the surge.
    pub duration: u64,
    /// Multiplier applied to request spacing while the surge is active.
    pub intensity: f64,
}

/// An immutable intensity multiplier for every second of the run.
///
/// Every second defaults to `1.0`. Surges override the seconds they cover in the order they are
/// declared, so later surges win where they overlap.
#[derive(Clone, Debug)]
pub struct SurgeSchedule {
    total: u64,
    /// Surges clipped to the run, in declaration order.
    surges: Vec<Surge>,
}

impl SurgeSchedule {
    /// Builds the schedule for a run of `total` seconds.
    ///
    /// Surges reaching past `total` are clipped.
    pub fn new(total: u64, surges: &[Surge]) -> Result<Self, ConfigError> {
        let mut clipped = Vec::with_capacity(surges.len());

        for (index, surge) in surges.iter().enumerate() {
            if !surge.intensity.is_finite() || surge.intensity <= 0.0 {
                return Err(ConfigError::InvalidSurge {
                    index,
                    reason: "intensity must be positive",
                });
            }
            if surge.duration == 0 {
                return Err(ConfigError::InvalidSurge {
                    index,
                    reason: "duration must be positive",
                });
            }

            let end = surge.start.saturating_add(surge.duration);
            if end > total {
                tracing::warn!(
                    index,
                    start = surge.start,
                    end,
                    total,
                    "surge exceeds the run, clipping"
                );
            }

            let start = surge.start.min(total);
            let end = end.min(total);
            if start < end {
                clipped.push(Surge {
                    start,
                    duration: end - start,
                    intensity: surge.intensity,
                });
            }
        }

        Ok(Self {
            total,
            surges: clipped,
        })
    }

    /// Returns the intensity for the given second of the run.
    ///
    /// Seconds past the end of the schedule, which a session can observe when its clock drifts
    /// beyond the nominal window, fall back to `1.0`.
    pub fn intensity_at(&self, second: u64) -> f64 {
        if second >= self.total {
            return 1.0;
        }

        self.surges
            .iter()
            .rev()
            .find(|surge| surge.start <= second && second - surge.start < surge.duration)
            .map_or(1.0, |surge| surge.intensity)
    }
}
