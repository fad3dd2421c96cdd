//! Hysteresis decision engine.
//!
//! Converts a noisy metric stream into rate-limited scaling actions: a
//! reading must stay out of band for a configured number of consecutive
//! cycles before an action fires, and any in-band reading resets the streak.

use tracing::debug;

/// Outcome of evaluating one metric reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    NoAction,
    ScaleUp,
    ScaleDown,
}

/// Consecutive out-of-band streaks carried between cycles.
///
/// At most one side is non-zero at any time; crossing the opposite bound
/// resets both. Volatile: starts at zero on process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisState {
    /// Consecutive cycles above the upper bound.
    pub scale_up: u32,
    /// Consecutive cycles below the lower bound.
    pub cool_down: u32,
}

/// Thresholds and streak lengths for one scaling dimension.
#[derive(Debug, Clone, Copy)]
pub struct Band {
    /// Lower bound of the healthy region (inclusive).
    pub min: f64,
    /// Upper bound of the healthy region (inclusive).
    pub max: f64,
    /// Consecutive above-max cycles required before scaling up.
    pub scale_up_factor: u32,
    /// Consecutive below-min cycles required before scaling down.
    pub cool_down_factor: u32,
}

/// Evaluate one reading against the band.
///
/// Pure: the caller owns the state and threads it through cycles. An action
/// fires on the cycle where the out-of-band streak reaches its factor, and
/// resets both counters in the same step.
pub fn evaluate(
    band: &Band,
    value: f64,
    state: HysteresisState,
) -> (ScaleDecision, HysteresisState) {
    if value >= band.min && value <= band.max {
        return (ScaleDecision::NoAction, HysteresisState::default());
    }

    if value > band.max {
        let streak = state.scale_up + 1;
        if streak >= band.scale_up_factor {
            debug!(value, streak, "upper bound held long enough, scaling up");
            return (ScaleDecision::ScaleUp, HysteresisState::default());
        }
        debug!(value, streak, needed = band.scale_up_factor, "above upper bound");
        (
            ScaleDecision::NoAction,
            HysteresisState {
                scale_up: streak,
                cool_down: 0,
            },
        )
    } else {
        let streak = state.cool_down + 1;
        if streak >= band.cool_down_factor {
            debug!(value, streak, "lower bound held long enough, scaling down");
            return (ScaleDecision::ScaleDown, HysteresisState::default());
        }
        debug!(value, streak, needed = band.cool_down_factor, "below lower bound");
        (
            ScaleDecision::NoAction,
            HysteresisState {
                scale_up: 0,
                cool_down: streak,
            },
        )
    }
}
