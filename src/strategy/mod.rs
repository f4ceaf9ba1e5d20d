// Trading strategy module
pub mod scored;
pub mod signals;

pub use scored::{score_point, ScoreBreakdown};
pub use signals::{DecisionMode, SignalConfig, SignalEvaluator};

use crate::indicators::IndicatorSnapshot;
use crate::models::{PositionState, Signal};

/// Base trait for signal evaluation
///
/// Implementations are pure: no I/O, same inputs give the same signal.
pub trait Strategy: Send + Sync {
    /// Map indicator state (and the side of any open position) to a signal
    fn evaluate(&self, snapshot: &IndicatorSnapshot, position: &PositionState) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;
}
