/// Outcome of evaluating one alert key against its previous state
///
/// Only [`AlertEvaluation::StartsToExceed`] is reported to the operator. Going
/// back to normal clears the flag silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEvaluation {
    Ok,
    Exceeding,
    StartsToExceed,
    BackToOk,
}

impl AlertEvaluation {
    pub fn evaluate(violating: bool, was_active: bool) -> AlertEvaluation {
        match (violating, was_active) {
            (false, false) => AlertEvaluation::Ok,
            (false, true) => AlertEvaluation::BackToOk,
            (true, false) => AlertEvaluation::StartsToExceed,
            (true, true) => AlertEvaluation::Exceeding,
        }
    }

    /// Whether the alert key is active after this evaluation.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AlertEvaluation::Exceeding | AlertEvaluation::StartsToExceed
        )
    }

    pub fn notifies(self) -> bool {
        self == AlertEvaluation::StartsToExceed
    }
}
