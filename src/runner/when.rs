//! Node condition evaluation

use crate::runner::Variables;
use tracing::warn;

/// Evaluate a node guard.
///
/// Placeholders are substituted first, then the text is evaluated as one
/// expression and compared with `true`. A condition that cannot be evaluated
/// is false.
pub fn is_true(vars: &Variables, condition: &str) -> bool {
    let condition = condition.trim();
    if condition.is_empty() {
        return true;
    }

    let substituted = vars.substitute(condition);
    if substituted.contains("$(") {
        return vars.evaluator().interpolate(&substituted).trim() == "true";
    }

    match vars.evaluator().evaluate(&substituted) {
        Ok(value) => value.to_string() == "true",
        Err(err) => {
            warn!("Condition '{}' could not be evaluated: {}", condition, err);
            false
        }
    }
}
