//! Poll schedules and continuation decisions

use crate::compare::{to_test_error, Comparator};
use crate::config::PollConfig;
use crate::error::TestError;
use crate::runner::Variables;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Wait between attempts when `interval` is not given
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Waits between attempts.
///
/// Full intervals fit into `duration` first; a shorter remainder closes the
/// schedule. The sum never exceeds `duration`.
pub fn schedule(duration: Duration, interval: Duration) -> Vec<Duration> {
    let interval = if interval.is_zero() { DEFAULT_INTERVAL } else { interval };
    let mut remaining = duration;
    let mut ticks = Vec::new();
    while !remaining.is_zero() && remaining >= interval {
        ticks.push(interval);
        remaining -= interval;
    }
    if !remaining.is_zero() {
        ticks.push(remaining);
    }
    ticks
}

/// Schedule of a node's poll spec; empty when it does not poll
pub fn schedule_for(poll: &PollConfig) -> Vec<Duration> {
    match poll.duration {
        Some(duration) => schedule(duration, poll.interval.unwrap_or(DEFAULT_INTERVAL)),
        None => Vec::new(),
    }
}

/// Timing of a polled node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    pub start: Instant,
    /// Start plus the whole schedule
    pub planned_finish: Instant,
    pub finish: Instant,
    pub attempts: usize,
}

/// What to do after an attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PollDecision {
    Continue,
    Stop,
    /// Stop, surfacing the predicate's mismatch
    StopWithMismatch(TestError),
}

/// Decide whether polling goes on after an attempt.
///
/// Without a predicate a failed attempt is retried and a passing one ends the
/// poll. A predicate means "keep polling while the response matches": the
/// regex wins over the template when both are given.
pub fn decide(
    poll: &PollConfig,
    failed: bool,
    response: Option<&str>,
    vars: &Variables,
    comparator: &Comparator,
) -> PollDecision {
    if !poll.has_predicate() {
        return if failed {
            PollDecision::Continue
        } else {
            PollDecision::Stop
        };
    }

    let Some(response) = response else {
        return PollDecision::Stop;
    };

    if let Some(pattern) = &poll.response_regexp {
        let pattern = vars.apply(pattern);
        return match Regex::new(&pattern) {
            Ok(rx) if rx.is_match(response) => PollDecision::Continue,
            Ok(_) => PollDecision::Stop,
            Err(err) => {
                warn!("Invalid poll response_regexp '{}': {}", pattern, err);
                PollDecision::Stop
            }
        };
    }

    let Some(template) = &poll.response else {
        return PollDecision::Stop;
    };
    let template = vars.apply(template);
    match comparator.compare_json_body(&template, response, &poll.comparison_params) {
        Ok(errors) => match to_test_error("poll condition failed", &template, response, &errors) {
            None => PollDecision::Continue,
            Some(mismatch) => PollDecision::StopWithMismatch(mismatch),
        },
        Err(err) => {
            warn!("Poll response template is unusable: {}", err);
            PollDecision::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CompareParams;
    use crate::eval::Evaluator;
    use crate::persistent::MemoryStore;
    use std::rc::Rc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn env() -> (Variables, Comparator) {
        let evaluator = Rc::new(Evaluator::new());
        (
            Variables::new(evaluator.clone(), Box::new(MemoryStore::new()), false),
            Comparator::new(CompareParams::default(), evaluator),
        )
    }

    #[test]
    fn test_schedule_even_split() {
        assert_eq!(schedule(secs(3), secs(1)), vec![secs(1), secs(1), secs(1)]);
    }

    #[test]
    fn test_schedule_remainder_tick() {
        assert_eq!(
            schedule(Duration::from_millis(2500), secs(1)),
            vec![secs(1), secs(1), Duration::from_millis(500)]
        );
        assert_eq!(schedule(Duration::from_millis(300), secs(1)), vec![Duration::from_millis(300)]);
    }

    #[test]
    fn test_schedule_empty_and_default_interval() {
        assert!(schedule(Duration::ZERO, secs(1)).is_empty());
        assert_eq!(schedule(secs(2), Duration::ZERO), vec![secs(1), secs(1)]);

        let poll: PollConfig = serde_yaml::from_str("duration: 2s").unwrap();
        assert_eq!(schedule_for(&poll), vec![secs(1), secs(1)]);
        assert!(schedule_for(&PollConfig::default()).is_empty());
    }

    #[test]
    fn test_decide_without_predicate() {
        let (vars, comparator) = env();
        let poll = PollConfig::default();
        assert_eq!(decide(&poll, true, None, &vars, &comparator), PollDecision::Continue);
        assert_eq!(decide(&poll, false, Some("ok"), &vars, &comparator), PollDecision::Stop);
    }

    #[test]
    fn test_decide_regex_predicate() {
        let (vars, comparator) = env();
        let poll: PollConfig = serde_yaml::from_str("duration: 1s\nresponse_regexp: pending").unwrap();
        assert_eq!(decide(&poll, true, Some("still pending"), &vars, &comparator), PollDecision::Continue);
        assert_eq!(decide(&poll, false, Some("pending"), &vars, &comparator), PollDecision::Continue);
        assert_eq!(decide(&poll, true, Some("done"), &vars, &comparator), PollDecision::Stop);
        assert_eq!(decide(&poll, true, None, &vars, &comparator), PollDecision::Stop);
    }

    #[test]
    fn test_regex_takes_precedence_over_template() {
        let (vars, comparator) = env();
        let yaml = "duration: 1s\nresponse_regexp: running\nresponse: {state: done}";
        let poll: PollConfig = serde_yaml::from_str(yaml).unwrap();
        let response = r#"{"state": "running"}"#;
        assert_eq!(decide(&poll, true, Some(response), &vars, &comparator), PollDecision::Continue);
    }

    #[test]
    fn test_decide_template_predicate() {
        let (vars, comparator) = env();
        let poll: PollConfig = serde_yaml::from_str("duration: 1s\nresponse: {state: pending}").unwrap();
        assert_eq!(
            decide(&poll, true, Some(r#"{"state": "pending"}"#), &vars, &comparator),
            PollDecision::Continue
        );
        match decide(&poll, true, Some(r#"{"state": "failed"}"#), &vars, &comparator) {
            PollDecision::StopWithMismatch(err) => {
                assert_eq!(err.title, "poll condition failed");
                assert!(err.message.contains("$.state"));
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }
}
