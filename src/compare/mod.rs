//! Structural comparison of expected and actual values
//!
//! Values are compared as JSON trees. String leaves on the expected side may
//! carry a matcher instead of a literal: `$matchRegexp(pattern)` matches the
//! rendered actual value against a regex, and `$fn(args)` calls a registered
//! function with the actual value appended and expects `true`.

mod params;

pub use params::CompareParams;

use crate::error::{ConfigError, ConfigResult, TestError};
use crate::eval::{format_float, Evaluator, Value};
use regex::Regex;
use serde_json::Value as Json;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

/// One mismatch between expected and actual
#[derive(Debug, Clone, PartialEq)]
pub struct CompareError {
    pub path: String,
    pub message: String,
    pub expected: String,
    pub actual: String,
}

impl CompareError {
    fn new(
        path: &str,
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        CompareError {
            path: path.to_string(),
            message: message.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at path {} {}:\nexpected:\n{}\nactual:\n{}",
            self.path, self.message, self.expected, self.actual
        )
    }
}

impl std::error::Error for CompareError {}

/// Fold comparison errors into one assertion failure
pub fn to_test_error(
    title: &str,
    expected: &str,
    actual: &str,
    errors: &[CompareError],
) -> Option<TestError> {
    if errors.is_empty() {
        return None;
    }
    let message = errors
        .iter()
        .map(|e| format!("{}\n", e))
        .collect::<String>();
    Some(TestError::new(title, expected, actual, message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafMode {
    Pure,
    Regex,
    Expression,
}

fn regex_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$matchRegexp\((.+)\)$").expect("valid matcher regex"))
}

fn kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "nil",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "map",
    }
}

fn is_scalar(value: &Json) -> bool {
    !matches!(value, Json::Array(_) | Json::Object(_))
}

/// Render a value for error messages and regex matching
fn render(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map(format_float).unwrap_or_else(|| n.to_string()),
        },
        other => other.to_string(),
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_f64() == b.as_f64(),
    }
}

/// Structural comparator with session-wide default parameters
#[derive(Debug, Clone)]
pub struct Comparator {
    defaults: CompareParams,
    evaluator: Rc<Evaluator>,
}

impl Comparator {
    pub fn new(defaults: CompareParams, evaluator: Rc<Evaluator>) -> Self {
        Comparator { defaults, evaluator }
    }

    pub fn defaults(&self) -> &CompareParams {
        &self.defaults
    }

    /// Compare two values; errors come back sorted by their rendered text
    pub fn compare(&self, expected: &Json, actual: &Json, params: &CompareParams) -> Vec<CompareError> {
        let params = self.defaults.merged(params);
        let mut errors = self.compare_branch("$", expected, actual, &params);
        errors.sort_by_cached_key(|e| e.to_string());
        errors
    }

    /// Parse both bodies as JSON and compare them.
    ///
    /// An unparseable expected body is a document error; an unparseable
    /// actual body is a mismatch.
    pub fn compare_json_body(
        &self,
        expected_body: &str,
        actual_body: &str,
        params: &CompareParams,
    ) -> ConfigResult<Vec<CompareError>> {
        let expected: Json = serde_json::from_str(expected_body).map_err(|e| {
            ConfigError::Invalid(format!(
                "invalid JSON in expected response {}: {}",
                expected_body, e
            ))
        })?;
        let actual: Json = match serde_json::from_str(actual_body) {
            Ok(actual) => actual,
            Err(_) => {
                return Ok(vec![CompareError::new(
                    "$",
                    "could not parse response",
                    expected_body,
                    actual_body,
                )])
            }
        };
        Ok(self.compare(&expected, &actual, params))
    }

    /// Compare command output, as JSON when `compareJson` is enabled
    pub fn compare_text(
        &self,
        expected: &str,
        actual: &str,
        params: &CompareParams,
    ) -> ConfigResult<Vec<CompareError>> {
        if self.defaults.merged(params).compare_json() {
            return self.compare_json_body(expected, actual, params);
        }
        Ok(self.compare(
            &Json::String(expected.to_string()),
            &Json::String(actual.to_string()),
            params,
        ))
    }

    fn leaf_mode(&self, expected: &Json) -> LeafMode {
        let Json::String(s) = expected else {
            return LeafMode::Pure;
        };
        if regex_marker().is_match(s) {
            LeafMode::Regex
        } else if self.evaluator.parse_marker(s).is_some() {
            LeafMode::Expression
        } else {
            LeafMode::Pure
        }
    }

    fn compare_branch(
        &self,
        path: &str,
        expected: &Json,
        actual: &Json,
        params: &CompareParams,
    ) -> Vec<CompareError> {
        let mode = self.leaf_mode(expected);
        if mode != LeafMode::Pure {
            // Matchers skip the type check but not ignoreValues
            if params.ignore_values() && is_scalar(actual) {
                return Vec::new();
            }
            return self.compare_leaf(mode, path, expected, actual);
        }

        let (expected_kind, actual_kind) = (kind(expected), kind(actual));
        if expected_kind != actual_kind {
            return vec![CompareError::new(
                path,
                "types do not match",
                expected_kind,
                actual_kind,
            )];
        }

        match (expected, actual) {
            (Json::Array(expected), Json::Array(actual)) => {
                self.compare_arrays(path, expected, actual, params)
            }
            (Json::Object(expected), Json::Object(actual)) => {
                self.compare_maps(path, expected, actual, params)
            }
            _ if params.ignore_values() => Vec::new(),
            _ => self.compare_pure(path, expected, actual, params),
        }
    }

    fn compare_arrays(
        &self,
        path: &str,
        expected: &[Json],
        actual: &[Json],
        params: &CompareParams,
    ) -> Vec<CompareError> {
        if !params.allow_array_extra_items() && expected.len() != actual.len() {
            return vec![length_error(path, expected.len(), actual.len())];
        }

        let mut expected: Vec<&Json> = expected.iter().collect();
        let mut actual: Vec<&Json> = actual.iter().collect();
        if params.ignore_arrays_ordering() || params.allow_array_extra_items() {
            (expected, actual) = self.unmatched(expected, actual, params);
        }
        if actual.len() < expected.len() {
            return vec![length_error(path, expected.len(), actual.len())];
        }

        let mut errors = Vec::new();
        for (i, (exp, act)) in expected.iter().zip(actual.iter()).enumerate() {
            let sub_path = format!("{}[{}]", path, i);
            errors.extend(self.compare_branch(&sub_path, exp, act, params));
            if params.fail_fast() && !errors.is_empty() {
                break;
            }
        }
        errors
    }

    /// Greedy first-match pairing. Matched actual elements are removed by
    /// swapping in the last element, so the order of what remains changes.
    fn unmatched<'a>(
        &self,
        expected: Vec<&'a Json>,
        mut actual: Vec<&'a Json>,
        params: &CompareParams,
    ) -> (Vec<&'a Json>, Vec<&'a Json>) {
        let item_params = CompareParams {
            fail_fast: Some(true),
            ..params.clone()
        };

        let mut missing = Vec::new();
        for exp in expected {
            let found = actual
                .iter()
                .position(|act| self.compare_branch("$", exp, act, &item_params).is_empty());
            match found {
                Some(i) => {
                    actual.swap_remove(i);
                }
                None => {
                    missing.push(exp);
                    if params.fail_fast() {
                        actual.truncate(1);
                        return (missing, actual);
                    }
                }
            }
        }
        (missing, actual)
    }

    fn compare_maps(
        &self,
        path: &str,
        expected: &serde_json::Map<String, Json>,
        actual: &serde_json::Map<String, Json>,
        params: &CompareParams,
    ) -> Vec<CompareError> {
        if params.disallow_extra_fields() && expected.len() != actual.len() {
            return vec![CompareError::new(
                path,
                "map lengths do not match",
                expected.len().to_string(),
                actual.len().to_string(),
            )];
        }

        let mut errors = Vec::new();
        for (key, exp) in expected {
            let Some(act) = actual.get(key) else {
                errors.push(CompareError::new(path, "key is missing", key.as_str(), "<missing>"));
                if params.fail_fast() {
                    return errors;
                }
                continue;
            };

            let sub_path = format!("{}.{}", path, key);
            errors.extend(self.compare_branch(&sub_path, exp, act, params));
            if params.fail_fast() && !errors.is_empty() {
                return errors;
            }
        }
        errors
    }

    fn compare_leaf(&self, mode: LeafMode, path: &str, expected: &Json, actual: &Json) -> Vec<CompareError> {
        let Json::String(marker) = expected else {
            unreachable!("matcher leaves are always strings");
        };
        match mode {
            LeafMode::Regex => compare_regex(path, marker, actual),
            LeafMode::Expression => self.compare_expression(path, marker, actual),
            LeafMode::Pure => unreachable!("pure leaves are compared by compare_pure"),
        }
    }

    fn compare_expression(&self, path: &str, marker: &str, actual: &Json) -> Vec<CompareError> {
        let matched = self
            .evaluator
            .parse_marker(marker)
            .map(|(name, args)| self.evaluator.eval_marker(name, args, Value::from(actual)))
            .map(|result| matches!(result, Ok(Value::Bool(true))))
            .unwrap_or(false);

        if matched {
            Vec::new()
        } else {
            vec![CompareError::new(
                path,
                "values do not match by condition",
                marker,
                render(actual),
            )]
        }
    }

    fn compare_pure(
        &self,
        path: &str,
        expected: &Json,
        actual: &Json,
        params: &CompareParams,
    ) -> Vec<CompareError> {
        if let (Json::String(exp), Json::String(act)) = (expected, actual) {
            if params.line_by_line() && exp.contains('\n') && act.contains('\n') {
                return compare_lines(path, exp, act);
            }
        }

        let equal = match (expected, actual) {
            (Json::Number(a), Json::Number(b)) => numbers_equal(a, b),
            _ => expected == actual,
        };
        if equal {
            Vec::new()
        } else {
            vec![CompareError::new(
                path,
                "values do not match",
                render(expected),
                render(actual),
            )]
        }
    }
}

fn length_error(path: &str, expected: usize, actual: usize) -> CompareError {
    CompareError::new(
        path,
        "array lengths do not match",
        expected.to_string(),
        actual.to_string(),
    )
}

fn compare_lines(path: &str, expected: &str, actual: &str) -> Vec<CompareError> {
    let expected_lines: Vec<&str> = expected.split('\n').collect();
    let actual_lines: Vec<&str> = actual.split('\n').collect();

    if expected_lines.len() != actual_lines.len() {
        let mut message = format!(
            "lines count differs, expected {}, got {}",
            expected_lines.len(),
            actual_lines.len()
        );
        for (k, (exp, act)) in expected_lines.iter().zip(actual_lines.iter()).enumerate() {
            if exp != act {
                message.push_str(&format!(
                    "\nlines different at line {}, expected `{}`, got `{}`",
                    k, exp, act
                ));
            }
        }
        return vec![CompareError::new(path, message, expected, actual)];
    }

    for (k, (exp, act)) in expected_lines.iter().zip(actual_lines.iter()).enumerate() {
        if exp.trim_matches(' ') != act.trim_matches(' ') {
            let message = format!(
                "\nlines different at line {}, expected `{}`, got `{}`",
                k, exp, act
            );
            return vec![CompareError::new(path, message, expected, actual)];
        }
    }
    Vec::new()
}

fn compare_regex(path: &str, marker: &str, actual: &Json) -> Vec<CompareError> {
    let pattern = regex_marker()
        .captures(marker)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");

    let rx = match Regex::new(pattern) {
        Ok(rx) => rx,
        Err(_) => return vec![CompareError::new(path, "can not compile regex", "null", "error")],
    };

    let value = render(actual);
    if rx.is_match(&value) {
        Vec::new()
    } else {
        vec![CompareError::new(path, "value does not match regex", marker, value)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comparator() -> Comparator {
        Comparator::new(CompareParams::default(), Rc::new(Evaluator::new()))
    }

    fn unordered() -> CompareParams {
        CompareParams {
            ignore_arrays_ordering: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_reflexive() {
        let c = comparator();
        let values = [
            json!(null),
            json!(true),
            json!(1.5),
            json!("text"),
            json!("multi\nline"),
            json!([1, [2, 3], {"a": null}]),
            json!({"a": {"b": [1, 2]}, "c": "d"}),
        ];
        for value in &values {
            assert!(c.compare(value, value, &CompareParams::default()).is_empty(), "{}", value);
        }
    }

    #[test]
    fn test_types_do_not_match() {
        let errors = comparator().compare(&json!({"a": 1}), &json!({"a": "1"}), &CompareParams::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "$.a");
        assert_eq!(errors[0].message, "types do not match");
        assert_eq!(errors[0].expected, "number");
        assert_eq!(errors[0].actual, "string");
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let c = comparator();
        assert!(c.compare(&json!(1), &json!(1.0), &CompareParams::default()).is_empty());
        assert_eq!(c.compare(&json!(1), &json!(2), &CompareParams::default()).len(), 1);
    }

    #[test]
    fn test_unordered_arrays() {
        let c = comparator();
        assert!(c.compare(&json!([1, 2, 3]), &json!([3, 1, 2]), &unordered()).is_empty());

        let params = CompareParams {
            allow_array_extra_items: Some(false),
            ..unordered()
        };
        let errors = c.compare(&json!([1, 2, 3]), &json!([3, 1, 2, 4]), &params);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "array lengths do not match");
    }

    #[test]
    fn test_ordered_arrays_report_positions() {
        let errors = comparator().compare(&json!([1, 2, 3]), &json!([1, 3, 2]), &CompareParams::default());
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["$[1]", "$[2]"]);
    }

    #[test]
    fn test_allow_extra_items() {
        let c = comparator();
        let params = CompareParams {
            allow_array_extra_items: Some(true),
            ..Default::default()
        };
        assert!(c.compare(&json!([2]), &json!([1, 2, 3]), &params).is_empty());

        let errors = c.compare(&json!([5]), &json!([1, 2]), &params);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "$[0]");
    }

    #[test]
    fn test_greedy_matching_is_first_match() {
        // The first expected element takes the first actual element it matches,
        // even if a later expected element needed it more.
        let c = comparator();
        let expected = json!([{"id": "$notEmpty()"}, {"id": 1}]);
        let actual = json!([{"id": 1}, {"id": 2}]);
        let errors = c.compare(&expected, &actual, &unordered());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "values do not match");
    }

    #[test]
    fn test_map_missing_key_and_extra_fields() {
        let c = comparator();
        let errors = c.compare(&json!({"a": 1, "b": 2}), &json!({"a": 1}), &CompareParams::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "key is missing");
        assert_eq!(errors[0].expected, "b");
        assert_eq!(errors[0].actual, "<missing>");

        assert!(c.compare(&json!({"a": 1}), &json!({"a": 1, "b": 2}), &CompareParams::default()).is_empty());
        let strict = CompareParams {
            disallow_extra_fields: Some(true),
            ..Default::default()
        };
        let errors = c.compare(&json!({"a": 1}), &json!({"a": 1, "b": 2}), &strict);
        assert_eq!(errors[0].message, "map lengths do not match");
    }

    #[test]
    fn test_fail_fast_stops_at_first_error() {
        let c = comparator();
        let params = CompareParams {
            fail_fast: Some(true),
            ..Default::default()
        };
        let errors = c.compare(&json!({"a": 1, "b": 2, "c": 3}), &json!({"a": 0, "b": 0, "c": 0}), &params);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "$.a");
    }

    #[test]
    fn test_ignore_values() {
        let params = CompareParams {
            ignore_values: Some(true),
            ..Default::default()
        };
        let c = comparator();
        assert!(c.compare(&json!({"a": 1, "b": "x"}), &json!({"a": 2, "b": "y"}), &params).is_empty());
        assert_eq!(c.compare(&json!({"a": 1}), &json!({"a": "1"}), &params).len(), 1);
    }

    #[test]
    fn test_ignore_values_applies_to_matchers() {
        let params = CompareParams {
            ignore_values: Some(true),
            ..Default::default()
        };
        let c = comparator();
        assert!(c
            .compare(&json!({"a": "$matchRegexp(^x$)"}), &json!({"a": "y"}), &params)
            .is_empty());
        assert!(c
            .compare(&json!({"a": "$notEmpty"}), &json!({"a": ""}), &params)
            .is_empty());

        let strict = CompareParams::default();
        assert_eq!(
            c.compare(&json!({"a": "$matchRegexp(^x$)"}), &json!({"a": "y"}), &strict).len(),
            1
        );
        assert_eq!(c.compare(&json!({"a": "$notEmpty"}), &json!({"a": ""}), &strict).len(), 1);
    }

    #[test]
    fn test_regex_leaf() {
        let c = comparator();
        let expected = json!(r"$matchRegexp(^\d+$)");
        let p = CompareParams::default();
        assert!(c.compare(&expected, &json!(42), &p).is_empty());
        assert!(c.compare(&expected, &json!(42.0), &p).is_empty());
        assert!(c.compare(&expected, &json!("42"), &p).is_empty());

        let errors = c.compare(&expected, &json!("x42"), &p);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "value does not match regex");

        let errors = c.compare(&json!("$matchRegexp([)"), &json!("x"), &p);
        assert_eq!(errors[0].message, "can not compile regex");
    }

    #[test]
    fn test_expression_leaf() {
        let c = comparator();
        let p = CompareParams::default();
        assert!(c.compare(&json!({"id": "$notEmpty()"}), &json!({"id": 5}), &p).is_empty());
        assert!(c.compare(&json!("$oneOf('a', 'b')"), &json!("b"), &p).is_empty());
        assert!(c.compare(&json!("$intStrict"), &json!(3), &p).is_empty());

        let errors = c.compare(&json!("$oneOf('a', 'b')"), &json!("c"), &p);
        assert_eq!(errors[0].message, "values do not match by condition");
    }

    #[test]
    fn test_line_by_line() {
        let c = comparator();
        let p = CompareParams::default();
        assert!(c.compare(&json!("a \nb"), &json!("a\n b"), &p).is_empty());

        let errors = c.compare(&json!("a\nb"), &json!("a\nc"), &p);
        assert_eq!(errors[0].message, "\nlines different at line 1, expected `b`, got `c`");

        let errors = c.compare(&json!("a\nb\nc"), &json!("a\nx"), &p);
        assert_eq!(
            errors[0].message,
            "lines count differs, expected 3, got 2\nlines different at line 1, expected `b`, got `x`"
        );

        let off = CompareParams {
            line_by_line: Some(false),
            ..Default::default()
        };
        let errors = c.compare(&json!("a \nb"), &json!("a\nb"), &off);
        assert_eq!(errors[0].message, "values do not match");
    }

    #[test]
    fn test_errors_are_sorted() {
        let errors = comparator().compare(&json!({"b": 1, "a": 1}), &json!({"b": 2, "a": 2}), &CompareParams::default());
        let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        let mut sorted = rendered.clone();
        sorted.sort();
        assert_eq!(rendered, sorted);
        assert!(rendered[0].starts_with("at path $.a values do not match:"));
    }

    #[test]
    fn test_compare_json_body() {
        let c = comparator();
        let p = CompareParams::default();
        assert!(c.compare_json_body(r#"{"a":1}"#, r#"{"a":1,"b":2}"#, &p).unwrap().is_empty());
        assert!(c.compare_json_body("{oops", "{}", &p).is_err());

        let errors = c.compare_json_body("{}", "not json", &p).unwrap();
        assert_eq!(errors[0].message, "could not parse response");
    }

    #[test]
    fn test_to_test_error() {
        assert!(to_test_error("t", "a", "b", &[]).is_none());
        let errors = comparator().compare(&json!(1), &json!(2), &CompareParams::default());
        let err = to_test_error("response body differs", "1", "2", &errors).unwrap();
        assert_eq!(err.title, "response body differs");
        assert!(err.message.contains("values do not match"));
    }
}
