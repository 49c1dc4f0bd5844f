//! Variable scope and template resolution
//!
//! Text is resolved in two passes: `{{$name}}` placeholders are replaced with
//! the variable's value, then every `$(...)` expression left in the result is
//! evaluated. Each `apply` runs both passes exactly once.

use crate::error::{VariableError, VariableResult};
use crate::eval::Evaluator;
use crate::persistent::Persistent;
use regex::{Captures, Regex};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Path value that binds the whole response body
pub const WHOLE_BODY: &str = "*";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\$(\w+)\s*\}\}").expect("valid placeholder regex"))
}

/// Number of template markers in `value`
fn marker_count(value: &str) -> usize {
    value.matches("{{").count() + value.matches("$(").count()
}

/// Whether a variable name is written in upper case (`API_TOKEN`)
fn is_env_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic()) && name.to_uppercase() == name
}

/// Transient and persistent variables of one session
pub struct Variables {
    transient: HashMap<String, String>,
    persistent: Box<dyn Persistent>,
    evaluator: Rc<Evaluator>,
    all_persistent: bool,
}

impl Variables {
    pub fn new(evaluator: Rc<Evaluator>, persistent: Box<dyn Persistent>, all_persistent: bool) -> Self {
        Variables {
            transient: HashMap::new(),
            persistent,
            evaluator,
            all_persistent,
        }
    }

    pub fn evaluator(&self) -> &Rc<Evaluator> {
        &self.evaluator
    }

    /// Replace `{{$name}}` placeholders only
    pub fn substitute(&self, text: &str) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }
        placeholder_regex()
            .replace_all(text, |caps: &Captures| self.get(&caps[1]))
            .into_owned()
    }

    /// Resolve placeholders, then expressions
    pub fn apply(&self, text: &str) -> String {
        let substituted = self.substitute(text);
        self.evaluator.interpolate(&substituted)
    }

    /// Resolve `value` and store it under `name`, returning the stored value
    pub fn set(&mut self, name: &str, value: &str) -> VariableResult<String> {
        if self.all_persistent {
            return self.set_persistent(name, value);
        }
        let resolved = self.apply(value);
        self.mirror_env(name, &resolved);
        debug!("Set variable {} = {}", name, resolved);
        self.transient.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Resolve `value` and write it to the persistent store
    pub fn set_persistent(&mut self, name: &str, value: &str) -> VariableResult<String> {
        let resolved = self.apply(value);
        self.mirror_env(name, &resolved);
        debug!("Set persistent variable {} = {}", name, resolved);
        self.persistent.set(name, &resolved)?;
        Ok(resolved)
    }

    fn mirror_env(&self, name: &str, value: &str) {
        if is_env_name(name) {
            env::set_var(name, value);
        }
    }

    /// Keys in the order `set_all` assigns them: fewest template markers first
    fn assignment_order(mapping: &BTreeMap<String, String>) -> Vec<&String> {
        let mut keys: Vec<&String> = mapping.keys().collect();
        keys.sort_by_key(|k| (marker_count(&mapping[*k]), (*k).clone()));
        keys
    }

    /// Assign every entry, plain values before templated ones
    pub fn set_all(&mut self, mapping: &BTreeMap<String, String>) -> VariableResult<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for key in Self::assignment_order(mapping) {
            let value = self.set(key, &mapping[key])?;
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    pub fn set_all_persistent(
        &mut self,
        mapping: &BTreeMap<String, String>,
    ) -> VariableResult<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for key in Self::assignment_order(mapping) {
            let value = self.set_persistent(key, &mapping[key])?;
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }

    /// Transient value, else non-empty persistent value, else environment, else empty
    pub fn get(&self, name: &str) -> String {
        if let Some(value) = self.transient.get(name) {
            return value.clone();
        }
        match self.persistent.get(name) {
            Ok(Some(value)) if !value.is_empty() => return value,
            Ok(_) => {}
            Err(err) => warn!("Failed to read persistent variable {}: {}", name, err),
        }
        env::var(name).unwrap_or_default()
    }

    /// Forget transient variables
    pub fn reset(&mut self) {
        self.transient.clear();
    }

    pub fn reset_persistent(&mut self) -> VariableResult<()> {
        self.persistent.reset()
    }

    /// Resolve `mapping` (name -> JSON path) against a response body.
    ///
    /// Names and paths are applied first. The path `*` binds the whole body.
    pub fn from_json(&self, mapping: &BTreeMap<String, String>, body: &str) -> VariableResult<BTreeMap<String, String>> {
        let mut parsed: Option<Option<Json>> = None;
        let mut vars = BTreeMap::new();

        for (name, path) in mapping {
            let name = self.apply(name);
            let path = self.apply(path);
            if path == WHOLE_BODY {
                vars.insert(name, body.to_string());
                continue;
            }

            let json = parsed.get_or_insert_with(|| serde_json::from_str(body).ok());
            let value = json
                .as_ref()
                .and_then(|json| lookup_path(json, &path))
                .ok_or_else(|| VariableError::PathNotFound {
                    path: path.clone(),
                    body: body.to_string(),
                })?;
            vars.insert(name, value);
        }
        Ok(vars)
    }

    /// Resolve `mapping` against `body` and store the results
    pub fn extract(&mut self, mapping: &BTreeMap<String, String>, body: &str, persistent: bool) -> VariableResult<BTreeMap<String, String>> {
        let found = self.from_json(mapping, body)?;
        for (name, value) in &found {
            // Values taken from a response are stored as-is
            self.mirror_env(name, value);
            if persistent || self.all_persistent {
                self.persistent.set(name, value)?;
            } else {
                self.transient.insert(name.clone(), value.clone());
            }
            debug!("Extracted variable {} = {}", name, value);
        }
        Ok(found)
    }
}

impl fmt::Debug for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variables")
            .field("transient", &self.transient)
            .field("all_persistent", &self.all_persistent)
            .finish()
    }
}

/// Look up a dotted path (`data.items.0.id`, `items.#`) in a JSON value.
///
/// `\.` escapes a literal dot in a key.
pub fn lookup_path(json: &Json, path: &str) -> Option<String> {
    let mut current = json;
    for segment in split_path(path) {
        current = match current {
            Json::Object(map) => map.get(&segment)?,
            Json::Array(items) if segment == "#" => return Some(items.len().to_string()),
            Json::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(render_json(current))
}

fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut segment = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    segment.push(next);
                }
            }
            '.' => segments.push(std::mem::take(&mut segment)),
            _ => segment.push(c),
        }
    }
    segments.push(segment);
    segments
}

fn render_json(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent::MemoryStore;

    fn vars() -> Variables {
        Variables::new(Rc::new(Evaluator::new()), Box::new(MemoryStore::new()), false)
    }

    fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_substitutes_and_evaluates() {
        let mut vv = vars();
        vv.set("a", "v").unwrap();
        assert_eq!(vv.apply("{{$a}}"), "v");
        assert_eq!(vv.apply("{{ $a }}-{{$a}}"), "v-v");
        assert_eq!(vv.apply("plain text"), "plain text");
        vv.set("n", "4").unwrap();
        assert_eq!(vv.apply("$({{$n}} * 2)"), "8");
    }

    #[test]
    fn test_apply_is_single_pass() {
        let mut vv = vars();
        vv.set("inner", "value").unwrap();
        // Stored values are resolved on set, so nested references do not linger
        vv.set("outer", "{{$inner}}").unwrap();
        assert_eq!(vv.apply("{{$outer}}"), "value");
    }

    #[test]
    fn test_unknown_variable_is_empty() {
        let vv = vars();
        assert_eq!(vv.apply("[{{$declarate_test_nope}}]"), "[]");
    }

    #[test]
    fn test_get_falls_back_to_persistent_then_env() {
        let mut vv = vars();
        vv.set_persistent("saved", "p").unwrap();
        assert_eq!(vv.get("saved"), "p");

        vv.set("saved", "t").unwrap();
        assert_eq!(vv.get("saved"), "t");

        env::set_var("DECLARATE_TEST_FROM_ENV", "e");
        assert_eq!(vv.get("DECLARATE_TEST_FROM_ENV"), "e");
        env::remove_var("DECLARATE_TEST_FROM_ENV");
    }

    #[test]
    fn test_uppercase_names_are_mirrored_to_env() {
        let mut vv = vars();
        vv.set("DECLARATE_TEST_MIRROR", "yes").unwrap();
        assert_eq!(env::var("DECLARATE_TEST_MIRROR").unwrap(), "yes");
        env::remove_var("DECLARATE_TEST_MIRROR");

        vv.set("lower_name", "no").unwrap();
        assert!(env::var("lower_name").is_err());
    }

    #[test]
    fn test_all_persistent_mode() {
        let mut vv = Variables::new(Rc::new(Evaluator::new()), Box::new(MemoryStore::new()), true);
        vv.set("id", "1").unwrap();
        vv.reset();
        assert_eq!(vv.get("id"), "1");
    }

    #[test]
    fn test_set_all_orders_plain_values_first() {
        let mut vv = vars();
        let resolved = vv.set_all(&mapping(&[("b", "{{$a}}-x"), ("a", "1")])).unwrap();
        assert_eq!(resolved, mapping(&[("a", "1"), ("b", "1-x")]));
    }

    #[test]
    fn test_set_all_orders_by_marker_count() {
        let mut vv = vars();
        let resolved = vv
            .set_all(&mapping(&[("a", "1"), ("b", "{{$a}}"), ("c", "{{$b}}{{$b}}")]))
            .unwrap();
        assert_eq!(resolved["b"], "1");
        assert_eq!(resolved["c"], "11");
    }

    #[test]
    fn test_from_json() {
        let vv = vars();
        let found = vv
            .from_json(&mapping(&[("id", "data.id")]), r#"{"data":{"id":7}}"#)
            .unwrap();
        assert_eq!(found, mapping(&[("id", "7")]));

        let err = vv
            .from_json(&mapping(&[("id", "data.missing")]), r#"{"data":{}}"#)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("data.missing"));
        assert!(msg.contains(r#"{"data":{}}"#));
    }

    #[test]
    fn test_from_json_whole_body_and_templated_path() {
        let mut vv = vars();
        vv.set("field", "name").unwrap();
        let body = r#"{"name":"bob","items":[{"v":1},{"v":2}]}"#;
        let found = vv
            .from_json(
                &mapping(&[("all", "*"), ("who", "{{$field}}"), ("second", "items.1.v"), ("count", "items.#")]),
                body,
            )
            .unwrap();
        assert_eq!(found["all"], body);
        assert_eq!(found["who"], "bob");
        assert_eq!(found["second"], "2");
        assert_eq!(found["count"], "2");

        let found = vv.from_json(&mapping(&[("raw", "*")]), "not json").unwrap();
        assert_eq!(found["raw"], "not json");
    }

    #[test]
    fn test_lookup_path_escaped_dot_and_objects() {
        let json: Json = serde_json::from_str(r#"{"a.b":{"c":[1,2]}}"#).unwrap();
        assert_eq!(lookup_path(&json, r"a\.b.c").as_deref(), Some("[1,2]"));
        assert_eq!(lookup_path(&json, "a.b"), None);
    }

    #[test]
    fn test_extract_stores_values() {
        let mut vv = vars();
        vv.extract(&mapping(&[("token", "auth.token")]), r#"{"auth":{"token":"t1"}}"#, false)
            .unwrap();
        assert_eq!(vv.get("token"), "t1");

        vv.extract(&mapping(&[("kept", "auth.token")]), r#"{"auth":{"token":"t2"}}"#, true)
            .unwrap();
        vv.reset();
        assert_eq!(vv.get("kept"), "t2");
        assert_eq!(vv.get("token"), "");
    }
}
