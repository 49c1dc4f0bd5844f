//! Built-in functions for expressions and `$fn(...)` matchers

use super::Value;
use crate::error::{EvalError, EvalResult};
use rand_chacha::ChaCha20Rng;
use rand_core::RngCore;
use std::collections::HashMap;

/// A function callable from expressions
pub type NativeFn = Box<dyn Fn(&mut ChaCha20Rng, &[Value]) -> EvalResult<Value>>;

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Chloe", "Dmitri", "Elena", "Felix", "Grace", "Hugo", "Iris", "Jonas",
    "Kira", "Liam", "Maya", "Nils", "Olga", "Pavel", "Quinn", "Rosa", "Stefan", "Tara",
];

const LAST_NAMES: &[&str] = &[
    "Anders", "Baker", "Carter", "Dawson", "Evans", "Fischer", "Garcia", "Holm", "Ivanov",
    "Jensen", "Keller", "Larsen", "Moreau", "Novak", "Ortiz", "Petrov", "Quist", "Romero",
];

const WORDS: &[&str] = &[
    "amber", "birch", "cobalt", "delta", "ember", "falcon", "granite", "harbor", "indigo",
    "juniper", "kestrel", "lumen", "meadow", "nimbus", "orbit", "pebble", "quartz", "raven",
];

fn pick<'a>(rng: &mut ChaCha20Rng, items: &[&'a str]) -> &'a str {
    items[(rng.next_u32() as usize) % items.len()]
}

/// Truthiness used by `empty`, `notEmpty` and `any`
pub fn is_empty(value: &Value) -> bool {
    value.is_empty()
}

/// The default function registry
pub fn default_functions() -> HashMap<String, NativeFn> {
    let mut functions: HashMap<String, NativeFn> = HashMap::new();

    functions.insert(
        "randName".into(),
        Box::new(|rng, _| {
            let first = pick(rng, FIRST_NAMES);
            let last = pick(rng, LAST_NAMES);
            Ok(Value::Str(format!("{} {}", first, last)))
        }),
    );
    functions.insert(
        "someName".into(),
        Box::new(|_, _| Ok(Value::Str("Donny".to_string()))),
    );
    functions.insert(
        "getInput".into(),
        Box::new(|_, args| {
            args.first().cloned().ok_or_else(|| EvalError::Function {
                name: "getInput".to_string(),
                reason: "expects one argument".to_string(),
            })
        }),
    );
    functions.insert(
        "randFirstName".into(),
        Box::new(|rng, _| Ok(Value::Str(pick(rng, FIRST_NAMES).to_string()))),
    );
    functions.insert(
        "randInt32".into(),
        Box::new(|rng, _| Ok(Value::Int(i64::from(rng.next_u32() as i32)))),
    );
    functions.insert(
        "randInt64".into(),
        Box::new(|rng, _| Ok(Value::Int(rng.next_u64() as i64))),
    );
    functions.insert(
        "randFloat32".into(),
        Box::new(|rng, _| Ok(Value::Float(f64::from(rng.next_u32() as f32 / u32::MAX as f32)))),
    );
    functions.insert(
        "randFloat64".into(),
        Box::new(|rng, _| Ok(Value::Float((rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64))),
    );
    functions.insert(
        "randLogin".into(),
        Box::new(|rng, _| {
            let word = pick(rng, WORDS);
            Ok(Value::Str(format!("{}{}", word, rng.next_u32() as i32)))
        }),
    );
    functions.insert(
        "notEmpty".into(),
        Box::new(|_, args| Ok(Value::Bool(!args.is_empty() && !args.iter().any(is_empty)))),
    );
    functions.insert(
        "any".into(),
        Box::new(|_, args| Ok(Value::Bool(!args.is_empty() && !args.iter().any(is_empty)))),
    );
    functions.insert(
        "intStrict".into(),
        Box::new(|_, args| Ok(Value::Bool(matches!(args.first(), Some(Value::Int(_)))))),
    );
    functions.insert(
        "num".into(),
        Box::new(|_, args| {
            let numeric = match args.first() {
                Some(Value::Int(_) | Value::Float(_)) => true,
                Some(Value::Str(s)) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            };
            Ok(Value::Bool(numeric))
        }),
    );
    functions.insert(
        "empty".into(),
        Box::new(|_, args| Ok(Value::Bool(args.iter().all(is_empty)))),
    );
    functions.insert(
        "oneOf".into(),
        Box::new(|_, args| {
            let Some((actual, candidates)) = args.split_last() else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(candidates.iter().any(|c| c.loose_eq(actual))))
        }),
    );

    functions
}
