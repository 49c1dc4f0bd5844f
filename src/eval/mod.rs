//! Embedded expression language
//!
//! Evaluates `$(...)` expressions found in text and the `$fn(...)` matchers used
//! by the comparator. The language is small on purpose: literals, lists,
//! arithmetic, comparison and boolean operators, a ternary, and calls into a
//! fixed registry of named functions.

pub mod functions;
pub mod parser;

pub use functions::{default_functions, NativeFn};
pub use parser::{parse, BinaryOp, Expr, UnaryOp};

use crate::error::{EvalError, EvalResult};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

/// Seed for the random value generators, fixed so runs are reproducible
pub const DEFAULT_SEED: u64 = 0;

/// A runtime value of the expression language
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Whether the value is "empty" in the sense of the `empty`/`notEmpty` functions
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Loose equality: numbers compare by value regardless of int/float
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.loose_eq(w)).unwrap_or(false))
            }
            _ => self == other,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

/// Render a float, dropping the decimal point when it holds an integral value
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\$([A-Za-z_][A-Za-z0-9_]*)(?:\((.*)\))?$").expect("valid marker regex")
    })
}

/// Expression evaluator with a function registry and a parse cache
pub struct Evaluator {
    functions: HashMap<String, NativeFn>,
    rng: RefCell<ChaCha20Rng>,
    cache: RefCell<HashMap<String, Rc<Expr>>>,
}

impl Evaluator {
    /// Create an evaluator with the default function registry
    pub fn new() -> Self {
        Evaluator {
            functions: default_functions(),
            rng: RefCell::new(ChaCha20Rng::seed_from_u64(DEFAULT_SEED)),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Reseed the random generators
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.borrow_mut() = ChaCha20Rng::seed_from_u64(seed);
        self
    }

    /// Add or replace a function in the registry
    pub fn with_function(mut self, name: impl Into<String>, function: NativeFn) -> Self {
        self.register(name, function);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, function: NativeFn) {
        self.functions.insert(name.into(), function);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Parse an expression, reusing a previous parse of the same text
    pub fn parse(&self, src: &str) -> EvalResult<Rc<Expr>> {
        if let Some(expr) = self.cache.borrow().get(src) {
            return Ok(Rc::clone(expr));
        }
        let expr = Rc::new(parse(src)?);
        self.cache
            .borrow_mut()
            .insert(src.to_string(), Rc::clone(&expr));
        Ok(expr)
    }

    /// Parse and evaluate an expression
    pub fn evaluate(&self, src: &str) -> EvalResult<Value> {
        let expr = self.parse(src)?;
        self.eval_expr(&expr)
    }

    /// Replace every `$(...)` expression in `text` with its rendered value.
    ///
    /// A `{{ }}` wrapped directly around the expression is consumed with it.
    /// Expressions that fail to evaluate are left in place.
    pub fn interpolate(&self, text: &str) -> String {
        if !text.contains("$(") {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("$(") {
            let Some(close) = find_closing_paren(&rest[start + 1..]).map(|i| start + 1 + i) else {
                break;
            };
            let inner = &rest[start + 2..close];

            let mut prefix_end = start;
            let mut suffix_start = close + 1;
            if rest[..start].ends_with("{{") && rest[suffix_start..].starts_with("}}") {
                prefix_end = start - 2;
                suffix_start += 2;
            }

            out.push_str(&rest[..prefix_end]);
            match self.evaluate(inner) {
                Ok(value) => out.push_str(&value.to_string()),
                Err(_) => out.push_str(&rest[prefix_end..suffix_start]),
            }
            rest = &rest[suffix_start..];
        }
        out.push_str(rest);
        out
    }

    /// Split a `$fn(args)` / `$fn` matcher into its function name and argument text.
    ///
    /// Only names present in the registry are markers; `matchRegexp` never is.
    pub fn parse_marker<'a>(&self, text: &'a str) -> Option<(&'a str, &'a str)> {
        let caps = marker_regex().captures(text)?;
        let name = caps.get(1)?.as_str();
        if name == "matchRegexp" || !self.has_function(name) {
            return None;
        }
        let args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        Some((name, args))
    }

    /// Evaluate a matcher, passing `actual` as the final call argument
    pub fn eval_marker(&self, name: &str, args: &str, actual: Value) -> EvalResult<Value> {
        let call = self.parse(&format!("{}({})", name, args))?;
        match call.as_ref() {
            Expr::Call { name, args } => {
                let mut values = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                values.push(actual);
                self.call(name, &values)
            }
            _ => Err(EvalError::Type(format!("'{}' is not a function call", name))),
        }
    }

    fn call(&self, name: &str, args: &[Value]) -> EvalResult<Value> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        let mut rng = self.rng.borrow_mut();
        function(&mut *rng, args)
    }

    pub fn eval_expr(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<EvalResult<Vec<_>>>()?,
            )),
            Expr::Ident(name) => Err(EvalError::UnknownIdentifier(name.clone())),
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(name, &values)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| EvalError::Type(format!("cannot negate {}: integer overflow", n))),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (op, value) => Err(EvalError::Type(format!(
                        "cannot apply {:?} to {}",
                        op,
                        value.type_name()
                    ))),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => match self.eval_expr(cond)? {
                Value::Bool(true) => self.eval_expr(then),
                Value::Bool(false) => self.eval_expr(otherwise),
                other => Err(EvalError::Type(format!(
                    "ternary condition must be bool, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> EvalResult<Value> {
        // && and || short-circuit
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = expect_bool(self.eval_expr(left)?, op)?;
            if (op == BinaryOp::And && !lhs) || (op == BinaryOp::Or && lhs) {
                return Ok(Value::Bool(lhs));
            }
            return Ok(Value::Bool(expect_bool(self.eval_expr(right)?, op)?));
        }

        let lhs = self.eval_expr(left)?;
        let rhs = self.eval_expr(right)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
            BinaryOp::NotEq => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &lhs, &rhs),
            BinaryOp::In => match &rhs {
                Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.loose_eq(&lhs)))),
                Value::Map(entries) => Ok(Value::Bool(entries.contains_key(&lhs.to_string()))),
                Value::Str(haystack) => Ok(Value::Bool(haystack.contains(&lhs.to_string()))),
                other => Err(EvalError::Type(format!("cannot search in {}", other.type_name()))),
            },
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                arithmetic(op, lhs, rhs)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("Evaluator").field("functions", &names).finish()
    }
}

/// Byte offset (within `s`, which starts at `(`) of the matching `)`
fn find_closing_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn expect_bool(value: Value, op: BinaryOp) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::Type(format!(
            "{:?} expects bool operands, got {}",
            op,
            other.type_name()
        ))),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(EvalError::Type(format!(
                    "cannot compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    match (op, &lhs, &rhs) {
        (BinaryOp::Add, Value::Str(_), _) | (BinaryOp::Add, _, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", lhs, rhs)))
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (_, Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let checked = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    match a.checked_rem(b) {
                        Some(0) => a.checked_div(b),
                        Some(_) => return Ok(Value::Float(a as f64 / b as f64)),
                        None => None,
                    }
                }
                _ => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.checked_rem(b)
                }
            };
            match checked {
                Some(n) => Ok(Value::Int(n)),
                None => float_arithmetic(op, a as f64, b as f64),
            }
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => float_arithmetic(op, a, b),
            _ => Err(EvalError::Type(format!(
                "cannot apply {:?} to {} and {}",
                op,
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> EvalResult<Value> {
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        _ => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
    }))
}
