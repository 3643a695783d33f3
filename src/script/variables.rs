//! Typed variable registry: the bridge between rule text and host state.
//!
//! Each identifier maps to a declared [`VariableType`] and a [`Bound`]
//! value, either a fixed constant or an accessor closure that reads live
//! host state on every lookup.  Reads are two-phase: the evaluator first
//! asks [`VariableStorage::var_type`] to pick an operator branch, then
//! fetches the operand with [`VariableStorage::get`] coerced to the type
//! that branch needs.
//!
//! Lookups never fail.  An unbound identifier is parsed as a literal of
//! the requested type (so `"5"` or `"eco"` fetch uniformly with bound
//! names), and anything that still cannot be produced yields the type's
//! default.  [`VariableStorage::try_get`] exposes the same lookup without
//! the default for callers that need to know.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use super::lexer::{tokenize_array_body, unquote};

/// Value kinds understood by the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    Int,
    Bool,
    Double,
    String,
    UInt64,
    /// Array of strings.
    Array,
    Unknown,
}

/// A native value as produced by a constant or an accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    UInt64(u64),
    Array(Vec<String>),
}

impl Value {
    pub fn variable_type(&self) -> VariableType {
        match self {
            Self::Int(_) => VariableType::Int,
            Self::Bool(_) => VariableType::Bool,
            Self::Double(_) => VariableType::Double,
            Self::String(_) => VariableType::String,
            Self::UInt64(_) => VariableType::UInt64,
            Self::Array(_) => VariableType::Array,
        }
    }

    /// Convert to the declared type of a binding.
    pub fn coerce(&self, ty: VariableType) -> Option<Self> {
        match ty {
            VariableType::Int => i64::from_value(self).map(Self::Int),
            VariableType::Bool => bool::from_value(self).map(Self::Bool),
            VariableType::Double => f64::from_value(self).map(Self::Double),
            VariableType::String => String::from_value(self).map(Self::String),
            VariableType::UInt64 => u64::from_value(self).map(Self::UInt64),
            VariableType::Array => Vec::<String>::from_value(self).map(Self::Array),
            VariableType::Unknown => Some(self.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Array(v) => f.write_str(&v.join(",")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::Array(v)
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Rust types a variable can be read as.
///
/// | from \ to  | bool      | numeric     | String      | Vec<String>  |
/// |------------|-----------|-------------|-------------|--------------|
/// | Bool       | -         | 0 / 1       | true/false  | singleton    |
/// | numeric    | != 0      | cast        | decimal     | singleton    |
/// | String     | parse     | parse       | -           | `[..]` or singleton |
/// | Array      | non-empty | one element | comma-join  | -            |
pub trait FromValue: Sized + Default {
    const TYPE: VariableType;

    fn from_value(value: &Value) -> Option<Self>;

    /// Interpret an identifier's own text as a literal.
    fn parse_literal(text: &str) -> Option<Self>;
}

impl FromValue for bool {
    const TYPE: VariableType = VariableType::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::UInt64(v) => Some(*v != 0),
            Value::Double(v) => Some(*v != 0.0),
            Value::String(s) => Self::parse_literal(s),
            Value::Array(a) => Some(!a.is_empty()),
        }
    }

    fn parse_literal(text: &str) -> Option<Self> {
        match unquote(text.trim()) {
            "true" | "TRUE" => Some(true),
            "false" | "FALSE" => Some(false),
            other => other.parse::<f64>().ok().map(|v| v != 0.0),
        }
    }
}

impl FromValue for f64 {
    const TYPE: VariableType = VariableType::Double;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt64(v) => Some(*v as f64),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::String(s) => Self::parse_literal(s),
            Value::Array(a) => single(a).and_then(Self::parse_literal),
        }
    }

    fn parse_literal(text: &str) -> Option<Self> {
        match unquote(text.trim()) {
            "true" | "TRUE" => Some(1.0),
            "false" | "FALSE" => Some(0.0),
            other => other.parse().ok(),
        }
    }
}

impl FromValue for i64 {
    const TYPE: VariableType = VariableType::Int;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            Value::Double(v) => Some(*v as i64),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(i64::from(*v)),
            Value::String(s) => Self::parse_literal(s),
            Value::Array(a) => single(a).and_then(Self::parse_literal),
        }
    }

    fn parse_literal(text: &str) -> Option<Self> {
        let text = unquote(text.trim());
        text.parse()
            .ok()
            .or_else(|| f64::parse_literal(text).map(|v| v as i64))
    }
}

impl FromValue for u64 {
    const TYPE: VariableType = VariableType::UInt64;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UInt64(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Double(v) if *v >= 0.0 => Some(*v as u64),
            Value::Double(_) => None,
            Value::Bool(v) => Some(u64::from(*v)),
            Value::String(s) => Self::parse_literal(s),
            Value::Array(a) => single(a).and_then(Self::parse_literal),
        }
    }

    fn parse_literal(text: &str) -> Option<Self> {
        let text = unquote(text.trim());
        text.parse().ok().or_else(|| {
            f64::parse_literal(text)
                .filter(|v| *v >= 0.0)
                .map(|v| v as u64)
        })
    }
}

impl FromValue for String {
    const TYPE: VariableType = VariableType::String;

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.to_string())
    }

    fn parse_literal(text: &str) -> Option<Self> {
        Some(unquote(text).to_string())
    }
}

impl FromValue for Vec<String> {
    const TYPE: VariableType = VariableType::Array;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(a) => Some(a.clone()),
            Value::String(s) => Self::parse_literal(s),
            other => Some(vec![other.to_string()]),
        }
    }

    fn parse_literal(text: &str) -> Option<Self> {
        if text.trim_start().starts_with('[') {
            tokenize_array_body(text).ok()
        } else {
            Some(vec![unquote(text).to_string()])
        }
    }
}

fn single(items: &[String]) -> Option<&str> {
    match items {
        [only] => Some(only.as_str()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Zero-argument closure reading live host state.
pub type Accessor = Box<dyn Fn() -> Value>;

/// How a variable obtains its value.
pub enum Bound {
    Constant(Value),
    Accessor(Accessor),
}

impl Bound {
    pub fn accessor<T: Into<Value>>(f: impl Fn() -> T + 'static) -> Self {
        Self::Accessor(Box::new(move || f().into()))
    }

    fn read(&self) -> Value {
        match self {
            Self::Constant(v) => v.clone(),
            Self::Accessor(f) => f(),
        }
    }
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Self::Accessor(_) => f.write_str("Accessor(..)"),
        }
    }
}

#[derive(Debug)]
struct Variable {
    ty: VariableType,
    bound: Bound,
}

/// Flat identifier → variable table.  Last write wins.
#[derive(Debug, Default)]
pub struct VariableStorage {
    vars: HashMap<String, Variable>,
}

impl VariableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `id`.  Reads are coerced to `ty`.
    pub fn set(&mut self, ty: VariableType, id: impl Into<String>, bound: Bound) {
        self.vars.insert(id.into(), Variable { ty, bound });
    }

    /// Bind `id` to a fixed value; the declared type follows the value.
    pub fn set_constant(&mut self, id: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        self.set(value.variable_type(), id, Bound::Constant(value));
    }

    /// Bind `id` to a closure evaluated on every read.
    pub fn set_accessor<T, F>(&mut self, id: impl Into<String>, accessor: F)
    where
        T: FromValue + Into<Value>,
        F: Fn() -> T + 'static,
    {
        self.set(T::TYPE, id, Bound::accessor(accessor));
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.vars.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vars.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Declared type of `id`, or `Unknown` when unbound.
    pub fn var_type(&self, id: &str) -> VariableType {
        self.vars.get(id).map_or(VariableType::Unknown, |v| v.ty)
    }

    /// Current native value of a bound identifier, coerced to its
    /// declared type.
    pub fn value(&self, id: &str) -> Option<Value> {
        let var = self.vars.get(id)?;
        var.bound.read().coerce(var.ty)
    }

    /// Read `id` as `T`: bound value first, then `id` parsed as a literal.
    pub fn try_get<T: FromValue>(&self, id: &str) -> Option<T> {
        if self.vars.contains_key(id) {
            self.value(id).and_then(|v| T::from_value(&v))
        } else {
            T::parse_literal(id)
        }
    }

    /// Read `id` as `T`, falling back to `T::default()`.
    pub fn get<T: FromValue>(&self, id: &str) -> T {
        self.try_get(id).unwrap_or_else(|| {
            debug!("VariableStorage: '{}' unresolved as {:?}, using default", id, T::TYPE);
            T::default()
        })
    }
}
