//! Runtime values for the cell language.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::lang::ast::{Param, Stmt};

/// A runtime value. Lists and dicts have reference semantics (aliasing
/// through assignment mutates the shared container).
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    /// Insertion-ordered association list; keys are hashable scalars.
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Range {
        start: i64,
        stop: i64,
        step: i64,
    },
    Function(Rc<FunctionValue>),
    /// A builtin function, identified by its registry name.
    Builtin(&'static str),
    /// A method on a builtin type, resolved at call time.
    BuiltinMethod {
        recv: Box<Value>,
        name: String,
    },
    /// A user function bound to an instance.
    Bound {
        recv: Box<Value>,
        func: Rc<FunctionValue>,
    },
    Class(Rc<ClassValue>),
    Instance(Rc<InstanceValue>),
    Module(Rc<ModuleValue>),
}

pub struct FunctionValue {
    pub name: String,
    pub params: Vec<Param>,
    /// Defaults evaluated at `def` time, parallel to `params`.
    pub defaults: Vec<Option<Value>>,
    pub body: Rc<Vec<Stmt>>,
}

pub struct ClassValue {
    pub name: String,
    pub attrs: FxHashMap<String, Value>,
}

pub struct InstanceValue {
    pub class: Rc<ClassValue>,
    pub attrs: RefCell<FxHashMap<String, Value>>,
}

pub struct ModuleValue {
    pub name: String,
    pub attrs: FxHashMap<String, Value>,
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(pairs: Vec<(Value, Value)>) -> Self {
        Value::Dict(Rc::new(RefCell::new(pairs)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range { .. } => "range",
            Value::Function(_) | Value::Bound { .. } => "function",
            Value::Builtin(_) | Value::BuiltinMethod { .. } => "builtin_function_or_method",
            Value::Class(_) => "type",
            Value::Instance(_) => "object",
            Value::Module(_) => "module",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.borrow().is_empty(),
            Value::Range { start, stop, step } => {
                if *step > 0 {
                    start < stop
                } else {
                    start > stop
                }
            }
            _ => true,
        }
    }

    /// Numeric view for arithmetic and comparison (bool counts as 0/1).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer view (bool counts as 0/1).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// `repr()` rendering.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => repr_str(s),
            Value::List(items) => {
                let inner: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Value::Dict(pairs) => {
                let inner: Vec<String> = pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    format!("range({start}, {stop})")
                } else {
                    format!("range({start}, {stop}, {step})")
                }
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::Builtin(name) => format!("<built-in function {name}>"),
            Value::BuiltinMethod { recv, name } => {
                format!("<built-in method {} of {} object>", name, recv.type_name())
            }
            Value::Bound { recv, func } => match recv.as_ref() {
                Value::Instance(inst) => {
                    format!("<bound method {}.{}>", inst.class.name, func.name)
                }
                _ => format!("<bound method {}>", func.name),
            },
            Value::Class(c) => format!("<class '{}'>", c.name),
            Value::Instance(inst) => format!("<{} object>", inst.class.name),
            Value::Module(m) => format!("<module '{}'>", m.name),
        }
    }

    /// `str()` rendering: like repr, except strings print raw.
    pub fn str_value(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// Whether a value can be used as a dict key.
    pub fn hashable(&self) -> bool {
        matches!(
            self,
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
            }
            (
                Value::Range {
                    start: s1,
                    stop: e1,
                    step: t1,
                },
                Value::Range {
                    start: s2,
                    stop: e2,
                    step: t2,
                },
            ) => s1 == s2 && e1 == e2 && t1 == t2,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Python-style float formatting: whole floats keep a trailing `.0`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn repr_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Convert a value to JSON for `get_var` and persistence. Non-finite floats
/// become the strings `"NaN"` / `"Infinity"` / `"-Infinity"`; functions,
/// classes and modules are not serializable.
pub fn to_json(value: &Value) -> Result<serde_json::Value, String> {
    use serde_json::Value as Json;
    match value {
        Value::None => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::from(*i)),
        Value::Float(f) => {
            if f.is_nan() {
                Ok(Json::from("NaN"))
            } else if f.is_infinite() {
                Ok(Json::from(if *f > 0.0 { "Infinity" } else { "-Infinity" }))
            } else {
                Ok(Json::from(*f))
            }
        }
        Value::Str(s) => Ok(Json::from(s.as_str())),
        Value::List(items) => items.borrow().iter().map(to_json).collect(),
        Value::Tuple(items) => items.iter().map(to_json).collect(),
        Value::Range { .. } => iter_range_values(value).iter().map(to_json).collect(),
        Value::Dict(pairs) => {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs.borrow().iter() {
                map.insert(k.str_value(), to_json(v)?);
            }
            Ok(Json::Object(map))
        }
        other => Err(format!(
            "value of type '{}' is not serializable",
            other.type_name()
        )),
    }
}

/// Convert JSON into a value for `set_var`.
pub fn from_json(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::str(s.clone()),
        Json::Array(items) => Value::list(items.iter().map(from_json).collect()),
        Json::Object(map) => Value::dict(
            map.iter()
                .map(|(k, v)| (Value::str(k.clone()), from_json(v)))
                .collect(),
        ),
    }
}

fn iter_range_values(value: &Value) -> Vec<Value> {
    match value {
        Value::Range { start, stop, step } => {
            let mut out = Vec::new();
            let mut i = *start;
            if *step > 0 {
                while i < *stop {
                    out.push(Value::Int(i));
                    i += step;
                }
            } else {
                while i > *stop {
                    out.push(Value::Int(i));
                    i += step;
                }
            }
            out
        }
        _ => Vec::new(),
    }
}
