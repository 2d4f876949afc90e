//! Builtin functions, importable modules, and methods on builtin types.
//!
//! The builtin name list is the closed set the symbol extractor excludes
//! from `used` sets — it is exported from here so the analyzer always sees
//! the runtime's actual registry rather than a hard-coded copy.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::RuntimeError;
use super::eval::{Interpreter, compare_lt, iterate};
use super::value::{ModuleValue, Value};

/// Registry of builtin function names.
pub const BUILTIN_NAMES: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "divmod", "enumerate", "float", "int", "isinstance",
    "len", "list", "max", "min", "pow", "print", "range", "repr", "reversed", "round", "sorted",
    "str", "sum", "tuple", "type", "zip",
];

/// The builtin names visible to the symbol extractor.
pub fn names() -> &'static [&'static str] {
    BUILTIN_NAMES
}

/// Resolve a builtin function by name.
pub fn lookup(name: &str) -> Option<Value> {
    BUILTIN_NAMES
        .iter()
        .find(|&&n| n == name)
        .map(|&n| Value::Builtin(n))
}

/// Importable modules. Only `math` for now; unknown names produce
/// `ModuleNotFoundError` at the import site.
pub fn import_module(name: &str) -> Option<Value> {
    if name != "math" {
        return None;
    }
    let mut attrs = FxHashMap::default();
    attrs.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
    attrs.insert("e".to_string(), Value::Float(std::f64::consts::E));
    for f in [
        "sqrt", "floor", "ceil", "pow", "sin", "cos", "tan", "log", "exp", "fabs",
    ] {
        attrs.insert(f.to_string(), Value::Builtin(math_fn_name(f)));
    }
    Some(Value::Module(Rc::new(ModuleValue {
        name: "math".to_string(),
        attrs,
    })))
}

fn math_fn_name(short: &str) -> &'static str {
    match short {
        "sqrt" => "math.sqrt",
        "floor" => "math.floor",
        "ceil" => "math.ceil",
        "pow" => "math.pow",
        "sin" => "math.sin",
        "cos" => "math.cos",
        "tan" => "math.tan",
        "log" => "math.log",
        "exp" => "math.exp",
        "fabs" => "math.fabs",
        _ => unreachable!("unknown math function"),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(RuntimeError::type_error(format!(
            "{name}() takes {expected} argument(s) but {} were given",
            args.len()
        )));
    }
    Ok(())
}

fn number_arg(name: &str, arg: &Value) -> Result<f64, RuntimeError> {
    arg.as_number().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}() argument must be a number, not '{}'",
            arg.type_name()
        ))
    })
}

/// Call a builtin function by registry name.
pub fn call(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    if let Some(short) = name.strip_prefix("math.") {
        return call_math(short, &args);
    }

    match name {
        "print" => {
            let text: Vec<String> = args.iter().map(Value::str_value).collect();
            interp.write_output(&text.join(" "));
            interp.write_output("\n");
            Ok(Value::None)
        }
        "len" => {
            arity("len", &args, 1, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(pairs) => pairs.borrow().len(),
                Value::Range { .. } => iterate(&args[0])?.len(),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(n as i64))
        }
        "range" => {
            arity("range", &args, 1, 3)?;
            let ints: Vec<i64> = args
                .iter()
                .map(|a| {
                    a.as_int().ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            a.type_name()
                        ))
                    })
                })
                .collect::<Result<_, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!(),
            };
            if step == 0 {
                return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range { start, stop, step })
        }
        "abs" => {
            arity("abs", &args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                other => Err(RuntimeError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "round" => {
            arity("round", &args, 1, 2)?;
            let x = number_arg("round", &args[0])?;
            match args.get(1) {
                None => Ok(Value::Int(x.round() as i64)),
                Some(nd) => {
                    let digits = nd.as_int().ok_or_else(|| {
                        RuntimeError::type_error("round() second argument must be an integer")
                    })?;
                    let factor = 10f64.powi(digits as i32);
                    Ok(Value::Float((x * factor).round() / factor))
                }
            }
        }
        "min" | "max" => {
            let items = if args.len() == 1 {
                iterate(&args[0])?
            } else {
                args.clone()
            };
            if items.is_empty() {
                return Err(RuntimeError::value_error(format!(
                    "{name}() arg is an empty sequence"
                )));
            }
            let mut best = items[0].clone();
            for item in &items[1..] {
                let replace = if name == "min" {
                    compare_lt(item, &best)?
                } else {
                    compare_lt(&best, item)?
                };
                if replace {
                    best = item.clone();
                }
            }
            Ok(best)
        }
        "sum" => {
            arity("sum", &args, 1, 2)?;
            let items = iterate(&args[0])?;
            let mut total = match args.get(1) {
                Some(v) => v.clone(),
                None => Value::Int(0),
            };
            for item in items {
                total = numeric_add(&total, &item)?;
            }
            Ok(total)
        }
        "sorted" => {
            arity("sorted", &args, 1, 1)?;
            let mut items = iterate(&args[0])?;
            sort_values(&mut items)?;
            Ok(Value::list(items))
        }
        "reversed" => {
            arity("reversed", &args, 1, 1)?;
            let mut items = iterate(&args[0])?;
            items.reverse();
            Ok(Value::list(items))
        }
        "enumerate" => {
            arity("enumerate", &args, 1, 2)?;
            let start = match args.get(1) {
                Some(v) => v.as_int().ok_or_else(|| {
                    RuntimeError::type_error("enumerate() start must be an integer")
                })?,
                None => 0,
            };
            let items = iterate(&args[0])?;
            Ok(Value::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
                    .collect(),
            ))
        }
        "zip" => {
            let mut columns = Vec::new();
            for arg in &args {
                columns.push(iterate(arg)?);
            }
            let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::list(
                (0..shortest)
                    .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        "any" | "all" => {
            arity(name, &args, 1, 1)?;
            let items = iterate(&args[0])?;
            let result = if name == "any" {
                items.iter().any(Value::truthy)
            } else {
                items.iter().all(Value::truthy)
            };
            Ok(Value::Bool(result))
        }
        "str" => {
            arity("str", &args, 0, 1)?;
            Ok(match args.first() {
                Some(v) => Value::str(v.str_value()),
                None => Value::str(""),
            })
        }
        "repr" => {
            arity("repr", &args, 1, 1)?;
            Ok(Value::str(args[0].repr()))
        }
        "int" => {
            arity("int", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(i)) => Ok(Value::Int(*i)),
                Some(Value::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
                Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
                Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    RuntimeError::value_error(format!(
                        "invalid literal for int() with base 10: '{s}'"
                    ))
                }),
                Some(other) => Err(RuntimeError::type_error(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            arity("float", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
                Some(Value::Float(f)) => Ok(Value::Float(*f)),
                Some(Value::Bool(b)) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    RuntimeError::value_error(format!("could not convert string to float: '{s}'"))
                }),
                Some(other) => Err(RuntimeError::type_error(format!(
                    "float() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "bool" => {
            arity("bool", &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        "list" => {
            arity("list", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::list(Vec::new())),
                Some(v) => Ok(Value::list(iterate(v)?)),
            }
        }
        "tuple" => {
            arity("tuple", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::tuple(Vec::new())),
                Some(v) => Ok(Value::tuple(iterate(v)?)),
            }
        }
        "dict" => {
            arity("dict", &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::dict(Vec::new())),
                Some(Value::Dict(pairs)) => Ok(Value::dict(pairs.borrow().clone())),
                Some(other) => {
                    let mut out: Vec<(Value, Value)> = Vec::new();
                    for item in iterate(other)? {
                        let pair = iterate(&item)?;
                        if pair.len() != 2 {
                            return Err(RuntimeError::value_error(
                                "dictionary update sequence element is not a pair",
                            ));
                        }
                        dict_set(&mut out, pair[0].clone(), pair[1].clone());
                    }
                    Ok(Value::dict(out))
                }
            }
        }
        "type" => {
            arity("type", &args, 1, 1)?;
            Ok(Value::str(args[0].type_name()))
        }
        "pow" => {
            arity("pow", &args, 2, 2)?;
            crate::interp::eval::binary_pow(&args[0], &args[1])
        }
        "divmod" => {
            arity("divmod", &args, 2, 2)?;
            let a = args[0].as_int();
            let b = args[1].as_int();
            match (a, b) {
                (Some(_), Some(0)) => Err(RuntimeError::new(
                    "ZeroDivisionError",
                    "integer division or modulo by zero",
                )),
                (Some(a), Some(b)) => Ok(Value::tuple(vec![
                    Value::Int(a.div_euclid(b)),
                    Value::Int(a.rem_euclid(b)),
                ])),
                _ => {
                    let a = number_arg("divmod", &args[0])?;
                    let b = number_arg("divmod", &args[1])?;
                    if b == 0.0 {
                        return Err(RuntimeError::new("ZeroDivisionError", "float divmod()"));
                    }
                    Ok(Value::tuple(vec![
                        Value::Float((a / b).floor()),
                        Value::Float(a - b * (a / b).floor()),
                    ]))
                }
            }
        }
        "isinstance" => {
            arity("isinstance", &args, 2, 2)?;
            let matches_one = |t: &Value| -> Result<bool, RuntimeError> {
                match t {
                    Value::Builtin(type_name) => Ok(match *type_name {
                        "int" => matches!(args[0], Value::Int(_)),
                        "float" => matches!(args[0], Value::Float(_)),
                        "str" => matches!(args[0], Value::Str(_)),
                        "bool" => matches!(args[0], Value::Bool(_)),
                        "list" => matches!(args[0], Value::List(_)),
                        "tuple" => matches!(args[0], Value::Tuple(_)),
                        "dict" => matches!(args[0], Value::Dict(_)),
                        _ => false,
                    }),
                    Value::Class(c) => Ok(match &args[0] {
                        Value::Instance(inst) => Rc::ptr_eq(&inst.class, c),
                        _ => false,
                    }),
                    _ => Err(RuntimeError::type_error(
                        "isinstance() arg 2 must be a type or tuple of types",
                    )),
                }
            };
            match &args[1] {
                Value::Tuple(types) => {
                    for t in types.iter() {
                        if matches_one(t)? {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                single => Ok(Value::Bool(matches_one(single)?)),
            }
        }
        other => Err(RuntimeError::name_error(other)),
    }
}

fn call_math(short: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = format!("math.{short}");
    match short {
        "pow" => {
            arity(&name, args, 2, 2)?;
            let a = number_arg(&name, &args[0])?;
            let b = number_arg(&name, &args[1])?;
            Ok(Value::Float(a.powf(b)))
        }
        "log" => {
            arity(&name, args, 1, 2)?;
            let x = number_arg(&name, &args[0])?;
            if x <= 0.0 {
                return Err(RuntimeError::value_error("math domain error"));
            }
            match args.get(1) {
                Some(base) => Ok(Value::Float(x.log(number_arg(&name, base)?))),
                None => Ok(Value::Float(x.ln())),
            }
        }
        _ => {
            arity(&name, args, 1, 1)?;
            let x = number_arg(&name, &args[0])?;
            let result = match short {
                "sqrt" => {
                    if x < 0.0 {
                        return Err(RuntimeError::value_error("math domain error"));
                    }
                    x.sqrt()
                }
                "floor" => return Ok(Value::Int(x.floor() as i64)),
                "ceil" => return Ok(Value::Int(x.ceil() as i64)),
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "exp" => x.exp(),
                "fabs" => x.abs(),
                _ => {
                    return Err(RuntimeError::name_error(&name));
                }
            };
            Ok(Value::Float(result))
        }
    }
}

fn numeric_add(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(*y))),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Float(x + y)),
            _ => Err(RuntimeError::type_error(format!(
                "unsupported operand type(s) for +: '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

/// Stable sort with a fallible comparator.
fn sort_values(items: &mut [Value]) -> Result<(), RuntimeError> {
    let mut failure: Option<RuntimeError> = None;
    items.sort_by(|a, b| match compare_lt(a, b) {
        Ok(true) => std::cmp::Ordering::Less,
        Ok(false) => match compare_lt(b, a) {
            Ok(true) => std::cmp::Ordering::Greater,
            Ok(false) => std::cmp::Ordering::Equal,
            Err(e) => {
                failure.get_or_insert(e);
                std::cmp::Ordering::Equal
            }
        },
        Err(e) => {
            failure.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Insert or replace a key in an association-list dict.
pub fn dict_set(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    for (k, v) in pairs.iter_mut() {
        if *k == key {
            *v = value;
            return;
        }
    }
    pairs.push((key, value));
}

/// Whether a builtin type has the named method.
pub fn has_method(recv: &Value, name: &str) -> bool {
    let methods: &[&str] = match recv {
        Value::Str(_) => &[
            "upper",
            "lower",
            "strip",
            "lstrip",
            "rstrip",
            "split",
            "join",
            "replace",
            "startswith",
            "endswith",
            "find",
            "count",
        ],
        Value::List(_) => &[
            "append", "pop", "extend", "insert", "remove", "index", "count", "sort", "reverse",
            "clear", "copy",
        ],
        Value::Dict(_) => &[
            "keys", "values", "items", "get", "pop", "update", "clear", "copy",
        ],
        Value::Tuple(_) => &["index", "count"],
        _ => &[],
    };
    methods.contains(&name)
}

/// Call a method on a builtin-type value.
pub fn call_method(recv: &Value, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match recv {
        Value::Str(s) => call_str_method(s, name, &args),
        Value::List(items) => call_list_method(items, name, args),
        Value::Dict(pairs) => call_dict_method(pairs, name, args),
        Value::Tuple(items) => match name {
            "index" => {
                arity("index", &args, 1, 1)?;
                items
                    .iter()
                    .position(|v| *v == args[0])
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| RuntimeError::value_error("tuple.index(x): x not in tuple"))
            }
            "count" => {
                arity("count", &args, 1, 1)?;
                Ok(Value::Int(
                    items.iter().filter(|v| **v == args[0]).count() as i64
                ))
            }
            _ => Err(attribute_error(recv, name)),
        },
        _ => Err(attribute_error(recv, name)),
    }
}

fn attribute_error(recv: &Value, name: &str) -> RuntimeError {
    RuntimeError::new(
        "AttributeError",
        format!("'{}' object has no attribute '{}'", recv.type_name(), name),
    )
}

fn str_arg<'a>(method: &str, arg: &'a Value) -> Result<&'a str, RuntimeError> {
    match arg {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(RuntimeError::type_error(format!(
            "{method}() argument must be str, not '{}'",
            other.type_name()
        ))),
    }
}

fn call_str_method(s: &str, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match name {
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" => Ok(Value::str(s.trim())),
        "lstrip" => Ok(Value::str(s.trim_start())),
        "rstrip" => Ok(Value::str(s.trim_end())),
        "split" => {
            arity("split", args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(Value::str).collect(),
                Some(sep) => s.split(str_arg("split", sep)?).map(Value::str).collect(),
            };
            Ok(Value::list(parts))
        }
        "join" => {
            arity("join", args, 1, 1)?;
            let items = iterate(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                parts.push(str_arg("join", item)?.to_string());
            }
            Ok(Value::str(parts.join(s)))
        }
        "replace" => {
            arity("replace", args, 2, 2)?;
            Ok(Value::str(s.replace(
                str_arg("replace", &args[0])?,
                str_arg("replace", &args[1])?,
            )))
        }
        "startswith" => {
            arity("startswith", args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(str_arg("startswith", &args[0])?)))
        }
        "endswith" => {
            arity("endswith", args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(str_arg("endswith", &args[0])?)))
        }
        "find" => {
            arity("find", args, 1, 1)?;
            let needle = str_arg("find", &args[0])?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte_idx) => s[..byte_idx].chars().count() as i64,
                None => -1,
            }))
        }
        "count" => {
            arity("count", args, 1, 1)?;
            let needle = str_arg("count", &args[0])?;
            if needle.is_empty() {
                return Ok(Value::Int(s.chars().count() as i64 + 1));
            }
            Ok(Value::Int(s.matches(needle).count() as i64))
        }
        _ => Err(attribute_error(&Value::str(s), name)),
    }
}

fn call_list_method(
    items: &Rc<std::cell::RefCell<Vec<Value>>>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    match name {
        "append" => {
            arity("append", &args, 1, 1)?;
            items.borrow_mut().push(args.into_iter().next().unwrap());
            Ok(Value::None)
        }
        "pop" => {
            arity("pop", &args, 0, 1)?;
            let mut borrow = items.borrow_mut();
            let len = borrow.len() as i64;
            let idx = match args.first() {
                Some(v) => v
                    .as_int()
                    .ok_or_else(|| RuntimeError::type_error("pop() index must be an integer"))?,
                None => len - 1,
            };
            let idx = if idx < 0 { idx + len } else { idx };
            if idx < 0 || idx >= len {
                return Err(RuntimeError::new("IndexError", "pop index out of range"));
            }
            Ok(borrow.remove(idx as usize))
        }
        "extend" => {
            arity("extend", &args, 1, 1)?;
            let extra = iterate(&args[0])?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            arity("insert", &args, 2, 2)?;
            let mut borrow = items.borrow_mut();
            let len = borrow.len() as i64;
            let idx = args[0]
                .as_int()
                .ok_or_else(|| RuntimeError::type_error("insert() index must be an integer"))?
                .clamp(-len, len);
            let idx = if idx < 0 { idx + len } else { idx };
            borrow.insert(idx as usize, args[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            arity("remove", &args, 1, 1)?;
            let mut borrow = items.borrow_mut();
            match borrow.iter().position(|v| *v == args[0]) {
                Some(idx) => {
                    borrow.remove(idx);
                    Ok(Value::None)
                }
                None => Err(RuntimeError::value_error("list.remove(x): x not in list")),
            }
        }
        "index" => {
            arity("index", &args, 1, 1)?;
            items
                .borrow()
                .iter()
                .position(|v| *v == args[0])
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| RuntimeError::value_error("list.index(x): x not in list"))
        }
        "count" => {
            arity("count", &args, 1, 1)?;
            Ok(Value::Int(
                items.borrow().iter().filter(|v| **v == args[0]).count() as i64,
            ))
        }
        "sort" => {
            arity("sort", &args, 0, 0)?;
            let mut borrow = items.borrow_mut();
            sort_values(&mut borrow)?;
            Ok(Value::None)
        }
        "reverse" => {
            arity("reverse", &args, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            arity("clear", &args, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity("copy", &args, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => Err(attribute_error(&Value::List(items.clone()), name)),
    }
}

fn call_dict_method(
    pairs: &Rc<std::cell::RefCell<Vec<(Value, Value)>>>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    match name {
        "keys" => Ok(Value::list(
            pairs.borrow().iter().map(|(k, _)| k.clone()).collect(),
        )),
        "values" => Ok(Value::list(
            pairs.borrow().iter().map(|(_, v)| v.clone()).collect(),
        )),
        "items" => Ok(Value::list(
            pairs
                .borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "get" => {
            arity("get", &args, 1, 2)?;
            let found = pairs
                .borrow()
                .iter()
                .find(|(k, _)| *k == args[0])
                .map(|(_, v)| v.clone());
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "pop" => {
            arity("pop", &args, 1, 2)?;
            let mut borrow = pairs.borrow_mut();
            match borrow.iter().position(|(k, _)| *k == args[0]) {
                Some(idx) => Ok(borrow.remove(idx).1),
                None => match args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(RuntimeError::new("KeyError", args[0].repr())),
                },
            }
        }
        "update" => {
            arity("update", &args, 1, 1)?;
            match &args[0] {
                Value::Dict(other) => {
                    let additions = other.borrow().clone();
                    let mut borrow = pairs.borrow_mut();
                    for (k, v) in additions {
                        dict_set(&mut borrow, k, v);
                    }
                    Ok(Value::None)
                }
                other => Err(RuntimeError::type_error(format!(
                    "update() argument must be dict, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "clear" => {
            arity("clear", &args, 0, 0)?;
            pairs.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity("copy", &args, 0, 0)?;
            Ok(Value::dict(pairs.borrow().clone()))
        }
        _ => Err(attribute_error(&Value::Dict(pairs.clone()), name)),
    }
}
