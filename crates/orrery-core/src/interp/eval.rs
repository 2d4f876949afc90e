//! Tree-walking evaluator for the cell language.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::RuntimeError;
use super::builtins;
use super::value::{ClassValue, FunctionValue, InstanceValue, Value};
use crate::lang::ast::{BinOp, BoolOpKind, CmpOp, Expr, Stmt, Target, UnaryOp};

/// Maximum user-function call depth.
const MAX_CALL_DEPTH: usize = 200;

type NameMap = FxHashMap<String, Value>;

/// Control flow escaping a statement.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// The evaluator. `scopes[0]` is the notebook namespace; function calls
/// push one local frame (lookup is local-then-global, like the language
/// this models — no closure chain).
pub struct Interpreter {
    scopes: Vec<NameMap>,
    output: String,
    call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            scopes: vec![NameMap::default()],
            output: String::new(),
            call_depth: 0,
        }
    }
}

impl Interpreter {
    /// Execute statements at module (cell) level.
    pub fn exec_module(&mut self, stmts: &[Stmt]) -> Result<(), RuntimeError> {
        match self.exec_stmts(stmts)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(RuntimeError::new("SyntaxError", "'return' outside function")),
            Flow::Break => Err(RuntimeError::new("SyntaxError", "'break' outside loop")),
            Flow::Continue => Err(RuntimeError::new("SyntaxError", "'continue' outside loop")),
        }
    }

    /// Evaluate a trailing expression at module level.
    pub fn eval_module_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.eval_expr(expr)
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.scopes[0].get(name).cloned()
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.scopes[0].insert(name.to_string(), value);
    }

    /// Append to the captured print output.
    pub fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Take and clear the captured print output.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    // ---- statements -----------------------------------------------------

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval_expr(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(Flow::Normal)
            }
            Stmt::AugAssign { target, op, value } => {
                let current = self.read_target(target)?;
                let rhs = self.eval_expr(value)?;
                let updated = binary_op(*op, &current, &rhs)?;
                self.assign(target, updated)?;
                Ok(Flow::Normal)
            }
            Stmt::AnnAssign { target, value, .. } => {
                if let Some(value) = value {
                    let value = self.eval_expr(value)?;
                    self.assign(target, value)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval_expr(test)?.truthy() {
                        return self.exec_stmts(body);
                    }
                }
                self.exec_stmts(orelse)
            }
            Stmt::While { test, body } => {
                while self.eval_expr(test)?.truthy() {
                    match self.exec_stmts(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { target, iter, body } => self.exec_for(target, iter, body),
            Stmt::FunctionDef {
                name,
                params,
                body,
                is_async: _,
            } => {
                let mut defaults = Vec::with_capacity(params.len());
                for param in params {
                    defaults.push(match &param.default {
                        Some(expr) => Some(self.eval_expr(expr)?),
                        None => None,
                    });
                }
                let func = Value::Function(Rc::new(FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    defaults,
                    body: body.clone(),
                }));
                self.set_name(name, func);
                Ok(Flow::Normal)
            }
            Stmt::ClassDef { name, body } => {
                self.scopes.push(NameMap::default());
                let result = self.exec_stmts(body);
                let attrs = self.scopes.pop().expect("class scope");
                result?;
                let class = Value::Class(Rc::new(ClassValue {
                    name: name.clone(),
                    attrs,
                }));
                self.set_name(name, class);
                Ok(Flow::Normal)
            }
            Stmt::With { item, target, body } => {
                let value = self.eval_expr(item)?;
                if let Some(target) = target {
                    self.assign(target, value)?;
                }
                self.exec_stmts(body)
            }
            Stmt::Import { names } => {
                for alias in names {
                    let root = alias.name.split('.').next().unwrap_or(&alias.name);
                    match builtins::import_module(&alias.name) {
                        Some(module) => self.set_name(alias.bound_name(), module),
                        None => {
                            return Err(RuntimeError::new(
                                "ModuleNotFoundError",
                                format!("No module named '{root}'"),
                            ));
                        }
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::FromImport {
                module,
                names,
                star,
            } => {
                let root = module.split('.').next().unwrap_or(module);
                let module_value = builtins::import_module(module).ok_or_else(|| {
                    RuntimeError::new("ModuleNotFoundError", format!("No module named '{root}'"))
                })?;
                let Value::Module(m) = &module_value else {
                    unreachable!("import_module returns modules");
                };
                if *star {
                    let attrs: Vec<(String, Value)> = m
                        .attrs
                        .iter()
                        .filter(|(name, _)| !name.starts_with('_'))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    for (name, value) in attrs {
                        self.set_name(&name, value);
                    }
                } else {
                    for alias in names {
                        let value = m.attrs.get(&alias.name).cloned().ok_or_else(|| {
                            RuntimeError::new(
                                "ImportError",
                                format!("cannot import name '{}' from '{}'", alias.name, module),
                            )
                        })?;
                        self.set_name(alias.bound_name(), value);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Pass => Ok(Flow::Normal),
        }
    }

    fn exec_for(
        &mut self,
        target: &Target,
        iter: &Expr,
        body: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        let iterable = self.eval_expr(iter)?;

        // Ranges iterate lazily so huge (or unbounded-feeling) ranges never
        // materialize.
        if let Value::Range { start, stop, step } = iterable {
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                self.assign(target, Value::Int(i))?;
                match self.exec_stmts(body)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Continue | Flow::Normal => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
                i += step;
            }
            return Ok(Flow::Normal);
        }

        for item in iterate(&iterable)? {
            self.assign(target, item)?;
            match self.exec_stmts(body)? {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    // ---- names and targets ----------------------------------------------

    fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        if self.scopes.len() > 1 {
            if let Some(value) = self.scopes.last().unwrap().get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.scopes[0].get(name) {
            return Ok(value.clone());
        }
        builtins::lookup(name).ok_or_else(|| RuntimeError::name_error(name))
    }

    fn set_name(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .insert(name.to_string(), value);
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => {
                self.set_name(name, value);
                Ok(())
            }
            Target::Tuple(items) | Target::List(items) => self.unpack(items, value),
            Target::Starred(_) => Err(RuntimeError::new(
                "SyntaxError",
                "starred assignment target must be in a list or tuple",
            )),
            Target::Index {
                value: container,
                index,
            } => {
                let container = self.eval_expr(container)?;
                let index = self.eval_expr(index)?;
                self.set_item(&container, index, value)
            }
            Target::Attribute {
                value: object,
                attr,
            } => {
                let object = self.eval_expr(object)?;
                match &object {
                    Value::Instance(inst) => {
                        inst.attrs.borrow_mut().insert(attr.clone(), value);
                        Ok(())
                    }
                    other => Err(RuntimeError::new(
                        "AttributeError",
                        format!(
                            "'{}' object has no attribute '{}'",
                            other.type_name(),
                            attr
                        ),
                    )),
                }
            }
        }
    }

    fn unpack(&mut self, targets: &[Target], value: Value) -> Result<(), RuntimeError> {
        let items = iterate(&value).map_err(|_| {
            RuntimeError::type_error(format!(
                "cannot unpack non-iterable '{}' object",
                value.type_name()
            ))
        })?;

        let star_pos = targets
            .iter()
            .position(|t| matches!(t, Target::Starred(_)));

        match star_pos {
            None => {
                if items.len() < targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
            Some(star) => {
                let after = targets.len() - star - 1;
                if items.len() < star + after {
                    return Err(RuntimeError::value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        star + after,
                        items.len()
                    )));
                }
                for (target, item) in targets[..star].iter().zip(&items[..star]) {
                    self.assign(target, item.clone())?;
                }
                let middle: Vec<Value> = items[star..items.len() - after].to_vec();
                let Target::Starred(inner) = &targets[star] else {
                    unreachable!("position found a starred target");
                };
                self.assign(inner, Value::list(middle))?;
                for (target, item) in targets[star + 1..]
                    .iter()
                    .zip(&items[items.len() - after..])
                {
                    self.assign(target, item.clone())?;
                }
                Ok(())
            }
        }
    }

    /// Read the current value of an augmented-assignment target.
    fn read_target(&mut self, target: &Target) -> Result<Value, RuntimeError> {
        match target {
            Target::Name(name) => self.lookup(name),
            Target::Index { value, index } => {
                let container = self.eval_expr(value)?;
                let index = self.eval_expr(index)?;
                self.get_item(&container, &index)
            }
            Target::Attribute { value, attr } => {
                let object = self.eval_expr(value)?;
                self.get_attribute(object, attr)
            }
            _ => Err(RuntimeError::new(
                "SyntaxError",
                "illegal expression for augmented assignment",
            )),
        }
    }

    fn set_item(
        &mut self,
        container: &Value,
        index: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        match container {
            Value::List(items) => {
                let mut borrow = items.borrow_mut();
                let len = borrow.len() as i64;
                let idx = index.as_int().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "list indices must be integers, not '{}'",
                        index.type_name()
                    ))
                })?;
                let idx = if idx < 0 { idx + len } else { idx };
                if idx < 0 || idx >= len {
                    return Err(RuntimeError::new(
                        "IndexError",
                        "list assignment index out of range",
                    ));
                }
                borrow[idx as usize] = value;
                Ok(())
            }
            Value::Dict(pairs) => {
                if !index.hashable() {
                    return Err(RuntimeError::type_error(format!(
                        "unhashable type: '{}'",
                        index.type_name()
                    )));
                }
                builtins::dict_set(&mut pairs.borrow_mut(), index, value);
                Ok(())
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn get_item(&self, container: &Value, index: &Value) -> Result<Value, RuntimeError> {
        match container {
            Value::List(items) => {
                let borrow = items.borrow();
                index_sequence(&borrow, index, "list")
            }
            Value::Tuple(items) => index_sequence(items, index, "tuple"),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(index, chars.len(), "string")?;
                Ok(Value::str(chars[idx].to_string()))
            }
            Value::Dict(pairs) => pairs
                .borrow()
                .iter()
                .find(|(k, _)| k == index)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| RuntimeError::new("KeyError", index.repr())),
            Value::Range { start, stop, step } => {
                let values = {
                    let mut out = Vec::new();
                    let mut i = *start;
                    while (*step > 0 && i < *stop) || (*step < 0 && i > *stop) {
                        out.push(Value::Int(i));
                        i += step;
                    }
                    out
                };
                index_sequence(&values, index, "range")
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn get_attribute(&mut self, object: Value, attr: &str) -> Result<Value, RuntimeError> {
        match &object {
            Value::Module(m) => m.attrs.get(attr).cloned().ok_or_else(|| {
                RuntimeError::new(
                    "AttributeError",
                    format!("module '{}' has no attribute '{}'", m.name, attr),
                )
            }),
            Value::Instance(inst) => {
                if let Some(value) = inst.attrs.borrow().get(attr) {
                    return Ok(value.clone());
                }
                match inst.class.attrs.get(attr) {
                    Some(Value::Function(func)) => Ok(Value::Bound {
                        recv: Box::new(object.clone()),
                        func: func.clone(),
                    }),
                    Some(value) => Ok(value.clone()),
                    None => Err(RuntimeError::new(
                        "AttributeError",
                        format!(
                            "'{}' object has no attribute '{}'",
                            inst.class.name, attr
                        ),
                    )),
                }
            }
            Value::Class(c) => c.attrs.get(attr).cloned().ok_or_else(|| {
                RuntimeError::new(
                    "AttributeError",
                    format!("type object '{}' has no attribute '{}'", c.name, attr),
                )
            }),
            other => {
                if builtins::has_method(other, attr) {
                    Ok(Value::BuiltinMethod {
                        recv: Box::new(object.clone()),
                        name: attr.to_string(),
                    })
                } else {
                    Err(RuntimeError::new(
                        "AttributeError",
                        format!(
                            "'{}' object has no attribute '{}'",
                            other.type_name(),
                            attr
                        ),
                    ))
                }
            }
        }
    }

    // ---- expressions ----------------------------------------------------

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::NoneLit => Ok(Value::None),
            Expr::Name(name) => self.lookup(name),
            Expr::Tuple(items) => {
                let values = self.eval_exprs(items)?;
                Ok(Value::tuple(values))
            }
            Expr::List(items) => {
                let values = self.eval_exprs(items)?;
                Ok(Value::list(values))
            }
            Expr::Dict(pairs) => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (key_expr, value_expr) in pairs {
                    let key = self.eval_expr(key_expr)?;
                    if !key.hashable() {
                        return Err(RuntimeError::type_error(format!(
                            "unhashable type: '{}'",
                            key.type_name()
                        )));
                    }
                    let value = self.eval_expr(value_expr)?;
                    builtins::dict_set(&mut out, key, value);
                }
                Ok(Value::dict(out))
            }
            Expr::ListComp {
                elt,
                target,
                iter,
                cond,
            } => {
                let iterable = self.eval_expr(iter)?;
                let mut out = Vec::new();
                for item in iterate(&iterable)? {
                    self.assign(target, item)?;
                    if let Some(cond) = cond {
                        if !self.eval_expr(cond)?.truthy() {
                            continue;
                        }
                    }
                    out.push(self.eval_expr(elt)?);
                }
                Ok(Value::list(out))
            }
            Expr::BinOp { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                binary_op(*op, &left, &right)
            }
            Expr::UnaryOp { op, operand } => {
                let value = self.eval_expr(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => Ok(match i.checked_neg() {
                            Some(v) => Value::Int(v),
                            None => Value::Float(-(i as f64)),
                        }),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
                        other => Err(RuntimeError::type_error(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        ))),
                    },
                    UnaryOp::Pos => match value {
                        Value::Int(_) | Value::Float(_) => Ok(value),
                        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                        other => Err(RuntimeError::type_error(format!(
                            "bad operand type for unary +: '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value_expr in values {
                    last = self.eval_expr(value_expr)?;
                    match op {
                        BoolOpKind::And if !last.truthy() => return Ok(last),
                        BoolOpKind::Or if last.truthy() => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut prev = self.eval_expr(left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let next = self.eval_expr(comparator)?;
                    if !compare(*op, &prev, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    prev = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args } => {
                let func = self.eval_expr(func)?;
                let args = self.eval_exprs(args)?;
                self.call_value(func, args)
            }
            Expr::Index { value, index } => {
                let container = self.eval_expr(value)?;
                let index = self.eval_expr(index)?;
                self.get_item(&container, &index)
            }
            Expr::Attribute { value, attr } => {
                let object = self.eval_expr(value)?;
                self.get_attribute(object, attr)
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval_expr(test)?.truthy() {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
            Expr::Starred(_) => Err(RuntimeError::new(
                "SyntaxError",
                "can't use starred expression here",
            )),
        }
    }

    fn eval_exprs(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.eval_expr(e)).collect()
    }

    // ---- calls -----------------------------------------------------------

    fn call_value(&mut self, func: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match func {
            Value::Function(f) => self.call_function(&f, args),
            Value::Bound { recv, func } => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(*recv);
                full.extend(args);
                self.call_function(&func, full)
            }
            Value::Builtin(name) => builtins::call(self, name, args),
            Value::BuiltinMethod { recv, name } => builtins::call_method(&recv, &name, args),
            Value::Class(class) => self.instantiate(&class, args),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        func: &Rc<FunctionValue>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        if args.len() > func.params.len() {
            return Err(RuntimeError::type_error(format!(
                "{}() takes {} positional argument(s) but {} were given",
                func.name,
                func.params.len(),
                args.len()
            )));
        }

        let mut locals = NameMap::default();
        for (i, param) in func.params.iter().enumerate() {
            let value = if i < args.len() {
                args[i].clone()
            } else {
                match &func.defaults[i] {
                    Some(default) => default.clone(),
                    None => {
                        return Err(RuntimeError::type_error(format!(
                            "{}() missing required positional argument: '{}'",
                            func.name, param.name
                        )));
                    }
                }
            };
            locals.insert(param.name.clone(), value);
        }

        self.scopes.push(locals);
        self.call_depth += 1;
        let flow = self.exec_stmts(&func.body);
        self.call_depth -= 1;
        self.scopes.pop();

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
            Flow::Break => Err(RuntimeError::new("SyntaxError", "'break' outside loop")),
            Flow::Continue => Err(RuntimeError::new("SyntaxError", "'continue' outside loop")),
        }
    }

    fn instantiate(
        &mut self,
        class: &Rc<ClassValue>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let instance = Value::Instance(Rc::new(InstanceValue {
            class: class.clone(),
            attrs: RefCell::new(NameMap::default()),
        }));
        match class.attrs.get("__init__") {
            Some(Value::Function(init)) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(instance.clone());
                full.extend(args);
                self.call_function(init, full)?;
            }
            _ if !args.is_empty() => {
                return Err(RuntimeError::type_error(format!(
                    "{}() takes no arguments",
                    class.name
                )));
            }
            _ => {}
        }
        Ok(instance)
    }
}

// ---- shared operator helpers --------------------------------------------

fn index_sequence(items: &[Value], index: &Value, what: &str) -> Result<Value, RuntimeError> {
    let idx = normalize_index(index, items.len(), what)?;
    Ok(items[idx].clone())
}

fn normalize_index(index: &Value, len: usize, what: &str) -> Result<usize, RuntimeError> {
    let idx = index.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{what} indices must be integers, not '{}'",
            index.type_name()
        ))
    })?;
    let len = len as i64;
    let idx = if idx < 0 { idx + len } else { idx };
    if idx < 0 || idx >= len {
        return Err(RuntimeError::new(
            "IndexError",
            format!("{what} index out of range"),
        ));
    }
    Ok(idx as usize)
}

/// Materialize an iterable as a vector of values.
pub fn iterate(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Dict(pairs) => Ok(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()),
        Value::Range { start, stop, step } => {
            let mut out = Vec::new();
            let mut i = *start;
            while (*step > 0 && i < *stop) || (*step < 0 && i > *stop) {
                out.push(Value::Int(i));
                i += step;
            }
            Ok(out)
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// Strict less-than, used by comparisons, sorting, and min/max.
pub fn compare_lt(a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return Ok(x < y);
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x < y),
        (Value::List(x), Value::List(y)) => {
            compare_sequences(&x.borrow(), &y.borrow())
        }
        (Value::Tuple(x), Value::Tuple(y)) => compare_sequences(x, y),
        _ => Err(RuntimeError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare_sequences(a: &[Value], b: &[Value]) -> Result<bool, RuntimeError> {
    for (x, y) in a.iter().zip(b.iter()) {
        if compare_lt(x, y)? {
            return Ok(true);
        }
        if compare_lt(y, x)? {
            return Ok(false);
        }
    }
    Ok(a.len() < b.len())
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    match op {
        CmpOp::Eq => Ok(a == b),
        CmpOp::NotEq => Ok(a != b),
        CmpOp::Lt => compare_lt(a, b),
        CmpOp::Gt => compare_lt(b, a),
        CmpOp::LtEq => Ok(!compare_lt(b, a)?),
        CmpOp::GtEq => Ok(!compare_lt(a, b)?),
        CmpOp::In => contains(a, b),
        CmpOp::NotIn => Ok(!contains(a, b)?),
    }
}

fn contains(item: &Value, container: &Value) -> Result<bool, RuntimeError> {
    match container {
        Value::List(items) => Ok(items.borrow().iter().any(|v| v == item)),
        Value::Tuple(items) => Ok(items.iter().any(|v| v == item)),
        Value::Dict(pairs) => Ok(pairs.borrow().iter().any(|(k, _)| k == item)),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not '{}'",
                other.type_name()
            ))),
        },
        Value::Range { .. } => Ok(iterate(container)?.iter().any(|v| v == item)),
        other => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn type_error_for(op: BinOp, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Apply a binary operator with Python-style numeric semantics.
pub fn binary_op(op: BinOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Add => match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(match x.checked_add(*y) {
                Some(v) => Value::Int(v),
                None => Value::Float(*x as f64 + *y as f64),
            }),
            (Value::Str(x), Value::Str(y)) => Ok(Value::str(format!("{x}{y}"))),
            (Value::List(x), Value::List(y)) => {
                let mut out = x.borrow().clone();
                out.extend(y.borrow().iter().cloned());
                Ok(Value::list(out))
            }
            (Value::Tuple(x), Value::Tuple(y)) => {
                let mut out = x.as_ref().clone();
                out.extend(y.iter().cloned());
                Ok(Value::tuple(out))
            }
            _ => numeric_binop(op, a, b, |x, y| x + y),
        },
        BinOp::Sub => match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(match x.checked_sub(*y) {
                Some(v) => Value::Int(v),
                None => Value::Float(*x as f64 - *y as f64),
            }),
            _ => numeric_binop(op, a, b, |x, y| x - y),
        },
        BinOp::Mul => match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(match x.checked_mul(*y) {
                Some(v) => Value::Int(v),
                None => Value::Float(*x as f64 * *y as f64),
            }),
            (Value::Str(s), other) | (other, Value::Str(s)) => {
                let n = other
                    .as_int()
                    .ok_or_else(|| type_error_for(op, a, b))?
                    .max(0);
                Ok(Value::str(s.repeat(n as usize)))
            }
            (Value::List(items), other) | (other, Value::List(items)) => {
                let n = other
                    .as_int()
                    .ok_or_else(|| type_error_for(op, a, b))?
                    .max(0);
                let base = items.borrow();
                let mut out = Vec::with_capacity(base.len() * n as usize);
                for _ in 0..n {
                    out.extend(base.iter().cloned());
                }
                Ok(Value::list(out))
            }
            _ => numeric_binop(op, a, b, |x, y| x * y),
        },
        BinOp::Div => {
            let (x, y) = numeric_pair(op, a, b)?;
            if y == 0.0 {
                return Err(RuntimeError::new("ZeroDivisionError", "division by zero"));
            }
            Ok(Value::Float(x / y))
        }
        BinOp::FloorDiv => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => {
                if y == 0 {
                    return Err(RuntimeError::new(
                        "ZeroDivisionError",
                        "integer division or modulo by zero",
                    ));
                }
                Ok(Value::Int(floor_div(x, y)))
            }
            _ => {
                let (x, y) = numeric_pair(op, a, b)?;
                if y == 0.0 {
                    return Err(RuntimeError::new(
                        "ZeroDivisionError",
                        "float floor division by zero",
                    ));
                }
                Ok(Value::Float((x / y).floor()))
            }
        },
        BinOp::Mod => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => {
                if y == 0 {
                    return Err(RuntimeError::new(
                        "ZeroDivisionError",
                        "integer division or modulo by zero",
                    ));
                }
                Ok(Value::Int(floor_mod(x, y)))
            }
            _ => {
                let (x, y) = numeric_pair(op, a, b)?;
                if y == 0.0 {
                    return Err(RuntimeError::new("ZeroDivisionError", "float modulo"));
                }
                Ok(Value::Float(x - y * (x / y).floor()))
            }
        },
        BinOp::Pow => binary_pow(a, b),
    }
}

/// `**` with int fast path and float fallback (also used by `pow()`).
pub fn binary_pow(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) if *y >= 0 => {
            let mut result: i64 = 1;
            let mut overflowed = false;
            for _ in 0..*y {
                match result.checked_mul(*x) {
                    Some(v) => result = v,
                    None => {
                        overflowed = true;
                        break;
                    }
                }
            }
            if overflowed {
                Ok(Value::Float((*x as f64).powf(*y as f64)))
            } else {
                Ok(Value::Int(result))
            }
        }
        _ => {
            let (x, y) = numeric_pair(BinOp::Pow, a, b)?;
            Ok(Value::Float(x.powf(y)))
        }
    }
}

fn floor_div(x: i64, y: i64) -> i64 {
    let q = x / y;
    let r = x % y;
    if r != 0 && (r < 0) != (y < 0) { q - 1 } else { q }
}

fn floor_mod(x: i64, y: i64) -> i64 {
    let r = x % y;
    if r != 0 && (r < 0) != (y < 0) { r + y } else { r }
}

fn numeric_pair(op: BinOp, a: &Value, b: &Value) -> Result<(f64, f64), RuntimeError> {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(type_error_for(op, a, b)),
    }
}

fn numeric_binop(
    op: BinOp,
    a: &Value,
    b: &Value,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    let (x, y) = numeric_pair(op, a, b)?;
    Ok(Value::Float(f(x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parse;

    fn run(source: &str) -> Interpreter {
        let mut interp = Interpreter::default();
        interp.exec_module(&parse(source).unwrap()).unwrap();
        interp
    }

    fn eval(source: &str) -> Value {
        let mut interp = Interpreter::default();
        let stmts = parse(source).unwrap();
        let (last, init) = stmts.split_last().unwrap();
        interp.exec_module(init).unwrap();
        match last {
            Stmt::Expr(e) => interp.eval_module_expr(e).unwrap(),
            _ => panic!("source must end in an expression"),
        }
    }

    fn eval_err(source: &str) -> RuntimeError {
        let mut interp = Interpreter::default();
        let stmts = parse(source).unwrap();
        match interp.exec_module(&stmts) {
            Err(e) => e,
            Ok(()) => panic!("expected error"),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2 + 3 * 4"), Value::Int(14));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("7 // 2"), Value::Int(3));
        assert_eq!(eval("-7 // 2"), Value::Int(-4));
        assert_eq!(eval("-7 % 3"), Value::Int(2));
        assert_eq!(eval("2 ** 10"), Value::Int(1024));
        assert_eq!(eval("'ab' + 'cd'"), Value::str("abcd"));
        assert_eq!(eval("'ab' * 2"), Value::str("abab"));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval_err("1 / 0").kind, "ZeroDivisionError");
        assert_eq!(eval_err("1 // 0").kind, "ZeroDivisionError");
        assert_eq!(eval_err("1 % 0").kind, "ZeroDivisionError");
    }

    #[test]
    fn test_tuple_unpacking() {
        let interp = run("x, y = 1, 2\nx, y = y, x");
        assert_eq!(interp.get_global("x").unwrap(), Value::Int(2));
        assert_eq!(interp.get_global("y").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_starred_unpacking() {
        let interp = run("a, *rest = [1, 2, 3, 4]");
        assert_eq!(interp.get_global("a").unwrap(), Value::Int(1));
        assert_eq!(
            interp.get_global("rest").unwrap(),
            Value::list(vec![Value::Int(2), Value::Int(3), Value::Int(4)])
        );
    }

    #[test]
    fn test_unpack_arity_errors() {
        assert_eq!(eval_err("a, b, c = 1, 2").kind, "ValueError");
        assert_eq!(eval_err("a, b = 1, 2, 3").kind, "ValueError");
    }

    #[test]
    fn test_if_elif_else() {
        let interp = run("x = 5\nif x > 10:\n    r = 'big'\nelif x > 3:\n    r = 'mid'\nelse:\n    r = 'small'");
        assert_eq!(interp.get_global("r").unwrap(), Value::str("mid"));
    }

    #[test]
    fn test_while_with_break_continue() {
        let interp = run(
            "total = 0\ni = 0\nwhile True:\n    i += 1\n    if i > 10:\n        break\n    if i % 2 == 0:\n        continue\n    total += i",
        );
        assert_eq!(interp.get_global("total").unwrap(), Value::Int(25));
    }

    #[test]
    fn test_for_over_range() {
        let interp = run("total = 0\nfor i in range(1, 5):\n    total += i");
        assert_eq!(interp.get_global("total").unwrap(), Value::Int(10));
    }

    #[test]
    fn test_function_call_and_defaults() {
        assert_eq!(eval("def add(a, b=10):\n    return a + b\nadd(5)"), Value::Int(15));
        assert_eq!(eval("def add(a, b=10):\n    return a + b\nadd(5, 1)"), Value::Int(6));
    }

    #[test]
    fn test_function_arity_errors() {
        assert_eq!(eval_err("def f(a):\n    return a\nf()").kind, "TypeError");
        assert_eq!(eval_err("def f(a):\n    return a\nf(1, 2)").kind, "TypeError");
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            eval("def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nfib(10)"),
            Value::Int(55)
        );
    }

    #[test]
    fn test_recursion_limit() {
        let err = eval_err("def loop(n):\n    return loop(n + 1)\nloop(0)");
        assert_eq!(err.kind, "RecursionError");
    }

    #[test]
    fn test_locals_do_not_leak() {
        let err = eval_err("def f():\n    inner = 1\n    return inner\nf()\ninner");
        assert_eq!(err.kind, "NameError");
    }

    #[test]
    fn test_globals_visible_in_functions() {
        assert_eq!(eval("base = 100\ndef f(x):\n    return base + x\nf(1)"), Value::Int(101));
    }

    #[test]
    fn test_class_with_init_and_methods() {
        let source = "class Point:\n    def __init__(self, x, y):\n        self.x = x\n        self.y = y\n    def norm2(self):\n        return self.x ** 2 + self.y ** 2\np = Point(3, 4)\np.norm2()";
        assert_eq!(eval(source), Value::Int(25));
    }

    #[test]
    fn test_attribute_mutation() {
        let source = "class Box:\n    pass\nb = Box()\nb.value = 7\nb.value";
        assert_eq!(eval(source), Value::Int(7));
    }

    #[test]
    fn test_list_aliasing() {
        let interp = run("a = [1]\nb = a\nb.append(2)");
        assert_eq!(
            interp.get_global("a").unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_dict_operations() {
        assert_eq!(eval("d = {'a': 1}\nd['b'] = 2\nd['a'] + d['b']"), Value::Int(3));
        assert_eq!(eval_err("d = {}\nd['missing']").kind, "KeyError");
    }

    #[test]
    fn test_index_errors() {
        assert_eq!(eval_err("[1, 2][5]").kind, "IndexError");
        assert_eq!(eval("[1, 2][-1]"), Value::Int(2));
    }

    #[test]
    fn test_list_comprehension() {
        assert_eq!(
            eval("[x * 2 for x in range(4) if x % 2 == 0]"),
            Value::list(vec![Value::Int(0), Value::Int(4)])
        );
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(eval("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval("1 < 2 > 5"), Value::Bool(false));
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval("2 in [1, 2, 3]"), Value::Bool(true));
        assert_eq!(eval("'ell' in 'hello'"), Value::Bool(true));
        assert_eq!(eval("'k' not in {'a': 1}"), Value::Bool(true));
    }

    #[test]
    fn test_bool_ops_return_operands() {
        assert_eq!(eval("0 or 'fallback'"), Value::str("fallback"));
        assert_eq!(eval("1 and 2"), Value::Int(2));
    }

    #[test]
    fn test_with_binds_resource() {
        assert_eq!(eval("with [1, 2, 3] as xs:\n    n = len(xs)\nn"), Value::Int(3));
    }

    #[test]
    fn test_import_math() {
        assert_eq!(eval("import math\nmath.floor(2.9)"), Value::Int(2));
        assert_eq!(eval("from math import sqrt\nsqrt(9.0)"), Value::Float(3.0));
        assert_eq!(eval("import math as m\nm.ceil(1.1)"), Value::Int(2));
    }

    #[test]
    fn test_unknown_module() {
        assert_eq!(eval_err("import nosuch").kind, "ModuleNotFoundError");
        assert_eq!(eval_err("from math import nosuch").kind, "ImportError");
    }

    #[test]
    fn test_return_outside_function() {
        assert_eq!(eval_err("return 1").kind, "SyntaxError");
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(eval_err("1 + 'a'").kind, "TypeError");
        assert_eq!(eval_err("len(1)").kind, "TypeError");
        assert_eq!(eval_err("(1)(2)").kind, "TypeError");
    }

    #[test]
    fn test_augmented_index_target() {
        assert_eq!(eval("xs = [1, 2]\nxs[0] += 10\nxs[0]"), Value::Int(11));
    }
}
