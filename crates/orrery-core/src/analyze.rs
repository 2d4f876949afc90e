//! Symbol extraction: which names a cell defines and which it reads.
//!
//! The extractor walks the full AST (including nested function and class
//! bodies), collecting binding occurrences into `defined` and read
//! occurrences into `used`. Builtin names and `_`-prefixed names are
//! filtered after collection: builtins so common primitives never link
//! cells, underscores so cells can keep private scratch variables.
//!
//! Unparsable source yields two empty sets — a cell that is mid-edit
//! participates in no dependencies.

use rustc_hash::FxHashSet;

use crate::interp::builtins;
use crate::lang::{
    self,
    ast::{Expr, Stmt, Target},
};

/// The `(defined, used)` symbol sets for one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolSet {
    pub defined: FxHashSet<String>,
    pub used: FxHashSet<String>,
}

/// Extract the symbol sets from a cell's source.
pub fn extract(source: &str) -> SymbolSet {
    let stmts = match lang::parse(source) {
        Ok(stmts) => stmts,
        Err(_) => return SymbolSet::default(),
    };

    let mut symbols = SymbolSet::default();
    for stmt in &stmts {
        walk_stmt(stmt, &mut symbols);
    }

    symbols.defined.retain(|name| !name.starts_with('_'));
    let builtin_names = builtins::names();
    symbols
        .used
        .retain(|name| !name.starts_with('_') && !builtin_names.contains(&name.as_str()));

    symbols
}

fn walk_stmt(stmt: &Stmt, out: &mut SymbolSet) {
    match stmt {
        Stmt::Expr(expr) => walk_expr(expr, out),
        Stmt::Assign { targets, value } => {
            for target in targets {
                walk_target(target, out);
            }
            walk_expr(value, out);
        }
        Stmt::AugAssign { target, value, .. } => {
            walk_target(target, out);
            walk_expr(value, out);
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value,
        } => {
            walk_target(target, out);
            walk_expr(annotation, out);
            if let Some(value) = value {
                walk_expr(value, out);
            }
        }
        Stmt::If { branches, orelse } => {
            for (test, body) in branches {
                walk_expr(test, out);
                for stmt in body {
                    walk_stmt(stmt, out);
                }
            }
            for stmt in orelse {
                walk_stmt(stmt, out);
            }
        }
        Stmt::While { test, body } => {
            walk_expr(test, out);
            for stmt in body {
                walk_stmt(stmt, out);
            }
        }
        Stmt::For { target, iter, body } => {
            walk_target(target, out);
            walk_expr(iter, out);
            for stmt in body {
                walk_stmt(stmt, out);
            }
        }
        Stmt::FunctionDef {
            name, params, body, ..
        } => {
            out.defined.insert(name.clone());
            for param in params {
                if let Some(default) = &param.default {
                    walk_expr(default, out);
                }
            }
            for stmt in body.iter() {
                walk_stmt(stmt, out);
            }
        }
        Stmt::ClassDef { name, body } => {
            out.defined.insert(name.clone());
            for stmt in body {
                walk_stmt(stmt, out);
            }
        }
        Stmt::With { item, target, body } => {
            walk_expr(item, out);
            if let Some(target) = target {
                walk_target(target, out);
            }
            for stmt in body {
                walk_stmt(stmt, out);
            }
        }
        Stmt::Import { names } => {
            for alias in names {
                out.defined.insert(alias.bound_name().to_string());
            }
        }
        Stmt::FromImport { names, star, .. } => {
            // Wildcard imports contribute nothing; the importing cell
            // cannot be linked to what it pulled in.
            if !star {
                for alias in names {
                    out.defined.insert(alias.bound_name().to_string());
                }
            }
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                walk_expr(value, out);
            }
        }
        Stmt::Break | Stmt::Continue | Stmt::Pass => {}
    }
}

/// Collect binding names from an assignment target. Index and attribute
/// targets bind nothing — they mutate a container, reading its name.
fn walk_target(target: &Target, out: &mut SymbolSet) {
    match target {
        Target::Name(name) => {
            out.defined.insert(name.clone());
        }
        Target::Tuple(items) | Target::List(items) => {
            for item in items {
                walk_target(item, out);
            }
        }
        Target::Starred(inner) => walk_target(inner, out),
        Target::Index { value, index } => {
            walk_expr(value, out);
            walk_expr(index, out);
        }
        Target::Attribute { value, .. } => walk_expr(value, out),
    }
}

/// A comprehension binder: local to the comprehension, so it contributes
/// to neither set, but index/attribute forms still read their base.
fn walk_comp_target(target: &Target, out: &mut SymbolSet) {
    match target {
        Target::Name(_) => {}
        Target::Tuple(items) | Target::List(items) => {
            for item in items {
                walk_comp_target(item, out);
            }
        }
        Target::Starred(inner) => walk_comp_target(inner, out),
        Target::Index { value, index } => {
            walk_expr(value, out);
            walk_expr(index, out);
        }
        Target::Attribute { value, .. } => walk_expr(value, out),
    }
}

fn walk_expr(expr: &Expr, out: &mut SymbolSet) {
    match expr {
        Expr::Name(name) => {
            out.used.insert(name.clone());
        }
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::NoneLit => {}
        Expr::Tuple(items) | Expr::List(items) => {
            for item in items {
                walk_expr(item, out);
            }
        }
        Expr::Dict(pairs) => {
            for (key, value) in pairs {
                walk_expr(key, out);
                walk_expr(value, out);
            }
        }
        Expr::ListComp {
            elt,
            target,
            iter,
            cond,
        } => {
            walk_comp_target(target, out);
            walk_expr(iter, out);
            if let Some(cond) = cond {
                walk_expr(cond, out);
            }
            walk_expr(elt, out);
        }
        Expr::BinOp { left, right, .. } => {
            walk_expr(left, out);
            walk_expr(right, out);
        }
        Expr::UnaryOp { operand, .. } => walk_expr(operand, out),
        Expr::BoolOp { values, .. } => {
            for value in values {
                walk_expr(value, out);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            walk_expr(left, out);
            for comparator in comparators {
                walk_expr(comparator, out);
            }
        }
        Expr::Call { func, args } => {
            walk_expr(func, out);
            for arg in args {
                walk_expr(arg, out);
            }
        }
        Expr::Index { value, index } => {
            walk_expr(value, out);
            walk_expr(index, out);
        }
        Expr::Attribute { value, .. } => walk_expr(value, out),
        Expr::IfExp { test, body, orelse } => {
            walk_expr(test, out);
            walk_expr(body, out);
            walk_expr(orelse, out);
        }
        Expr::Starred(inner) => walk_expr(inner, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(source: &str) -> Vec<String> {
        let mut names: Vec<String> = extract(source).defined.into_iter().collect();
        names.sort();
        names
    }

    fn used(source: &str) -> Vec<String> {
        let mut names: Vec<String> = extract(source).used.into_iter().collect();
        names.sort();
        names
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(defined("x = 1"), vec!["x"]);
    }

    #[test]
    fn test_multiple_assignments() {
        assert_eq!(defined("x = 1\ny = 2"), vec!["x", "y"]);
    }

    #[test]
    fn test_tuple_unpacking() {
        assert_eq!(defined("x, y = 1, 2"), vec!["x", "y"]);
        assert_eq!(defined("a, *rest = items"), vec!["a", "rest"]);
    }

    #[test]
    fn test_augmented_assignment() {
        assert_eq!(defined("x += 1"), vec!["x"]);
        // An augmented target is a binding occurrence, not a read.
        assert!(used("x += 1").is_empty());
    }

    #[test]
    fn test_annotated_assignment() {
        assert_eq!(defined("x: int = 1"), vec!["x"]);
    }

    #[test]
    fn test_function_definition() {
        assert_eq!(defined("def foo():\n    pass"), vec!["foo"]);
        assert_eq!(defined("async def bar():\n    pass"), vec!["bar"]);
    }

    #[test]
    fn test_class_definition() {
        assert_eq!(defined("class Foo:\n    pass"), vec!["Foo"]);
    }

    #[test]
    fn test_for_loop_variable() {
        assert_eq!(defined("for i in range(3):\n    pass"), vec!["i"]);
    }

    #[test]
    fn test_with_binding() {
        assert_eq!(defined("with acquire() as handle:\n    pass"), vec!["handle"]);
    }

    #[test]
    fn test_import_statement() {
        assert_eq!(defined("import math"), vec!["math"]);
        assert_eq!(defined("import os.path"), vec!["os"]);
    }

    #[test]
    fn test_import_as() {
        assert_eq!(defined("import math as m"), vec!["m"]);
    }

    #[test]
    fn test_from_import() {
        assert_eq!(defined("from math import sqrt, pi"), vec!["pi", "sqrt"]);
        assert_eq!(defined("from math import sqrt as s"), vec!["s"]);
        assert!(defined("from math import *").is_empty());
    }

    #[test]
    fn test_syntax_error_returns_empty() {
        assert_eq!(extract("x = = 1"), SymbolSet::default());
        assert_eq!(extract("def oops(:"), SymbolSet::default());
    }

    #[test]
    fn test_empty_code() {
        assert_eq!(extract(""), SymbolSet::default());
    }

    #[test]
    fn test_private_vars_filtered() {
        assert!(defined("_internal = 1").is_empty());
        assert_eq!(defined("y = _internal + 1"), vec!["y"]);
        assert!(used("y = _internal + 1").is_empty());
    }

    #[test]
    fn test_simple_usage() {
        assert_eq!(used("y = x + 1"), vec!["x"]);
    }

    #[test]
    fn test_multiple_usages() {
        assert_eq!(used("z = x + y"), vec!["x", "y"]);
    }

    #[test]
    fn test_function_call_usage() {
        assert_eq!(used("result = process(data)"), vec!["data", "process"]);
    }

    #[test]
    fn test_builtins_filtered() {
        assert!(used("x = len([1, 2])").is_empty());
        assert!(used("print(42)").is_empty());
        assert_eq!(used("x = len(rows)"), vec!["rows"]);
    }

    #[test]
    fn test_self_assignment() {
        let symbols = extract("x = x + 1");
        assert!(symbols.defined.contains("x"));
        assert!(symbols.used.contains("x"));
    }

    #[test]
    fn test_nested_bodies_are_walked() {
        let symbols = extract("def f():\n    y = base + 1\n    return y");
        assert!(symbols.defined.contains("f"));
        assert!(symbols.defined.contains("y"));
        assert!(symbols.used.contains("base"));
    }

    #[test]
    fn test_comprehension_binder_excluded() {
        let symbols = extract("squares = [x * x for x in data]");
        assert!(symbols.defined.contains("squares"));
        assert!(!symbols.defined.contains("x"));
        assert!(symbols.used.contains("data"));
    }

    #[test]
    fn test_index_target_reads_container() {
        let symbols = extract("table[key] = 1");
        assert!(symbols.defined.is_empty());
        assert!(symbols.used.contains("table"));
        assert!(symbols.used.contains("key"));
    }

    #[test]
    fn test_attribute_access_uses_base() {
        assert_eq!(used("r = config.threshold"), vec!["config"]);
    }
}
