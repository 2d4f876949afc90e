//! Interpreter for the cell language.
//!
//! This is the runtime the worker process hosts: a tree-walking evaluator
//! over a persistent namespace. The engine never touches it directly — all
//! access goes through the worker channel — but keeping it in this crate
//! guarantees the symbol extractor and the runtime share one grammar.

pub mod builtins;
pub mod eval;
pub mod rich;
pub mod value;

pub use eval::Interpreter;
pub use value::Value;

use crate::lang::{self, Stmt};

/// A runtime error with a Python-style kind, rendered as `"<Kind>: <msg>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: String,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{name}' is not defined"))
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Outcome of executing one cell's source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    pub success: bool,
    /// Captured print output plus the repr of the trailing expression.
    pub output: String,
    /// Structured document for table/array shaped results.
    pub rich_output: Option<serde_json::Value>,
    /// Rendered error (`"<Kind>: <message>"`), empty on success.
    pub error: String,
}

impl ExecOutcome {
    fn success(output: String, rich_output: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            output,
            rich_output,
            error: String::new(),
        }
    }

    fn error(output: String, error: String) -> Self {
        Self {
            success: false,
            output,
            rich_output: None,
            error,
        }
    }
}

/// A persistent interpreter session: the worker-side kernel.
#[derive(Default)]
pub struct Session {
    interp: Interpreter,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a cell. The namespace persists across calls; print output is
    /// captured, and the value of a trailing expression becomes the result.
    pub fn execute(&mut self, source: &str) -> ExecOutcome {
        if source.trim().is_empty() {
            return ExecOutcome::success(String::new(), None);
        }

        let stmts = match lang::parse(source) {
            Ok(stmts) => stmts,
            Err(e) => return ExecOutcome::error(String::new(), e.to_string()),
        };

        let (body, trailing) = match stmts.split_last() {
            Some((Stmt::Expr(expr), init)) => (init, Some(expr.clone())),
            _ => (&stmts[..], None),
        };

        if let Err(e) = self.interp.exec_module(body) {
            let output = self.interp.take_output();
            return ExecOutcome::error(output, e.to_string());
        }

        let result = match trailing {
            Some(expr) => match self.interp.eval_module_expr(&expr) {
                Ok(value) => value,
                Err(e) => {
                    let output = self.interp.take_output();
                    return ExecOutcome::error(output, e.to_string());
                }
            },
            None => Value::None,
        };

        let stdout = self.interp.take_output();
        let mut parts = Vec::new();
        if !stdout.is_empty() {
            parts.push(stdout.trim_end().to_string());
        }
        if !matches!(result, Value::None) {
            parts.push(result.repr());
        }
        let rich = rich::to_rich(&result);

        ExecOutcome::success(parts.join("\n"), rich)
    }

    /// Read a variable from the namespace as JSON.
    pub fn get_var(&self, name: &str) -> Result<serde_json::Value, String> {
        match self.interp.get_global(name) {
            Some(value) => value::to_json(&value),
            None => Err(format!("name '{name}' is not defined")),
        }
    }

    /// Write a variable into the namespace from JSON.
    pub fn set_var(&mut self, name: &str, value: &serde_json::Value) {
        self.interp.set_global(name, value::from_json(value));
    }

    /// Clear the namespace.
    pub fn reset(&mut self) {
        self.interp = Interpreter::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_assignment() {
        let mut session = Session::new();
        let out = session.execute("x = 10");
        assert!(out.success);
        assert_eq!(out.output, "");
        assert_eq!(session.get_var("x").unwrap(), serde_json::json!(10));
    }

    #[test]
    fn test_expression_output() {
        let mut session = Session::new();
        let out = session.execute("2 + 3");
        assert!(out.success);
        assert_eq!(out.output, "5");
    }

    #[test]
    fn test_print_output() {
        let mut session = Session::new();
        let out = session.execute("print('hello')");
        assert!(out.success);
        assert_eq!(out.output, "hello");
    }

    #[test]
    fn test_combined_print_and_expression() {
        let mut session = Session::new();
        let out = session.execute("print('side')\n40 + 2");
        assert!(out.success);
        assert_eq!(out.output, "side\n42");
    }

    #[test]
    fn test_syntax_error() {
        let mut session = Session::new();
        let out = session.execute("x = = 1");
        assert!(!out.success);
        assert!(out.error.starts_with("SyntaxError:"), "{}", out.error);
        assert!(out.error.contains("line"));
    }

    #[test]
    fn test_runtime_error() {
        let mut session = Session::new();
        let out = session.execute("1 / 0");
        assert!(!out.success);
        assert_eq!(out.error, "ZeroDivisionError: division by zero");
    }

    #[test]
    fn test_undefined_variable_error() {
        let mut session = Session::new();
        let out = session.execute("y = missing + 1");
        assert_eq!(out.error, "NameError: name 'missing' is not defined");
    }

    #[test]
    fn test_output_before_error_is_kept() {
        let mut session = Session::new();
        let out = session.execute("print('before')\n1 / 0");
        assert!(!out.success);
        assert_eq!(out.output, "before\n");
    }

    #[test]
    fn test_namespace_persistence() {
        let mut session = Session::new();
        session.execute("x = 10");
        let out = session.execute("x * 2");
        assert_eq!(out.output, "20");
    }

    #[test]
    fn test_empty_and_whitespace_code() {
        let mut session = Session::new();
        for source in ["", "   ", "\n\n", "# only a comment"] {
            let out = session.execute(source);
            assert!(out.success);
            assert_eq!(out.output, "");
            assert_eq!(out.error, "");
        }
    }

    #[test]
    fn test_reset_clears_namespace() {
        let mut session = Session::new();
        session.execute("x = 10");
        session.reset();
        let out = session.execute("x");
        assert!(!out.success);
        assert!(out.error.starts_with("NameError"));
    }

    #[test]
    fn test_set_var_roundtrip() {
        let mut session = Session::new();
        session.set_var("n", &serde_json::json!([1, 2, 3]));
        let out = session.execute("sum(n)");
        assert_eq!(out.output, "6");
    }

    #[test]
    fn test_get_var_unserializable() {
        let mut session = Session::new();
        session.execute("def f():\n    return 1");
        assert!(session.get_var("f").is_err());
    }
}
