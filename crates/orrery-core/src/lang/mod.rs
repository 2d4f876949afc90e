//! Front end for the cell language.
//!
//! A small dynamically-typed scripting language with Python-like surface
//! syntax: indentation blocks, tuple destructuring, `def`/`class`/`for`/
//! `while`/`with`/`import` statements and a conventional expression grammar.
//! The same AST feeds both the symbol extractor and the worker interpreter,
//! so the dependency graph and the runtime can never disagree about what a
//! piece of source means.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{BinOp, BoolOpKind, CmpOp, Expr, ImportAlias, Param, Stmt, Target, UnaryOp};
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::Parser;

/// A syntax error with the 1-indexed line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxError: {} (line {})", self.message, self.line)
    }
}

impl std::error::Error for ParseError {}

/// Parse a complete cell source into a list of statements.
pub fn parse(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n").unwrap().is_empty());
        assert!(parse("# just a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_error_carries_line() {
        let err = parse("x = 1\ny = ((\n").unwrap_err();
        assert!(err.line >= 2, "expected error on line 2+, got {}", err.line);
        assert!(err.to_string().starts_with("SyntaxError:"));
        assert!(err.to_string().contains("line"));
    }
}
