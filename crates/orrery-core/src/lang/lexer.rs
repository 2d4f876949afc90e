//! Lexer for the cell language.
//!
//! Raw tokens come from a [`logos`] scanner run line by line; this module
//! layers the indentation structure on top: NEWLINE at the end of each
//! logical line, INDENT/DEDENT from the indentation stack, and suppression
//! of both inside unclosed brackets so expressions can span lines.

use logos::Logos;

use super::ParseError;

/// A token with the 1-indexed source line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Token kinds, including the synthetic layout tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Keywords
    Def,
    Class,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Break,
    Continue,
    Pass,
    Import,
    From,
    As,
    With,
    And,
    Or,
    Not,
    True,
    False,
    None,
    Async,

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    DoubleSlashEq,
    PercentEq,
    DoubleStarEq,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semi,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Short human-readable description for parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(n) => format!("name '{n}'"),
            TokenKind::Int(v) => format!("number '{v}'"),
            TokenKind::Float(v) => format!("number '{v}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Def => "def",
            TokenKind::Class => "class",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Pass => "pass",
            TokenKind::Import => "import",
            TokenKind::From => "from",
            TokenKind::As => "as",
            TokenKind::With => "with",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::True => "True",
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::Async => "async",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::DoubleSlashEq => "//=",
            TokenKind::PercentEq => "%=",
            TokenKind::DoubleStarEq => "**=",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Semi => ";",
            _ => "?",
        }
    }
}

/// Raw single-line tokens produced by logos.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(skip r"#[^\n]*")]
enum RawToken {
    #[token("def")]
    Def,
    #[token("class")]
    Class,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("pass")]
    Pass,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("with")]
    With,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("async")]
    Async,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(
        r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+",
        |lex| lex.slice().parse::<f64>().ok()
    )]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("//=")]
    DoubleSlashEq,
    #[token("%=")]
    PercentEq,
    #[token("**=")]
    DoubleStarEq,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(";")]
    Semi,
}

/// Strip surrounding quotes and process escape sequences.
fn unescape(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            Option::None => out.push('\\'),
        }
    }
    out
}

/// Measure leading indentation in columns (tab = next multiple of 8) and
/// return the remainder of the line.
fn measure_indent(line: &str) -> (usize, &str) {
    let mut width = 0;
    for (idx, c) in line.char_indices() {
        match c {
            ' ' => width += 1,
            '\t' => width = width / 8 * 8 + 8,
            _ => return (width, &line[idx..]),
        }
    }
    (width, "")
}

/// Tokenize a complete cell source.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth: usize = 0;
    let mut last_line = 1;

    for (idx, raw_line) in source.lines().enumerate() {
        let line = idx + 1;
        last_line = line;

        if depth == 0 {
            let (indent, rest) = measure_indent(raw_line);
            if rest.is_empty() || rest.starts_with('#') {
                continue;
            }

            let current = *indents.last().unwrap_or(&0);
            if indent > current {
                indents.push(indent);
                tokens.push(Token {
                    kind: TokenKind::Indent,
                    line,
                });
            } else if indent < current {
                while indents.len() > 1 && indent < *indents.last().unwrap() {
                    indents.pop();
                    tokens.push(Token {
                        kind: TokenKind::Dedent,
                        line,
                    });
                }
                if indent != *indents.last().unwrap() {
                    return Err(ParseError::new(
                        "unindent does not match any outer indentation level",
                        line,
                    ));
                }
            }

            lex_line(rest, line, &mut tokens, &mut depth)?;
            if depth == 0 {
                tokens.push(Token {
                    kind: TokenKind::Newline,
                    line,
                });
            }
        } else {
            // Continuation line inside brackets: indentation is free-form.
            let (_, rest) = measure_indent(raw_line);
            let had = tokens.len();
            lex_line(rest, line, &mut tokens, &mut depth)?;
            if depth == 0 && tokens.len() > had {
                tokens.push(Token {
                    kind: TokenKind::Newline,
                    line,
                });
            }
        }
    }

    if depth > 0 {
        return Err(ParseError::new(
            "unexpected end of file inside brackets",
            last_line,
        ));
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token {
            kind: TokenKind::Dedent,
            line: last_line,
        });
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        line: last_line,
    });

    Ok(tokens)
}

/// Lex one physical line, tracking bracket depth.
fn lex_line(
    rest: &str,
    line: usize,
    tokens: &mut Vec<Token>,
    depth: &mut usize,
) -> Result<(), ParseError> {
    let mut lexer = RawToken::lexer(rest);
    while let Some(item) = lexer.next() {
        let raw = item.map_err(|()| {
            ParseError::new(format!("invalid syntax near '{}'", lexer.slice()), line)
        })?;
        let kind = match raw {
            RawToken::LParen => {
                *depth += 1;
                TokenKind::LParen
            }
            RawToken::LBracket => {
                *depth += 1;
                TokenKind::LBracket
            }
            RawToken::LBrace => {
                *depth += 1;
                TokenKind::LBrace
            }
            RawToken::RParen => {
                *depth = close_bracket(*depth, ")", line)?;
                TokenKind::RParen
            }
            RawToken::RBracket => {
                *depth = close_bracket(*depth, "]", line)?;
                TokenKind::RBracket
            }
            RawToken::RBrace => {
                *depth = close_bracket(*depth, "}", line)?;
                TokenKind::RBrace
            }
            other => plain_kind(other),
        };
        tokens.push(Token { kind, line });
    }
    Ok(())
}

fn close_bracket(depth: usize, symbol: &str, line: usize) -> Result<usize, ParseError> {
    depth
        .checked_sub(1)
        .ok_or_else(|| ParseError::new(format!("unmatched '{symbol}'"), line))
}

fn plain_kind(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::Def => TokenKind::Def,
        RawToken::Class => TokenKind::Class,
        RawToken::Return => TokenKind::Return,
        RawToken::If => TokenKind::If,
        RawToken::Elif => TokenKind::Elif,
        RawToken::Else => TokenKind::Else,
        RawToken::While => TokenKind::While,
        RawToken::For => TokenKind::For,
        RawToken::In => TokenKind::In,
        RawToken::Break => TokenKind::Break,
        RawToken::Continue => TokenKind::Continue,
        RawToken::Pass => TokenKind::Pass,
        RawToken::Import => TokenKind::Import,
        RawToken::From => TokenKind::From,
        RawToken::As => TokenKind::As,
        RawToken::With => TokenKind::With,
        RawToken::And => TokenKind::And,
        RawToken::Or => TokenKind::Or,
        RawToken::Not => TokenKind::Not,
        RawToken::True => TokenKind::True,
        RawToken::False => TokenKind::False,
        RawToken::None => TokenKind::None,
        RawToken::Async => TokenKind::Async,
        RawToken::Name(n) => TokenKind::Name(n),
        RawToken::Int(v) => TokenKind::Int(v),
        RawToken::Float(v) => TokenKind::Float(v),
        RawToken::Str(s) => TokenKind::Str(s),
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::DoubleStar => TokenKind::DoubleStar,
        RawToken::Slash => TokenKind::Slash,
        RawToken::DoubleSlash => TokenKind::DoubleSlash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::Assign => TokenKind::Assign,
        RawToken::PlusEq => TokenKind::PlusEq,
        RawToken::MinusEq => TokenKind::MinusEq,
        RawToken::StarEq => TokenKind::StarEq,
        RawToken::SlashEq => TokenKind::SlashEq,
        RawToken::DoubleSlashEq => TokenKind::DoubleSlashEq,
        RawToken::PercentEq => TokenKind::PercentEq,
        RawToken::DoubleStarEq => TokenKind::DoubleStarEq,
        RawToken::Eq => TokenKind::Eq,
        RawToken::NotEq => TokenKind::NotEq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::LtEq => TokenKind::LtEq,
        RawToken::Gt => TokenKind::Gt,
        RawToken::GtEq => TokenKind::GtEq,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Semi => TokenKind::Semi,
        RawToken::LParen
        | RawToken::RParen
        | RawToken::LBracket
        | RawToken::RBracket
        | RawToken::LBrace
        | RawToken::RBrace => unreachable!("bracket tokens handled by caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 10"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Assign,
                TokenKind::Int(10),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_vs_names() {
        assert_eq!(
            kinds("define = 1"),
            vec![
                TokenKind::Name("define".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        assert!(matches!(kinds("while True: pass")[0], TokenKind::While));
    }

    #[test]
    fn test_indentation() {
        let toks = kinds("if x:\n    y = 1\nz = 2");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
        // Dedent must come before the z token
        let dedent = toks.iter().position(|k| *k == TokenKind::Dedent).unwrap();
        let z = toks
            .iter()
            .position(|k| *k == TokenKind::Name("z".into()))
            .unwrap();
        assert!(dedent < z);
    }

    #[test]
    fn test_bracket_continuation() {
        let toks = kinds("x = [1,\n     2,\n     3]");
        // Exactly one Newline (the logical line end)
        let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let toks = kinds("x = 1\n\n# comment\n    # indented comment\ny = 2");
        assert!(!toks.contains(&TokenKind::Indent));
        let newlines = toks.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"s = "a\nb""#)[2],
            TokenKind::Str("a\nb".to_string())
        );
        assert_eq!(kinds("s = 'it'")[2], TokenKind::Str("it".to_string()));
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(kinds("x = 1.5")[2], TokenKind::Float(1.5));
        assert_eq!(kinds("x = 1e3")[2], TokenKind::Float(1000.0));
        assert_eq!(kinds("x = .25")[2], TokenKind::Float(0.25));
    }

    #[test]
    fn test_unmatched_bracket() {
        assert!(tokenize("x = )").is_err());
        assert!(tokenize("x = (1").is_err());
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    y = 1\n  z = 2").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn test_operators() {
        let toks = kinds("x **= 2 // 3");
        assert_eq!(toks[1], TokenKind::DoubleStarEq);
        assert_eq!(toks[3], TokenKind::DoubleSlash);
    }
}
