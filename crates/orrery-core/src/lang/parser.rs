//! Recursive-descent parser for the cell language.

use std::rc::Rc;

use super::ParseError;
use super::ast::{
    BinOp, BoolOpKind, CmpOp, Expr, ImportAlias, Param, Stmt, Target, UnaryOp,
};
use super::lexer::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse a whole module (cell) into statements.
    pub fn parse_module(mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&TokenKind::Newline) {}
            if self.at(&TokenKind::Eof) {
                break;
            }
            if self.at(&TokenKind::Indent) {
                return Err(self.error("unexpected indent"));
            }
            self.parse_statement(&mut stmts)?;
        }
        Ok(stmts)
    }

    // ---- token plumbing -------------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek2(&self) -> &TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<TokenKind, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {}", self.peek().describe())))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            TokenKind::Name(_) => match self.advance() {
                TokenKind::Name(n) => Ok(n),
                _ => unreachable!(),
            },
            other => Err(self.error(format!("expected {what}, found {}", other.describe()))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line())
    }

    // ---- statements -----------------------------------------------------

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        match self.peek() {
            TokenKind::If => {
                let stmt = self.parse_if()?;
                out.push(stmt);
            }
            TokenKind::While => {
                self.advance();
                let test = self.parse_test()?;
                let body = self.parse_block()?;
                out.push(Stmt::While { test, body });
            }
            TokenKind::For => {
                self.advance();
                let target = self.parse_targets()?;
                self.expect(&TokenKind::In, "'in'")?;
                let iter = self.parse_testlist()?;
                let body = self.parse_block()?;
                out.push(Stmt::For { target, iter, body });
            }
            TokenKind::Def => {
                let stmt = self.parse_def(false)?;
                out.push(stmt);
            }
            TokenKind::Async => {
                self.advance();
                if !self.at(&TokenKind::Def) {
                    return Err(self.error("expected 'def' after 'async'"));
                }
                let stmt = self.parse_def(true)?;
                out.push(stmt);
            }
            TokenKind::Class => {
                let stmt = self.parse_class()?;
                out.push(stmt);
            }
            TokenKind::With => {
                self.advance();
                let item = self.parse_test()?;
                let target = if self.eat(&TokenKind::As) {
                    Some(self.parse_target_item()?)
                } else {
                    None
                };
                let body = self.parse_block()?;
                out.push(Stmt::With { item, target, body });
            }
            _ => {
                self.parse_simple_line(out)?;
            }
        }
        Ok(())
    }

    /// One or more `;`-separated simple statements, terminated by NEWLINE.
    fn parse_simple_line(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        loop {
            out.push(self.parse_simple_stmt()?);
            if self.eat(&TokenKind::Semi) {
                if self.at(&TokenKind::Newline) {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect(&TokenKind::Newline, "end of line")?;
        Ok(())
    }

    /// A block: either `: NEWLINE INDENT stmts DEDENT` or inline simple
    /// statements on the same line.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::Colon, "':'")?;
        let mut body = Vec::new();
        if self.eat(&TokenKind::Newline) {
            if !self.eat(&TokenKind::Indent) {
                return Err(self.error("expected an indented block"));
            }
            loop {
                if self.eat(&TokenKind::Dedent) {
                    break;
                }
                if self.at(&TokenKind::Eof) {
                    return Err(self.error("unexpected end of file in block"));
                }
                self.parse_statement(&mut body)?;
            }
        } else {
            self.parse_simple_line(&mut body)?;
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::If, "'if'")?;
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let mut branches = vec![(test, body)];
        let mut orelse = Vec::new();
        loop {
            if self.at(&TokenKind::Elif) {
                self.advance();
                let test = self.parse_test()?;
                let body = self.parse_block()?;
                branches.push((test, body));
            } else if self.at(&TokenKind::Else) {
                self.advance();
                orelse = self.parse_block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn parse_def(&mut self, is_async: bool) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::Def, "'def'")?;
        let name = self.expect_name("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let pname = self.expect_name("parameter name")?;
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_test()?)
            } else {
                None
            };
            params.push(Param {
                name: pname,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDef {
            name,
            params,
            body: Rc::new(body),
            is_async,
        })
    }

    fn parse_class(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::Class, "'class'")?;
        let name = self.expect_name("class name")?;
        // Base classes are parsed and discarded.
        if self.eat(&TokenKind::LParen) {
            if !self.at(&TokenKind::RParen) {
                self.parse_testlist()?;
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }
        let body = self.parse_block()?;
        Ok(Stmt::ClassDef { name, body })
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt::Pass)
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::Continue)
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at(&TokenKind::Newline) || self.at(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_testlist()?)
                };
                Ok(Stmt::Return(value))
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_from_import(),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_import(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::Import, "'import'")?;
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let alias = if self.eat(&TokenKind::As) {
                Some(self.expect_name("import alias")?)
            } else {
                None
            };
            names.push(ImportAlias { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::Import { names })
    }

    fn parse_from_import(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::From, "'from'")?;
        let module = self.parse_dotted_name()?;
        self.expect(&TokenKind::Import, "'import'")?;

        if self.eat(&TokenKind::Star) {
            return Ok(Stmt::FromImport {
                module,
                names: Vec::new(),
                star: true,
            });
        }

        let parenthesized = self.eat(&TokenKind::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name("imported name")?;
            let alias = if self.eat(&TokenKind::As) {
                Some(self.expect_name("import alias")?)
            } else {
                None
            };
            names.push(ImportAlias { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if parenthesized && self.at(&TokenKind::RParen) {
                break;
            }
        }
        if parenthesized {
            self.expect(&TokenKind::RParen, "')'")?;
        }
        Ok(Stmt::FromImport {
            module,
            names,
            star: false,
        })
    }

    fn parse_dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_name("module name")?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name("module name")?);
        }
        Ok(name)
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let first = self.parse_testlist()?;

        // Annotated assignment: `name: annotation [= value]`
        if self.at(&TokenKind::Colon) {
            self.advance();
            let target = self.expr_to_target(first)?;
            if !matches!(target, Target::Name(_)) {
                return Err(self.error("only simple names can be annotated"));
            }
            let annotation = self.parse_test()?;
            let value = if self.eat(&TokenKind::Assign) {
                Some(self.parse_testlist()?)
            } else {
                None
            };
            return Ok(Stmt::AnnAssign {
                target,
                annotation,
                value,
            });
        }

        // Augmented assignment
        if let Some(op) = self.aug_op() {
            self.advance();
            let target = self.expr_to_target(first)?;
            if matches!(
                target,
                Target::Tuple(_) | Target::List(_) | Target::Starred(_)
            ) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.parse_testlist()?;
            return Ok(Stmt::AugAssign { target, op, value });
        }

        // Plain assignment (possibly chained: a = b = value)
        if self.at(&TokenKind::Assign) {
            let mut exprs = vec![first];
            while self.eat(&TokenKind::Assign) {
                exprs.push(self.parse_testlist()?);
            }
            let value = exprs.pop().expect("at least one expression");
            let targets = exprs
                .into_iter()
                .map(|e| self.expr_to_target(e))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr(first))
    }

    fn aug_op(&self) -> Option<BinOp> {
        match self.peek() {
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::DoubleSlashEq => Some(BinOp::FloorDiv),
            TokenKind::PercentEq => Some(BinOp::Mod),
            TokenKind::DoubleStarEq => Some(BinOp::Pow),
            _ => None,
        }
    }

    // ---- targets --------------------------------------------------------

    /// A target list (`for` loops): never consumes `in`.
    fn parse_targets(&mut self) -> Result<Target, ParseError> {
        let first = self.parse_target_item()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::In) || self.at(&TokenKind::Colon) {
                break;
            }
            items.push(self.parse_target_item()?);
        }
        Ok(Target::Tuple(items))
    }

    fn parse_target_item(&mut self) -> Result<Target, ParseError> {
        if self.eat(&TokenKind::Star) {
            let inner = self.parse_target_item()?;
            return Ok(Target::Starred(Box::new(inner)));
        }
        let expr = self.parse_atom_trailer()?;
        self.expr_to_target(expr)
    }

    fn expr_to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        match expr {
            Expr::Name(n) => Ok(Target::Name(n)),
            Expr::Tuple(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.expr_to_target(e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Expr::List(items) => Ok(Target::List(
                items
                    .into_iter()
                    .map(|e| self.expr_to_target(e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Expr::Starred(inner) => Ok(Target::Starred(Box::new(self.expr_to_target(*inner)?))),
            Expr::Index { value, index } => Ok(Target::Index {
                value: *value,
                index: *index,
            }),
            Expr::Attribute { value, attr } => Ok(Target::Attribute {
                value: *value,
                attr,
            }),
            _ => Err(self.error("cannot assign to this expression")),
        }
    }

    // ---- expressions ----------------------------------------------------

    /// `test (',' test)* [',']` — one expression or a tuple.
    fn parse_testlist(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_test_or_starred()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.testlist_ended() {
                break;
            }
            items.push(self.parse_test_or_starred()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn testlist_ended(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Semi
                | TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
        ) || self.aug_op().is_some()
    }

    fn parse_test_or_starred(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Star) {
            let inner = self.parse_test()?;
            return Ok(Expr::Starred(Box::new(inner)));
        }
        self.parse_test()
    }

    /// Conditional expression: `a if cond else b`.
    fn parse_test(&mut self) -> Result<Expr, ParseError> {
        let body = self.parse_or()?;
        if self.at(&TokenKind::If) {
            self.advance();
            let test = self.parse_or()?;
            self.expect(&TokenKind::Else, "'else'")?;
            let orelse = self.parse_test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_and()?;
        if !self.at(&TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOpKind::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_not()?;
        if !self.at(&TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOpKind::And,
            values,
        })
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Eq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::LtEq => CmpOp::LtEq,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::GtEq => CmpOp::GtEq,
                TokenKind::In => CmpOp::In,
                TokenKind::Not if matches!(self.peek2(), TokenKind::In) => {
                    self.advance();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_factor()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Plus => {
                self.advance();
                let operand = self.parse_factor()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Pos,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_atom_trailer()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_atom_trailer(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(&TokenKind::RParen) {
                        let arg = self.parse_test()?;
                        if self.at(&TokenKind::Assign) {
                            return Err(self.error("keyword arguments are not supported"));
                        }
                        args.push(arg);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_test()?;
                    if self.at(&TokenKind::Colon) {
                        return Err(self.error("slices are not supported"));
                    }
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name("attribute name")?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            TokenKind::Name(n) => {
                self.advance();
                Ok(Expr::Name(n))
            }
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::NoneLit)
            }
            TokenKind::LParen => self.parse_paren(),
            TokenKind::LBracket => self.parse_list_or_comp(),
            TokenKind::LBrace => self.parse_dict(),
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn parse_paren(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.parse_test_or_starred()?;
        if self.at(&TokenKind::For) {
            return Err(self.error("generator expressions are not supported"));
        }
        if self.at(&TokenKind::Comma) {
            let mut items = vec![first];
            while self.eat(&TokenKind::Comma) {
                if self.at(&TokenKind::RParen) {
                    break;
                }
                items.push(self.parse_test_or_starred()?);
            }
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(Expr::Tuple(items));
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(first)
    }

    fn parse_list_or_comp(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LBracket, "'['")?;
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_test_or_starred()?;

        if self.at(&TokenKind::For) {
            self.advance();
            let target = self.parse_targets()?;
            self.expect(&TokenKind::In, "'in'")?;
            let iter = self.parse_or()?;
            let cond = if self.eat(&TokenKind::If) {
                Some(Box::new(self.parse_or()?))
            } else {
                None
            };
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                target: Box::new(target),
                iter: Box::new(iter),
                cond,
            });
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_test_or_starred()?);
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::List(items))
    }

    fn parse_dict(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        let mut pairs = Vec::new();
        loop {
            let key = self.parse_test()?;
            self.expect(&TokenKind::Colon, "':' in dict literal")?;
            let value = self.parse_test()?;
            pairs.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if self.at(&TokenKind::RBrace) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::Dict(pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    #[test]
    fn test_simple_assignment() {
        let stmts = parse("x = 10").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Assign { targets, value } => {
                assert_eq!(targets, &vec![Target::Name("x".into())]);
                assert_eq!(value, &Expr::Int(10));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_tuple_unpacking() {
        let stmts = parse("x, y = 1, 2").unwrap();
        match &stmts[0] {
            Stmt::Assign { targets, .. } => {
                assert_eq!(
                    targets[0],
                    Target::Tuple(vec![Target::Name("x".into()), Target::Name("y".into())])
                );
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_starred_target() {
        let stmts = parse("a, *rest = items").unwrap();
        match &stmts[0] {
            Stmt::Assign { targets, .. } => match &targets[0] {
                Target::Tuple(items) => {
                    assert!(matches!(items[1], Target::Starred(_)));
                }
                other => panic!("expected tuple target, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_aug_and_ann_assign() {
        assert!(matches!(
            parse("x += 1").unwrap()[0],
            Stmt::AugAssign { op: BinOp::Add, .. }
        ));
        assert!(matches!(
            parse("x: int = 1").unwrap()[0],
            Stmt::AnnAssign { value: Some(_), .. }
        ));
    }

    #[test]
    fn test_while_inline_body() {
        let stmts = parse("while True: pass").unwrap();
        match &stmts[0] {
            Stmt::While { test, body } => {
                assert_eq!(test, &Expr::Bool(true));
                assert_eq!(body, &vec![Stmt::Pass]);
            }
            other => panic!("expected while, got {other:?}"),
        }
    }

    #[test]
    fn test_function_def() {
        let stmts = parse("def add(a, b=1):\n    return a + b").unwrap();
        match &stmts[0] {
            Stmt::FunctionDef {
                name,
                params,
                body,
                is_async,
            } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(params[1].default.is_some());
                assert_eq!(body.len(), 1);
                assert!(!is_async);
            }
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn test_async_def() {
        assert!(matches!(
            parse("async def fetch():\n    return 1").unwrap()[0],
            Stmt::FunctionDef { is_async: true, .. }
        ));
    }

    #[test]
    fn test_class_def() {
        let stmts = parse("class Point:\n    def origin(self):\n        return 0").unwrap();
        assert!(matches!(&stmts[0], Stmt::ClassDef { name, .. } if name == "Point"));
    }

    #[test]
    fn test_for_loop_target_not_comparison() {
        let stmts = parse("for i in range(3):\n    total += i").unwrap();
        match &stmts[0] {
            Stmt::For { target, iter, .. } => {
                assert_eq!(target, &Target::Name("i".into()));
                assert!(matches!(iter, Expr::Call { .. }));
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_with_as() {
        let stmts = parse("with open_data() as f:\n    rows = f").unwrap();
        match &stmts[0] {
            Stmt::With { target, .. } => {
                assert_eq!(target, &Some(Target::Name("f".into())));
            }
            other => panic!("expected with, got {other:?}"),
        }
    }

    #[test]
    fn test_imports() {
        let stmts = parse("import math, os.path as p\nfrom math import sqrt as s, pi").unwrap();
        match &stmts[0] {
            Stmt::Import { names } => {
                assert_eq!(names[0].bound_name(), "math");
                assert_eq!(names[1].bound_name(), "p");
            }
            other => panic!("expected import, got {other:?}"),
        }
        match &stmts[1] {
            Stmt::FromImport { module, names, star } => {
                assert_eq!(module, "math");
                assert_eq!(names[0].bound_name(), "s");
                assert_eq!(names[1].bound_name(), "pi");
                assert!(!star);
            }
            other => panic!("expected from-import, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_import() {
        assert!(matches!(
            parse("from math import *").unwrap()[0],
            Stmt::FromImport { star: true, .. }
        ));
    }

    #[test]
    fn test_chained_comparison() {
        let stmts = parse("1 < x < 10").unwrap();
        match &stmts[0] {
            Stmt::Expr(Expr::Compare { ops, .. }) => assert_eq!(ops.len(), 2),
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_list_comprehension() {
        let stmts = parse("[x * 2 for x in data if x > 0]").unwrap();
        assert!(matches!(
            &stmts[0],
            Stmt::Expr(Expr::ListComp { cond: Some(_), .. })
        ));
    }

    #[test]
    fn test_conditional_expression() {
        assert!(matches!(
            parse("y = 1 if flag else 2").unwrap()[0],
            Stmt::Assign { .. }
        ));
    }

    #[test]
    fn test_precedence() {
        // 2 + 3 * 4 parses as 2 + (3 * 4)
        match &parse("2 + 3 * 4").unwrap()[0] {
            Stmt::Expr(Expr::BinOp { op, right, .. }) => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(**right, Expr::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_power_right_associative() {
        // 2 ** 3 ** 2 parses as 2 ** (3 ** 2)
        match &parse("2 ** 3 ** 2").unwrap()[0] {
            Stmt::Expr(Expr::BinOp {
                op: BinOp::Pow,
                right,
                ..
            }) => {
                assert!(matches!(**right, Expr::BinOp { op: BinOp::Pow, .. }));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_index_and_attribute_targets() {
        assert!(matches!(
            parse("d['k'] = 1").unwrap()[0],
            Stmt::Assign { .. }
        ));
        assert!(matches!(parse("p.x = 1").unwrap()[0], Stmt::Assign { .. }));
    }

    #[test]
    fn test_keyword_arguments_rejected() {
        let err = parse("f(a=1)").unwrap_err();
        assert!(err.message.contains("keyword arguments"));
    }

    #[test]
    fn test_cannot_assign_to_literal() {
        assert!(parse("1 = x").is_err());
        assert!(parse("f() = 2").is_err());
    }

    #[test]
    fn test_semicolon_separated() {
        assert_eq!(parse("a = 1; b = 2").unwrap().len(), 2);
    }
}
