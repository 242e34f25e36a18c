//! # Parser Module
//!
//! Builds a [`Module`] from the scanner's token stream.
//!
//! The grammar is deliberately permissive. A line that starts with a
//! statement keyword is parsed as that statement; any other line is parsed
//! as a list of adjacent expressions ([`ExprKind::Items`]) terminated by
//! the newline. The parser never tries to distinguish calls from
//! references; that is the semantic analyzer's job. Bare identifier atoms
//! are wrapped in implicit [`ExprKind::Ref`] nodes so the analyzer's
//! reference rules apply uniformly.
//!
//! Grammatical hazards (a keyword used where an identifier is expected)
//! are recorded in a deferred slot rather than reported outright: if the
//! statement completes, the hazard demotes to a warning; a following parse
//! error, or end-of-file, flushes it as an error.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::ast::{BinOp, Expr, ExprKind, Module, Primitive, Stmt};
use crate::error::ErrorHandler;
use crate::token::{Token, TokenKind, TokenLoc};

/// Parser over a scanned token stream
pub struct Parser<'e> {
    tokens: Vec<Token>,
    position: usize,
    errors: &'e mut dyn ErrorHandler,
    deferred: Option<(String, TokenLoc)>,
    had_error: bool,
}

impl<'e> Parser<'e> {
    pub fn new(tokens: Vec<Token>, errors: &'e mut dyn ErrorHandler) -> Self {
        Parser {
            tokens,
            position: 0,
            errors,
            deferred: None,
            had_error: false,
        }
    }

    /// Parse a whole compilation unit. Returns `None` if any parse error
    /// was reported; diagnostics end up in the error handler either way.
    pub fn parse(tokens: Vec<Token>, name: &str, errors: &'e mut dyn ErrorHandler) -> Option<Module> {
        let mut parser = Parser::new(tokens, errors);
        let module = parser.parse_module(name);
        if parser.had_error {
            None
        } else {
            Some(module)
        }
    }

    fn current(&self) -> &TokenKind {
        self.tokens
            .get(self.position)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn current_loc(&self) -> TokenLoc {
        self.tokens
            .get(self.position)
            .map(|t| t.loc.clone())
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.current(), TokenKind::Newline | TokenKind::Eof)
    }

    /// Report a parse error. Any deferred hazard is promoted first.
    fn error(&mut self, message: &str, loc: &TokenLoc) {
        if let Some((m, l)) = self.deferred.take() {
            self.errors.error(&m, &l);
        }
        self.errors.error(message, loc);
        self.had_error = true;
    }

    /// Record a grammatical hazard whose severity depends on what follows
    fn defer(&mut self, message: &str, loc: &TokenLoc) {
        if let Some((m, l)) = self.deferred.take() {
            self.errors.error(&m, &l);
            self.had_error = true;
        }
        self.deferred = Some((message.to_string(), loc.clone()));
    }

    /// The enclosing statement completed: the hazard was survivable
    fn report_deferred_as_warning(&mut self) {
        if let Some((m, l)) = self.deferred.take() {
            self.errors.warning(&m, &l);
        }
    }

    /// Skip to the start of the next line (error recovery)
    fn synchronize(&mut self) {
        while !self.at_line_end() {
            self.advance();
        }
        if matches!(self.current(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn expect_line_end(&mut self) -> bool {
        if self.at_line_end() {
            if matches!(self.current(), TokenKind::Newline) {
                self.advance();
            }
            true
        } else {
            let loc = self.current_loc();
            let desc = self.current().description().to_string();
            self.error(&format!("Expected end of line, found '{}'.", desc), &loc);
            self.synchronize();
            false
        }
    }

    fn parse_module(&mut self, name: &str) -> Module {
        let loc = self.current_loc();
        let mut stmts = Vec::new();

        while !matches!(self.current(), TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement(true) {
                stmts.push(stmt);
            }
        }

        // Still-deferred hazard at end of input is an error
        if let Some((m, l)) = self.deferred.take() {
            self.errors.error(&m, &l);
            self.had_error = true;
        }

        Module {
            loc,
            name: String::from(name),
            stmts,
        }
    }

    /// Parse one statement. `top_level` controls whether stray block
    /// terminators degrade to no-ops or end the enclosing block.
    fn parse_statement(&mut self, top_level: bool) -> Option<Stmt> {
        let loc = self.current_loc();

        let stmt = match self.current().clone() {
            TokenKind::Newline => {
                self.advance();
                Some(Stmt::NoOp { loc })
            }
            TokenKind::Short => self.parse_type_decl(Primitive::Short),
            TokenKind::Long => self.parse_type_decl(Primitive::Long),
            TokenKind::Float => self.parse_type_decl(Primitive::Float),
            TokenKind::Set => self.parse_set(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => {
                self.advance();
                if self.expect_line_end() {
                    Some(Stmt::Return { loc })
                } else {
                    None
                }
            }
            kind if kind.is_block_terminator() && top_level => {
                // Stray terminator outside any block
                self.advance();
                self.synchronize();
                Some(Stmt::NoOp { loc })
            }
            TokenKind::Eof => Some(Stmt::NoOp { loc }),
            _ => self.parse_statement_expr(),
        };

        if stmt.is_some() {
            self.report_deferred_as_warning();
        }
        stmt
    }

    /// Name position in a declaration. Keywords are a deferred hazard;
    /// their lexeme is used as the name.
    fn parse_decl_name(&mut self) -> Option<String> {
        let loc = self.current_loc();
        match self.current().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Some(name)
            }
            kind if kind.is_keyword() => {
                self.defer(
                    &format!("Keyword '{}' used as a variable name.", kind.description()),
                    &loc,
                );
                let name = loc.literal.clone();
                self.advance();
                Some(name)
            }
            other => {
                self.error(
                    &format!("Expected variable name, found '{}'.", other.description()),
                    &loc,
                );
                self.synchronize();
                None
            }
        }
    }

    fn parse_type_decl(&mut self, decl_type: Primitive) -> Option<Stmt> {
        let loc = self.current_loc();
        self.advance();
        let name = self.parse_decl_name()?;
        if !self.expect_line_end() {
            return None;
        }
        Some(Stmt::TypeDecl {
            loc,
            decl_type,
            name,
        })
    }

    fn parse_set(&mut self) -> Option<Stmt> {
        let loc = self.current_loc();
        self.advance();

        let target = self.parse_expr_items(&[TokenKind::To])?;
        if matches!(&target.kind, ExprKind::Items(items) if items.is_empty()) {
            let at = self.current_loc();
            self.error("Expected set target.", &at);
            self.synchronize();
            return None;
        }

        if !matches!(self.current(), TokenKind::To) {
            let at = self.current_loc();
            let desc = self.current().description().to_string();
            self.error(&format!("Expected 'to', found '{}'.", desc), &at);
            self.synchronize();
            return None;
        }
        self.advance();

        let expr = self.parse_expr_items(&[])?;
        if matches!(&expr.kind, ExprKind::Items(items) if items.is_empty()) {
            let at = self.current_loc();
            self.error("Expected expression after 'to'.", &at);
            self.synchronize();
            return None;
        }
        if !self.expect_line_end() {
            return None;
        }

        Some(Stmt::Set {
            loc,
            target,
            expr,
            valid: true,
        })
    }

    fn parse_condition(&mut self) -> Option<Expr> {
        let cond = self.parse_expr_items(&[])?;
        if matches!(&cond.kind, ExprKind::Items(items) if items.is_empty()) {
            let at = self.current_loc();
            self.error("Expected condition.", &at);
            self.synchronize();
            return None;
        }
        if !self.expect_line_end() {
            return None;
        }
        Some(cond)
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let loc = self.current_loc();
        self.advance();

        let cond = self.parse_condition()?;
        let true_body = self.parse_block();

        let mut false_body = Vec::new();
        match self.current().clone() {
            TokenKind::ElseIf => {
                // `elseif` nests as an if statement in the false branch;
                // its `endif` is the enclosing one.
                if let Some(nested) = self.parse_elseif() {
                    false_body.push(nested);
                }
            }
            TokenKind::Else => {
                self.advance();
                self.expect_line_end();
                false_body = self.parse_block();
                match self.current() {
                    TokenKind::EndIf => {
                        self.advance();
                        self.expect_line_end();
                    }
                    _ => {
                        let at = self.current_loc();
                        self.error("Expected 'endif'.", &at);
                        self.synchronize();
                    }
                }
            }
            TokenKind::EndIf => {
                self.advance();
                self.expect_line_end();
            }
            _ => {
                let at = self.current_loc();
                self.error("Expected 'endif'.", &at);
                self.synchronize();
            }
        }

        Some(Stmt::If {
            loc,
            cond,
            true_body,
            false_body,
        })
    }

    fn parse_elseif(&mut self) -> Option<Stmt> {
        let loc = self.current_loc();
        self.advance();

        let cond = self.parse_condition()?;
        let true_body = self.parse_block();

        let mut false_body = Vec::new();
        match self.current().clone() {
            TokenKind::ElseIf => {
                if let Some(nested) = self.parse_elseif() {
                    false_body.push(nested);
                }
            }
            TokenKind::Else => {
                self.advance();
                self.expect_line_end();
                false_body = self.parse_block();
                match self.current() {
                    TokenKind::EndIf => {
                        self.advance();
                        self.expect_line_end();
                    }
                    _ => {
                        let at = self.current_loc();
                        self.error("Expected 'endif'.", &at);
                        self.synchronize();
                    }
                }
            }
            TokenKind::EndIf => {
                self.advance();
                self.expect_line_end();
            }
            _ => {
                let at = self.current_loc();
                self.error("Expected 'endif'.", &at);
                self.synchronize();
            }
        }

        Some(Stmt::If {
            loc,
            cond,
            true_body,
            false_body,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let loc = self.current_loc();
        self.advance();

        let cond = self.parse_condition()?;
        let body = self.parse_block();

        match self.current() {
            TokenKind::EndWhile => {
                self.advance();
                self.expect_line_end();
            }
            _ => {
                let at = self.current_loc();
                self.error("Expected 'endwhile'.", &at);
                self.synchronize();
            }
        }

        Some(Stmt::While { loc, cond, body })
    }

    /// Parse statements until a block terminator or end of input
    fn parse_block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            match self.current() {
                TokenKind::Eof => break,
                kind if kind.is_block_terminator() => break,
                _ => {
                    if let Some(stmt) = self.parse_statement(false) {
                        stmts.push(stmt);
                    }
                }
            }
        }
        stmts
    }

    fn parse_statement_expr(&mut self) -> Option<Stmt> {
        let loc = self.current_loc();
        let expr = self.parse_expr_items(&[])?;
        if matches!(&expr.kind, ExprKind::Items(items) if items.is_empty()) {
            let at = self.current_loc();
            let desc = self.current().description().to_string();
            self.error(&format!("Expected statement, found '{}'.", desc), &at);
            self.synchronize();
            return None;
        }
        if !self.expect_line_end() {
            return None;
        }
        Some(Stmt::Expr { loc, expr })
    }

    /// Parse adjacent expression units into an `Items` list. Commas
    /// between units are skipped; the list stops at a newline, a block
    /// terminator keyword, or any of the extra stop tokens.
    fn parse_expr_items(&mut self, stop: &[TokenKind]) -> Option<Expr> {
        let loc = self.current_loc();
        let mut items = Vec::new();

        loop {
            while matches!(self.current(), TokenKind::Comma) {
                self.advance();
            }
            if self.at_line_end()
                || stop.contains(self.current())
                || self.current().is_block_terminator()
            {
                break;
            }
            let unit = self.parse_logic()?;
            items.push(unit);
        }

        Some(Expr::new(loc, ExprKind::Items(items)))
    }

    fn parse_logic(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current() {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Neq => BinOp::Neq,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Lte => BinOp::Lte,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Gte => BinOp::Gte,
                _ => break,
            };
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::new(
                loc,
                ExprKind::Logic {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_term()?;

        loop {
            let op = match self.current() {
                TokenKind::Plus => BinOp::Plus,
                TokenKind::Minus => BinOp::Minus,
                _ => break,
            };
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_term()?;
            left = Expr::new(
                loc,
                ExprKind::Math {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Some(left)
    }

    fn parse_term(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current() {
                TokenKind::Star => BinOp::Mult,
                TokenKind::Slash => BinOp::Divide,
                _ => break,
            };
            let loc = self.current_loc();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::new(
                loc,
                ExprKind::Math {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }

        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        if matches!(self.current(), TokenKind::Minus) {
            let loc = self.current_loc();
            self.advance();
            let operand = self.parse_unary()?;
            return Some(Expr::new(loc, ExprKind::Negate(Box::new(operand))));
        }
        self.parse_postfix()
    }

    /// An atom optionally followed by `.` or `->` and a second atom,
    /// forming an explicit reference. Both sides must be string atoms;
    /// whether `a.b` is a member or a float is decided later.
    fn parse_postfix(&mut self) -> Option<Expr> {
        let atom = self.parse_primary()?;

        let op = match self.current() {
            TokenKind::Dot => BinOp::Dot,
            TokenKind::Arrow => BinOp::Arrow,
            _ => return Some(atom),
        };

        // Reference bases are string atoms; unwrap an implicit ref back to
        // its offset atom.
        let base = match atom.kind {
            ExprKind::StringLit(_) => atom,
            ExprKind::Ref {
                base: None, offset, ..
            } => *offset,
            _ => {
                let loc = self.current_loc();
                self.error("Invalid reference base.", &loc);
                self.synchronize();
                return None;
            }
        };

        let loc = self.current_loc();
        self.advance();

        let offset = match self.parse_primary()? {
            Expr {
                kind: ExprKind::StringLit(s),
                loc: offset_loc,
                ..
            } => Expr::new(offset_loc, ExprKind::StringLit(s)),
            Expr {
                kind: ExprKind::Ref {
                    base: None, offset, ..
                },
                ..
            } => *offset,
            other => {
                self.error("Invalid reference member.", &other.loc);
                self.synchronize();
                return None;
            }
        };

        Some(Expr::new(
            loc,
            ExprKind::Ref {
                op,
                base: Some(Box::new(base)),
                offset: Box::new(offset),
            },
        ))
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let loc = self.current_loc();
        match self.current().clone() {
            TokenKind::Name(name) => {
                self.advance();
                let offset = Expr::new(loc.clone(), ExprKind::StringLit(name));
                Some(Expr::new(
                    loc,
                    ExprKind::Ref {
                        op: BinOp::None,
                        base: None,
                        offset: Box::new(offset),
                    },
                ))
            }
            TokenKind::Num(digits) => {
                self.advance();
                Some(Expr::new(loc, ExprKind::StringLit(digits)))
            }
            TokenKind::Str(text) => {
                self.advance();
                Some(Expr::new(loc, ExprKind::StringLit(text)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr_items(&[TokenKind::RParen])?;
                if !matches!(self.current(), TokenKind::RParen) {
                    let at = self.current_loc();
                    self.error("Expected ')'.", &at);
                    self.synchronize();
                    return None;
                }
                self.advance();
                Some(inner)
            }
            kind if kind.is_keyword() => {
                self.defer(
                    &format!(
                        "Keyword '{}' used as an identifier.",
                        kind.description()
                    ),
                    &loc,
                );
                let name = loc.literal.clone();
                self.advance();
                let offset = Expr::new(loc.clone(), ExprKind::StringLit(name));
                Some(Expr::new(
                    loc,
                    ExprKind::Ref {
                        op: BinOp::None,
                        base: None,
                        offset: Box::new(offset),
                    },
                ))
            }
            other => {
                self.error(
                    &format!("Expected expression, found '{}'.", other.description()),
                    &loc,
                );
                self.synchronize();
                None
            }
        }
    }
}
