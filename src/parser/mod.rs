//! Recursive-descent grammar driver for the smpl language.
//!
//! The parser walks the grammar productions and drives the [`SsaBuilder`] per
//! construct: every binary operator becomes one instruction emission, every
//! `if`/`while` follows the builder's open/enter/close protocol. Parsing and
//! SSA construction are one interleaved pass; there is no AST.
//!
//! Structural violations abort with [`crate::Error::Syntax`] (single-shot
//! compilation, no recovery). Recoverable findings - an uninitialized
//! variable read, a skipped function body, an argument-count mismatch - are
//! collected as [`Diagnostic`] values and compilation continues with a
//! degraded default.

use std::collections::HashSet;
use std::fmt;

use crate::error::syntax_error;
use crate::ir::{BlockGraph, InstrId, Opcode, SsaBuilder, Value};
use crate::lexer::{Scanner, Token};
use crate::Result;

/// A non-fatal finding reported during compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human-readable description of the finding.
    pub message: String,
    /// 1-based source line near the finding.
    pub line: u32,
    /// 1-based source column near the finding.
    pub column: u32,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// The smpl parser.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    token: Token,
    line: u32,
    column: u32,
    builder: SsaBuilder,
    /// Declared scalar variables (arrays live in the builder).
    vars: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the given source text.
    ///
    /// # Errors
    ///
    /// Returns an error if the first token is already malformed.
    pub fn new(source: &'a str) -> Result<Self> {
        let mut parser = Self {
            scanner: Scanner::new(source),
            token: Token::Eof,
            line: 1,
            column: 1,
            builder: SsaBuilder::new(),
            vars: HashSet::new(),
            diagnostics: Vec::new(),
        };
        parser.advance()?;
        Ok(parser)
    }

    /// Parses a whole computation and returns the finished graph with the
    /// collected diagnostics.
    ///
    /// # Errors
    ///
    /// Returns the first syntax error encountered; there is no recovery.
    pub fn parse(mut self) -> Result<(BlockGraph, Vec<Diagnostic>)> {
        self.computation()?;
        self.builder.finish();
        Ok((self.builder.into_graph(), self.diagnostics))
    }

    fn advance(&mut self) -> Result<()> {
        self.token = self.scanner.next_token()?;
        self.line = self.scanner.line();
        self.column = self.scanner.column();
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.token == *expected {
            self.advance()
        } else {
            Err(syntax_error!(
                self.line,
                self.column,
                "expected `{expected}`, found `{}`",
                self.token
            ))
        }
    }

    fn ident(&mut self) -> Result<String> {
        if let Token::Ident(name) = &self.token {
            let name = name.clone();
            self.advance()?;
            Ok(name)
        } else {
            Err(syntax_error!(
                self.line,
                self.column,
                "expected an identifier, found `{}`",
                self.token
            ))
        }
    }

    fn diagnostic(&mut self, message: String) {
        self.diagnostics.push(Diagnostic {
            message,
            line: self.line,
            column: self.column,
        });
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn computation(&mut self) -> Result<()> {
        self.expect(&Token::Main)?;
        while matches!(self.token, Token::Var | Token::Array) {
            self.var_decl(true)?;
        }
        while matches!(self.token, Token::Void | Token::Function) {
            self.func_decl()?;
        }
        self.expect(&Token::OpenBrace)?;
        self.stat_sequence()?;
        self.expect(&Token::CloseBrace)?;
        self.expect(&Token::Period)
    }

    fn var_decl(&mut self, declare: bool) -> Result<()> {
        let dims = match self.token {
            Token::Var => {
                self.advance()?;
                None
            }
            Token::Array => {
                self.advance()?;
                let mut dims = Vec::new();
                while self.token == Token::OpenBracket {
                    self.advance()?;
                    let Token::Number(dim) = self.token else {
                        return Err(syntax_error!(
                            self.line,
                            self.column,
                            "expected an array dimension, found `{}`",
                            self.token
                        ));
                    };
                    self.advance()?;
                    self.expect(&Token::CloseBracket)?;
                    dims.push(dim);
                }
                if dims.is_empty() {
                    return Err(syntax_error!(
                        self.line,
                        self.column,
                        "array declaration needs at least one dimension"
                    ));
                }
                Some(dims)
            }
            _ => {
                return Err(syntax_error!(
                    self.line,
                    self.column,
                    "expected `var` or `array`, found `{}`",
                    self.token
                ))
            }
        };

        loop {
            let name = self.ident()?;
            if declare {
                match &dims {
                    Some(dims) => self.builder.declare_array(&name, dims.clone()),
                    None => {
                        self.vars.insert(name);
                    }
                }
            }
            if self.token == Token::Comma {
                self.advance()?;
            } else {
                break;
            }
        }
        self.expect(&Token::Semicolon)
    }

    /// User-defined functions are parsed for grammar conformance only; the
    /// body is skipped and calls lower to JSR stubs.
    fn func_decl(&mut self) -> Result<()> {
        if self.token == Token::Void {
            self.advance()?;
        }
        self.expect(&Token::Function)?;
        let name = self.ident()?;
        self.diagnostic(format!(
            "function `{name}` is parsed but not compiled; calls lower to jsr"
        ));

        self.expect(&Token::OpenParen)?;
        if matches!(self.token, Token::Ident(_)) {
            self.ident()?;
            while self.token == Token::Comma {
                self.advance()?;
                self.ident()?;
            }
        }
        self.expect(&Token::CloseParen)?;
        self.expect(&Token::Semicolon)?;
        self.func_body()?;
        self.expect(&Token::Semicolon)
    }

    fn func_body(&mut self) -> Result<()> {
        while matches!(self.token, Token::Var | Token::Array) {
            self.var_decl(false)?;
        }
        self.expect(&Token::OpenBrace)?;
        let mut depth = 1u32;
        loop {
            match self.token {
                Token::OpenBrace => {
                    depth += 1;
                    self.advance()?;
                }
                Token::CloseBrace => {
                    depth -= 1;
                    self.advance()?;
                    if depth == 0 {
                        break;
                    }
                }
                Token::Eof => {
                    return Err(syntax_error!(
                        self.line,
                        self.column,
                        "unterminated function body"
                    ))
                }
                _ => self.advance()?,
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn stat_sequence(&mut self) -> Result<()> {
        self.statement()?;
        while self.token == Token::Semicolon {
            self.advance()?;
            // trailing semicolon before `}`/`fi`/`od`/`else` is allowed
            if self.token.starts_statement() {
                self.statement()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<()> {
        match self.token {
            Token::Let => self.assignment(),
            Token::Call => self.func_call().map(|_| ()),
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::Return => self.return_statement(),
            _ => Err(syntax_error!(
                self.line,
                self.column,
                "expected a statement, found `{}`",
                self.token
            )),
        }
    }

    fn assignment(&mut self) -> Result<()> {
        self.expect(&Token::Let)?;
        let name = self.ident()?;

        if self.builder.is_array(&name) {
            let address = self.array_address(&name)?;
            self.expect(&Token::Becomes)?;
            let value = self.expression()?;
            self.builder.store_array(&name, address, value);
        } else {
            if !self.vars.contains(&name) {
                self.diagnostic(format!("variable `{name}` assigned without declaration"));
                self.vars.insert(name.clone());
            }
            self.expect(&Token::Becomes)?;
            let value = self.expression()?;
            self.builder.assign(&name, value);
        }
        Ok(())
    }

    fn if_statement(&mut self) -> Result<()> {
        self.expect(&Token::If)?;
        self.builder.open_if();
        let branch = self.relation()?;
        self.expect(&Token::Then)?;
        self.builder.enter_then(branch);
        self.stat_sequence()?;
        self.builder.enter_else();
        if self.token == Token::Else {
            self.advance()?;
            self.stat_sequence()?;
        }
        self.expect(&Token::Fi)?;
        self.builder.close_if();
        Ok(())
    }

    fn while_statement(&mut self) -> Result<()> {
        self.expect(&Token::While)?;
        self.builder.open_while();
        let branch = self.relation()?;
        self.expect(&Token::Do)?;
        self.builder.enter_while_body(branch);
        self.stat_sequence()?;
        self.expect(&Token::Od)?;
        self.builder.close_while();
        Ok(())
    }

    fn return_statement(&mut self) -> Result<()> {
        self.expect(&Token::Return)?;
        let value = if matches!(
            self.token,
            Token::Ident(_) | Token::Number(_) | Token::OpenParen | Token::Call
        ) {
            Some(self.expression()?)
        } else {
            None
        };
        self.builder.return_statement(value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// The branch opcode is the *negation* of the relation: the branch is
    /// taken when the condition is false.
    fn relation(&mut self) -> Result<Option<InstrId>> {
        let left = self.expression()?;
        let branch_op = match self.token {
            Token::Eql => Opcode::Bne,
            Token::Neq => Opcode::Beq,
            Token::Lss => Opcode::Bge,
            Token::Leq => Opcode::Bgt,
            Token::Gtr => Opcode::Ble,
            Token::Geq => Opcode::Blt,
            _ => {
                return Err(syntax_error!(
                    self.line,
                    self.column,
                    "expected a relation operator, found `{}`",
                    self.token
                ))
            }
        };
        self.advance()?;
        let right = self.expression()?;
        Ok(self.builder.relation(left, branch_op, right))
    }

    fn expression(&mut self) -> Result<Value> {
        let mut value = self.term()?;
        loop {
            let op = match self.token {
                Token::Plus => Opcode::Add,
                Token::Minus => Opcode::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.term()?;
            value = self.builder.binary(op, value, right);
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Value> {
        let mut value = self.factor()?;
        loop {
            let op = match self.token {
                Token::Times => Opcode::Mul,
                Token::Slash => Opcode::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.factor()?;
            value = self.builder.binary(op, value, right);
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<Value> {
        match &self.token {
            Token::Number(value) => {
                let value = *value;
                self.advance()?;
                Ok(self.builder.constant(value))
            }
            Token::OpenParen => {
                self.advance()?;
                let value = self.expression()?;
                self.expect(&Token::CloseParen)?;
                Ok(value)
            }
            Token::Call => self.func_call(),
            Token::Ident(_) => self.designator_value(),
            _ => Err(syntax_error!(
                self.line,
                self.column,
                "expected a factor, found `{}`",
                self.token
            )),
        }
    }

    fn designator_value(&mut self) -> Result<Value> {
        let name = self.ident()?;
        if self.builder.is_array(&name) {
            let address = self.array_address(&name)?;
            return Ok(self.builder.load_array(&name, address));
        }

        match self.builder.variable(&name) {
            Some(value) => Ok(value),
            None => {
                let message = if self.vars.contains(&name) {
                    format!("variable `{name}` read before assignment; defaulting to 0")
                } else {
                    format!("undeclared variable `{name}`; defaulting to 0")
                };
                self.diagnostic(message);
                Ok(self.builder.auto_zero(&name))
            }
        }
    }

    fn array_address(&mut self, name: &str) -> Result<Value> {
        let mut indexes = Vec::new();
        while self.token == Token::OpenBracket {
            self.advance()?;
            indexes.push(self.expression()?);
            self.expect(&Token::CloseBracket)?;
        }
        let dims = self.builder.array_dims(name).map_or(0, <[i64]>::len);
        if indexes.len() != dims {
            self.diagnostic(format!(
                "array `{name}` has {dims} dimension(s), {} index(es) given",
                indexes.len()
            ));
        }
        Ok(self.builder.array_address(name, &indexes))
    }

    fn func_call(&mut self) -> Result<Value> {
        self.expect(&Token::Call)?;
        match self.token.clone() {
            Token::InputNum => {
                self.advance()?;
                let args = self.call_args()?;
                if !args.is_empty() {
                    self.diagnostic(format!(
                        "InputNum expects no arguments, {} given",
                        args.len()
                    ));
                }
                Ok(self.builder.input())
            }
            Token::OutputNum => {
                self.advance()?;
                let mut args = self.call_args()?;
                if args.len() != 1 {
                    self.diagnostic(format!(
                        "OutputNum expects one argument, {} given",
                        args.len()
                    ));
                }
                let value = if args.is_empty() {
                    self.builder.constant(0)
                } else {
                    args.remove(0)
                };
                self.builder.output(value.clone());
                Ok(value)
            }
            Token::OutputNewLine => {
                self.advance()?;
                let args = self.call_args()?;
                if !args.is_empty() {
                    self.diagnostic(format!(
                        "OutputNewLine expects no arguments, {} given",
                        args.len()
                    ));
                }
                self.builder.output_newline();
                Ok(self.builder.constant(0))
            }
            Token::Ident(name) => {
                self.advance()?;
                self.call_args()?;
                self.diagnostic(format!("call to undefined function `{name}` lowers to jsr"));
                Ok(self.builder.call_unknown(&name))
            }
            _ => Err(syntax_error!(
                self.line,
                self.column,
                "expected a function name, found `{}`",
                self.token
            )),
        }
    }

    /// The parenthesized argument list is optional: `call f` and `call f()`
    /// are both valid.
    fn call_args(&mut self) -> Result<Vec<Value>> {
        let mut args = Vec::new();
        if self.token == Token::OpenParen {
            self.advance()?;
            if self.token != Token::CloseParen {
                args.push(self.expression()?);
                while self.token == Token::Comma {
                    self.advance()?;
                    args.push(self.expression()?);
                }
            }
            self.expect(&Token::CloseParen)?;
        }
        Ok(args)
    }
}
