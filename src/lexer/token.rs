//! Token definitions for the smpl language.

use std::fmt;

/// A single lexical token.
///
/// Identifier and number tokens carry their literal value; every other token is
/// a plain marker. Keywords are resolved by the scanner, so an [`Token::Ident`]
/// is never a reserved word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A number literal.
    Number(i64),
    /// A non-reserved identifier.
    Ident(String),

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Times,
    /// `/`
    Slash,

    /// `==`
    Eql,
    /// `!=`
    Neq,
    /// `<`
    Lss,
    /// `<=`
    Leq,
    /// `>`
    Gtr,
    /// `>=`
    Geq,

    /// `<-`
    Becomes,

    /// `.`
    Period,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `{`
    OpenBrace,
    /// `}`
    CloseBrace,

    /// `let`
    Let,
    /// `call`
    Call,
    /// `if`
    If,
    /// `then`
    Then,
    /// `else`
    Else,
    /// `fi`
    Fi,
    /// `while`
    While,
    /// `do`
    Do,
    /// `od`
    Od,
    /// `return`
    Return,
    /// `var`
    Var,
    /// `array`
    Array,
    /// `void`
    Void,
    /// `function`
    Function,
    /// `main`
    Main,

    /// `InputNum` - the read intrinsic
    InputNum,
    /// `OutputNum` - the write intrinsic
    OutputNum,
    /// `OutputNewLine` - the newline intrinsic
    OutputNewLine,

    /// End of input.
    Eof,
}

impl Token {
    /// Resolves a scanned word to its keyword token, or `None` if it is an
    /// ordinary identifier.
    #[must_use]
    pub fn keyword(word: &str) -> Option<Token> {
        let token = match word {
            "let" => Token::Let,
            "call" => Token::Call,
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "fi" => Token::Fi,
            "while" => Token::While,
            "do" => Token::Do,
            "od" => Token::Od,
            "return" => Token::Return,
            "var" => Token::Var,
            "array" => Token::Array,
            "void" => Token::Void,
            "function" | "procedure" => Token::Function,
            "main" => Token::Main,
            "InputNum" => Token::InputNum,
            "OutputNum" => Token::OutputNum,
            "OutputNewLine" => Token::OutputNewLine,
            _ => return None,
        };
        Some(token)
    }

    /// Returns `true` if this token is a relation operator (`==`, `!=`, `<`,
    /// `<=`, `>`, `>=`).
    #[must_use]
    pub const fn is_rel_op(&self) -> bool {
        matches!(
            self,
            Token::Eql | Token::Neq | Token::Lss | Token::Leq | Token::Gtr | Token::Geq
        )
    }

    /// Returns `true` if this token can start a statement.
    #[must_use]
    pub const fn starts_statement(&self) -> bool {
        matches!(
            self,
            Token::Let | Token::Call | Token::If | Token::While | Token::Return
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "{value}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Times => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Eql => write!(f, "=="),
            Token::Neq => write!(f, "!="),
            Token::Lss => write!(f, "<"),
            Token::Leq => write!(f, "<="),
            Token::Gtr => write!(f, ">"),
            Token::Geq => write!(f, ">="),
            Token::Becomes => write!(f, "<-"),
            Token::Period => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::OpenBracket => write!(f, "["),
            Token::CloseBracket => write!(f, "]"),
            Token::OpenBrace => write!(f, "{{"),
            Token::CloseBrace => write!(f, "}}"),
            Token::Let => write!(f, "let"),
            Token::Call => write!(f, "call"),
            Token::If => write!(f, "if"),
            Token::Then => write!(f, "then"),
            Token::Else => write!(f, "else"),
            Token::Fi => write!(f, "fi"),
            Token::While => write!(f, "while"),
            Token::Do => write!(f, "do"),
            Token::Od => write!(f, "od"),
            Token::Return => write!(f, "return"),
            Token::Var => write!(f, "var"),
            Token::Array => write!(f, "array"),
            Token::Void => write!(f, "void"),
            Token::Function => write!(f, "function"),
            Token::Main => write!(f, "main"),
            Token::InputNum => write!(f, "InputNum"),
            Token::OutputNum => write!(f, "OutputNum"),
            Token::OutputNewLine => write!(f, "OutputNewLine"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}
