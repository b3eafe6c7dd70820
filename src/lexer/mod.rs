//! Lexical analysis for smpl source text.
//!
//! The lexer converts source text into a stream of [`Token`] values. It is
//! deliberately simple: single-pass, one character of lookahead, no
//! backtracking. The only two-character decisions are `<-` (assignment),
//! `<=`/`>=`/`==`/`!=` (relation operators) and `//` (line comment).
//!
//! # Usage
//!
//! ```rust
//! use smplc::lexer::{Scanner, Token};
//!
//! let mut scanner = Scanner::new("let x <- 42");
//! assert_eq!(scanner.next_token()?, Token::Let);
//! assert_eq!(scanner.next_token()?, Token::Ident("x".to_string()));
//! assert_eq!(scanner.next_token()?, Token::Becomes);
//! assert_eq!(scanner.next_token()?, Token::Number(42));
//! assert_eq!(scanner.next_token()?, Token::Eof);
//! # Ok::<(), smplc::Error>(())
//! ```

mod scanner;
mod token;

pub use scanner::Scanner;
pub use token::Token;
