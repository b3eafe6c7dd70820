//! Character-level scanner producing [`Token`] values.

use crate::{lexer::Token, Error, Result};

/// The smpl scanner.
///
/// Works over the source text as a byte slice (smpl source is ASCII) and keeps
/// a 1-based line/column position for error reporting. `//` comments run to the
/// end of the line and are skipped together with whitespace.
///
/// # Examples
///
/// ```rust
/// use smplc::lexer::{Scanner, Token};
///
/// let mut scanner = Scanner::new("a <= 10");
/// assert_eq!(scanner.next_token()?, Token::Ident("a".to_string()));
/// assert_eq!(scanner.next_token()?, Token::Leq);
/// assert_eq!(scanner.next_token()?, Token::Number(10));
/// # Ok::<(), smplc::Error>(())
/// ```
pub struct Scanner<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    /// Creates a scanner over the given source text.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Returns the current 1-based source line.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// Returns the current 1-based source column.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn skip_trivia(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.source.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Scans and returns the next token.
    ///
    /// Returns [`Token::Eof`] at the end of input; calling again after that
    /// keeps returning [`Token::Eof`].
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedCharacter`] if the input contains a character that
    /// cannot start a token, [`Error::NumberOutOfRange`] if a number literal
    /// overflows.
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();

        let (line, column) = (self.line, self.column);
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        if byte.is_ascii_digit() {
            return self.scan_number(line, column);
        }
        if byte.is_ascii_alphabetic() {
            return Ok(self.scan_word());
        }

        self.bump();
        let token = match byte {
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Times,
            b'/' => Token::Slash,
            b'.' => Token::Period,
            b',' => Token::Comma,
            b';' => Token::Semicolon,
            b'(' => Token::OpenParen,
            b')' => Token::CloseParen,
            b'[' => Token::OpenBracket,
            b']' => Token::CloseBracket,
            b'{' => Token::OpenBrace,
            b'}' => Token::CloseBrace,
            b'=' if self.peek() == Some(b'=') => {
                self.bump();
                Token::Eql
            }
            b'!' if self.peek() == Some(b'=') => {
                self.bump();
                Token::Neq
            }
            b'<' => match self.peek() {
                Some(b'-') => {
                    self.bump();
                    Token::Becomes
                }
                Some(b'=') => {
                    self.bump();
                    Token::Leq
                }
                _ => Token::Lss,
            },
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Geq
                } else {
                    Token::Gtr
                }
            }
            other => {
                return Err(Error::UnexpectedCharacter {
                    character: other as char,
                    line,
                    column,
                })
            }
        };

        Ok(token)
    }

    fn scan_number(&mut self, line: u32, column: u32) -> Result<Token> {
        let mut value: i64 = 0;
        while let Some(byte) = self.peek() {
            if !byte.is_ascii_digit() {
                break;
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(byte - b'0')))
                .ok_or(Error::NumberOutOfRange { line, column })?;
            self.bump();
        }
        Ok(Token::Number(value))
    }

    fn scan_word(&mut self) -> Token {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if !byte.is_ascii_alphanumeric() {
                break;
            }
            self.bump();
        }
        // Source is validated ASCII by the byte checks above.
        let word = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or_default();
        Token::keyword(word).unwrap_or_else(|| Token::Ident(word.to_string()))
    }
}
