use thiserror::Error;

macro_rules! syntax_error {
    // Single string version
    ($line:expr, $column:expr, $msg:expr) => {
        crate::Error::Syntax {
            message: $msg.to_string(),
            line: $line,
            column: $column,
        }
    };

    // Format string with arguments version
    ($line:expr, $column:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Syntax {
            message: format!($fmt, $($arg)*),
            line: $line,
            column: $column,
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Compilation is single-shot: the first structural violation aborts the current input unit,
/// so every variant here is terminal. Recoverable conditions (an uninitialized variable read,
/// a skipped function body) are not errors - they surface as [`crate::parser::Diagnostic`]
/// values on the finished compilation instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A grammar expectation was violated.
    ///
    /// Raised at the point of detection - wrong token, unclosed parenthesis, missing
    /// relation operator. Carries the source position where the violation was found.
    #[error("SyntaxError - {line}:{column}: {message}")]
    Syntax {
        /// Description of the expectation that was violated
        message: String,
        /// 1-based source line of the offending token
        line: u32,
        /// 1-based source column of the offending token
        column: u32,
    },

    /// The scanner hit a character that can never start a token.
    #[error("SyntaxError - {line}:{column}: unexpected character {character:?}")]
    UnexpectedCharacter {
        /// The offending character
        character: char,
        /// 1-based source line
        line: u32,
        /// 1-based source column
        column: u32,
    },

    /// A number literal does not fit the value range.
    #[error("SyntaxError - {line}:{column}: number literal out of range")]
    NumberOutOfRange {
        /// 1-based source line
        line: u32,
        /// 1-based source column
        column: u32,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised while reading a source file from disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}

pub(crate) use syntax_error;
