//! # smplc
//!
//! `smplc` is a compiler front-end for the *smpl* language. It parses a small
//! imperative language (variables, arrays, `if`/`while` control flow, expressions
//! and I/O intrinsics) by recursive descent and simultaneously builds a
//! control-flow graph of basic blocks holding static-single-assignment (SSA)
//! instructions.
//!
//! The interesting machinery is the on-the-fly SSA construction: phi functions
//! are inserted at control-flow joins while parsing (no separate
//! dominance-frontier pass), common subexpressions are eliminated within and
//! across dominance relationships, loop-carried values are back-patched once the
//! loop body is fully parsed, and a final fix-up stage renumbers instruction
//! identifiers into a dense range and resolves forward branch targets.
//!
//! # Architecture
//!
//! - [`lexer`] - token definitions and the character-level scanner
//! - [`parser`] - the recursive-descent grammar driver and its diagnostics
//! - [`ir`] - basic blocks, SSA instructions, the block graph, the SSA builder
//!   and the fix-up passes
//! - [`Compilation`] - the high-level entry point tying the stages together
//!
//! # Usage
//!
//! ```rust
//! use smplc::Compilation;
//!
//! let source = "main var a, b; { let a <- 1; let b <- a + 2; call OutputNum(b) }.";
//! let compilation = Compilation::from_source(source)?;
//!
//! for block in compilation.graph().blocks() {
//!     println!("{block}");
//! }
//! # Ok::<(), smplc::Error>(())
//! ```

#![allow(clippy::result_large_err)]

mod compilation;
mod error;

pub mod ir;
pub mod lexer;
pub mod parser;

/// `smplc` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always
/// [`Error`]. Used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `smplc` Error type
///
/// The main error type for all operations in this crate. Syntax violations are
/// terminal (single-shot batch compilation, no recovery); non-fatal findings are
/// reported as [`parser::Diagnostic`] values instead.
pub use error::Error;

/// Main entry point for compiling smpl source text.
///
/// See [`Compilation::from_source`] and [`Compilation::from_file`].
pub use compilation::Compilation;
