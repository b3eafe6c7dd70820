//! Top-level compilation entry point.

use std::path::Path;

use crate::ir::{render_dot, BlockGraph};
use crate::parser::{Diagnostic, Parser};
use crate::Result;

/// A finished compilation: the SSA block graph plus any non-fatal
/// diagnostics collected along the way.
///
/// # Examples
///
/// ```rust
/// use smplc::Compilation;
///
/// let compilation = Compilation::from_source(
///     "main var a; { let a <- 2 * 3; call OutputNum(a) }.",
/// )?;
/// assert!(compilation.diagnostics().is_empty());
/// println!("{}", compilation.to_dot());
/// # Ok::<(), smplc::Error>(())
/// ```
#[derive(Debug)]
pub struct Compilation {
    graph: BlockGraph,
    diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    /// Compiles the given source text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed tokens or grammar violations.
    pub fn from_source(source: &str) -> Result<Self> {
        let (graph, diagnostics) = Parser::new(source)?.parse()?;
        Ok(Self { graph, diagnostics })
    }

    /// Reads and compiles a source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the source fails to
    /// compile.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_source(&source)
    }

    /// The finished block graph.
    #[must_use]
    pub const fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    /// Non-fatal findings reported during compilation.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Renders the block graph in Graphviz `dot` syntax.
    #[must_use]
    pub fn to_dot(&self) -> String {
        render_dot(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_source() {
        let compilation =
            Compilation::from_source("main var a; { let a <- 1; call OutputNum(a) }.").unwrap();
        assert!(compilation.diagnostics().is_empty());
        assert!(compilation.to_dot().starts_with("digraph blocks {"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Compilation::from_file("/nonexistent/program.smpl").unwrap_err();
        assert!(matches!(err, crate::Error::FileError(_)));
    }
}
