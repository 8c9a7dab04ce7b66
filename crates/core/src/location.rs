//! Source locations.
//!
//! A `SourceLocation` is attached to every AST node, every compiled
//! instruction, and every error. Locations survive constant folding and
//! dead-code elimination (§4.8): even when the compiler elides an
//! instruction, the location it would have carried is preserved on the
//! instruction that replaces it, so error messages never regress when the
//! optimization level changes.

use std::fmt;

/// A `(file, start, end)` span in source text.
///
/// `file_id` identifies the source unit (a script file, a REPL chunk, or an
/// in-memory string passed to `execute_code`). Line/column numbers are
/// 1-based, matching the convention the TeaScript pretty-printer uses when
/// rendering a caret under the offending column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceLocation {
    /// A zero-width location at a single point.
    pub fn point(file_id: u32, line: u32, col: u32) -> Self {
        Self {
            file_id,
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }

    /// A location spanning two points.
    pub fn span(file_id: u32, start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            file_id,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// The unknown/synthetic location, used for values the core library
    /// produces without a source origin (e.g. constant-folded results).
    pub fn synthetic() -> Self {
        Self::point(0, 0, 0)
    }

    /// Merge two locations into the smallest span covering both.
    pub fn merge(self, other: Self) -> Self {
        Self {
            file_id: self.file_id,
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: other.end_line,
            end_col: other.end_col,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}
