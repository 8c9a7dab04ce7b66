//! The shared error vocabulary (§7).
//!
//! `ErrorKind` enumerates every failure kind a TeaScript program can
//! observe. Note that the control-flow signals (`Return`, `Stop`, `Loop`,
//! `Exit`, `Suspend`, `Yield`) are *not* represented here — they are not
//! errors, they travel on a separate channel (`teascript_compiler::Signal`)
//! that only becomes an error if it escapes its semantic boundary (e.g. a
//! `Return` reaching the top level). See `teascript_compiler::eval` and
//! `teascript_compiler::vm`.
//!
//! Grounded on the original TeaScript C++ library's `Error` class
//! (`examples/original_source/include/teascript/Error.hpp`): a minimal
//! `(code, message)` pair with a `"<Name>: <message>"` display form. We
//! extend that with a `SourceLocation` because §7 requires every user-visible
//! error to carry `(file_id, line, col, kind, message)`.

use crate::location::SourceLocation;
use std::fmt;

/// The kind of failure a TeaScript operation produced.
///
/// `#[non_exhaustive]` so that new kinds (e.g. for a future core-library
/// function) can be added without a semver break, the way `Severity` in
/// lint-style enums elsewhere in the ecosystem stays open for extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Syntax or dialect violation found while lexing/parsing.
    ParsingError,
    /// `Context::find`/`assign`/`remove` found no such binding.
    UnknownIdentifier,
    /// `Context::add` was called twice for the same name in one scope.
    RedefinitionOfVariable,
    /// User code tried to define a `_`-prefixed name after bootstrap latched.
    InternalName,
    /// An operation was attempted between incompatible types.
    TypeMismatch,
    /// `get_as_T` was called on a `Value` that cannot represent `T`.
    BadValueCast,
    /// A numeric or indexing operation fell outside representable range.
    OutOfRange,
    /// An assignment targeted a `const` binding.
    ConstAssign,
    /// Integer division or modulo by zero.
    DivByZero,
    /// A generic runtime failure not covered by a more specific kind.
    RuntimeError,
    /// A core-library file operation failed (open/read/write/delete).
    LoadFileError,
    /// An AST-evaluator-specific failure (wraps an inner cause).
    EvalError,
}

impl ErrorKind {
    /// The human-readable name the original library calls `Name()`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ParsingError => "Parsing Error",
            ErrorKind::UnknownIdentifier => "Unknown Identifier",
            ErrorKind::RedefinitionOfVariable => "Redefinition Of Variable",
            ErrorKind::InternalName => "Internal Name",
            ErrorKind::TypeMismatch => "Type Mismatch",
            ErrorKind::BadValueCast => "Bad Value Cast",
            ErrorKind::OutOfRange => "Out Of Range",
            ErrorKind::ConstAssign => "Const Assign",
            ErrorKind::DivByZero => "Division By Zero",
            ErrorKind::RuntimeError => "Runtime Error",
            ErrorKind::LoadFileError => "Load File Error",
            ErrorKind::EvalError => "Eval Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A user-visible TeaScript failure: `(file_id or name, line, col, kind, message)` (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeaError {
    pub kind: ErrorKind,
    pub location: SourceLocation,
    pub message: String,
}

impl TeaError {
    pub fn new(kind: ErrorKind, location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }

    pub fn parsing(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParsingError, location, message)
    }

    pub fn runtime(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, location, message)
    }

    /// Render `"<Name>: <message>"`, matching the original's
    /// `Error::ToDisplayString()`, but with the location prefixed.
    pub fn to_display_string(&self) -> String {
        if self.message.is_empty() {
            format!("{} ({})!", self.kind.name(), self.location)
        } else {
            format!("{} ({}): {}", self.kind.name(), self.location, self.message)
        }
    }

    /// Render a source-line-and-caret diagnostic, the way the library's
    /// pretty-printer does (§7). `source` is the full text the error's
    /// `file_id` refers to; if the line is out of range the plain display
    /// string is returned instead.
    pub fn render_with_source(&self, source: &str) -> String {
        let line_no = self.location.start_line;
        let Some(line) = source.lines().nth(line_no.saturating_sub(1) as usize) else {
            return self.to_display_string();
        };
        let col = self.location.start_col.max(1) as usize;
        let caret = " ".repeat(col - 1) + "^";
        format!("{}\n{}\n{}", self.to_display_string(), line, caret)
    }
}

impl fmt::Display for TeaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl std::error::Error for TeaError {}
