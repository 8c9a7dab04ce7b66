//! TeaScript Core: language-agnostic primitives
//!
//! This crate holds the pieces of the TeaScript engine that do not know
//! anything about TeaScript values or syntax: positional navigation over
//! source text, source locations, and the vocabulary of error kinds that
//! every other crate in the workspace reports through.
//!
//! # Modules
//!
//! - `cursor`: `SourceCursor`, a read-only positional view over a character
//!   range with line/column tracking and sub-range views.
//! - `location`: `SourceLocation`, the `(file, line, col)` span attached to
//!   every AST node, instruction, and error.
//! - `error`: `ErrorKind` and `TeaError`, the shared error vocabulary.

pub mod cursor;
pub mod error;
pub mod location;

pub use cursor::SourceCursor;
pub use error::{ErrorKind, TeaError};
pub use location::SourceLocation;
