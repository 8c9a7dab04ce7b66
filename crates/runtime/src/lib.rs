//! TeaScript Runtime: the value model (`Value`/`Data`), the type system
//! registry, `Tuple`, and the `Context` scope stack.
//!
//! This crate has no knowledge of lexing, parsing, or bytecode — it is the
//! substrate `teascript-compiler` evaluates and compiles against. The only
//! seam back toward the compiler is [`value::CallableProgram`], a trait
//! object so a `Value::Function::Compiled` can hold an entry point into a
//! program without this crate depending on `teascript-compiler`.

pub mod builtins;
pub mod context;
pub mod corelib;
pub mod tuple;
pub mod typesystem;
pub mod value;

pub use context::{Context, Dialect};
pub use corelib::{bootstrap, FragmentEvaluator, NoFragments};
pub use tuple::Tuple;
pub use typesystem::{TypeId, TypeInfo, TypeSystem};
pub use value::{Buffer, CallableProgram, Data, ErrorValue, FunctionValue, IntegerSequence, NativeFn, Passthrough, Value};
