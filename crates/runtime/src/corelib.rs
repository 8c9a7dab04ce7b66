//! Core Library Loader (C11): populates a fresh [`Context`] with type
//! descriptors, constants, native builtins, and TeaScript-source bootstrap
//! fragments, then latches the `_`-prefix protection.
//!
//! Grounded on the teacher's `compiler/src/builtins.rs` registration-table
//! pattern (generalized here into [`crate::builtins`]) and on
//! `examples/original_source/include/teascript/CoreLibrary.hpp`'s staged
//! `level`/opt-out loading model (too large — 123 KB — to transliterate
//! function-by-function; we implement a representative, fully working
//! subset of its registration table instead).

use crate::builtins::{self, Level};
use crate::context::Context;
use crate::typesystem::TypeSystem;
use crate::value::{Data, Value};
use teascript_core::{SourceLocation, TeaError};

/// The current engine version (§6): packed into `_version_combined_number`
/// as `(major<<24)|(minor<<16)|patch`.
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;
pub const API_VERSION: u32 = 1;

const UTIL_FRAGMENT: &str = include_str!("../../../stdlib/util.tea");
const CORE_FRAGMENT: &str = include_str!("../../../stdlib/core.tea");

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

/// Runs a TeaScript source fragment during bootstrap. Implemented by
/// `teascript-compiler`'s AST evaluator (C7) and passed in here so this
/// crate never depends on the compiler.
pub trait FragmentEvaluator {
    fn eval_fragment(&self, ctx: &mut Context, name: &str, source: &str) -> Result<Value, TeaError>;

    /// Hook for compiler-layer natives (`_eval`, `eval_file`) that need the
    /// AST evaluator and so cannot be registered from this crate. Runs after
    /// the source fragments load, still before the bootstrap latch. Default:
    /// nothing extra to register.
    fn register_extra_natives(&self, _ctx: &mut Context) -> Result<(), TeaError> {
        Ok(())
    }
}

/// A no-op evaluator: skips source fragments entirely. Useful for tests of
/// this crate in isolation, where no parser/evaluator is linked in.
pub struct NoFragments;

impl FragmentEvaluator for NoFragments {
    fn eval_fragment(&self, _ctx: &mut Context, _name: &str, _source: &str) -> Result<Value, TeaError> {
        Ok(Value::nav())
    }
}

fn register_type_descriptors(ctx: &mut Context, ts: &TypeSystem) -> Result<(), TeaError> {
    let entries: &[(&str, crate::typesystem::TypeId)] = &[
        ("Bool", ts.bool_type()),
        ("i64", ts.i64_type()),
        ("u64", ts.u64_type()),
        ("u8", ts.u8_type()),
        ("f64", ts.f64_type()),
        ("String", ts.string_type()),
        ("Tuple", ts.tuple_type()),
        ("Buffer", ts.buffer_type()),
        ("Error", ts.error_type()),
        ("IntegerSequence", ts.integer_sequence_type()),
        ("Function", ts.function_type()),
        ("TypeInfo", ts.type_info_type()),
        ("NaV", ts.nav()),
        ("Number", ts.number_concept()),
        ("Const", ts.const_concept()),
    ];
    for (name, id) in entries {
        ctx.add(format!("_type_{name}"), Value::new_const(Data::TypeInfo(*id)), loc())?;
    }
    Ok(())
}

fn register_constants(ctx: &mut Context) -> Result<(), TeaError> {
    ctx.add("void", Value::new_const(Data::NotAValue), loc())?;
    ctx.add("PI", Value::new_const(Data::F64(std::f64::consts::PI)), loc())?;
    ctx.add("_version_major", Value::new_const(Data::U64(VERSION_MAJOR as u64)), loc())?;
    ctx.add("_version_minor", Value::new_const(Data::U64(VERSION_MINOR as u64)), loc())?;
    ctx.add("_version_patch", Value::new_const(Data::U64(VERSION_PATCH as u64)), loc())?;
    let combined = (VERSION_MAJOR << 24) | (VERSION_MINOR << 16) | VERSION_PATCH;
    ctx.add("_version_combined_number", Value::new_const(Data::U64(combined as u64)), loc())?;
    ctx.add("_api_version", Value::new_const(Data::U64(API_VERSION as u64)), loc())?;

    let mut config = crate::tuple::Tuple::new();
    config.append_keyed("version_major".into(), Value::new_const(Data::U64(VERSION_MAJOR as u64)), loc())?;
    config.append_keyed("version_minor".into(), Value::new_const(Data::U64(VERSION_MINOR as u64)), loc())?;
    config.append_keyed("version_patch".into(), Value::new_const(Data::U64(VERSION_PATCH as u64)), loc())?;
    ctx.add("_core_config", Value::new_const(Data::Tuple(config)), loc())?;
    Ok(())
}

/// Bootstraps `ctx` at the given `level`/`opt_out` mask (§4.11), using
/// `evaluator` to run the staged TeaScript source fragments. Idempotent per
/// Context only if called on a fresh one — calling twice on the same
/// Context re-triggers `Context::add`'s duplicate-name rejection, by design
/// (bootstrap is a once-per-instance operation; the idempotence invariant
/// in §8 is about two *separate* Contexts agreeing on the resulting
/// bindings, not about double-loading one).
pub fn bootstrap(ctx: &mut Context, ts: &TypeSystem, level: Level, opt_out: u32, evaluator: &dyn FragmentEvaluator) -> Result<(), TeaError> {
    register_type_descriptors(ctx, ts)?;
    register_constants(ctx)?;
    builtins::register_all(ctx, level, opt_out, loc())?;

    if level >= Level::Util {
        evaluator.eval_fragment(ctx, "util.tea", UTIL_FRAGMENT)?;
    }
    if level >= Level::Core {
        evaluator.eval_fragment(ctx, "core.tea", CORE_FRAGMENT)?;
    }
    evaluator.register_extra_natives(ctx)?;

    ctx.latch_bootstrap();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Dialect;

    #[test]
    fn bootstrap_registers_type_descriptors_and_latches() {
        let mut ctx = Context::new(Dialect::default());
        let ts = TypeSystem::new();
        bootstrap(&mut ctx, &ts, Level::Minimal, 0, &NoFragments).unwrap();
        assert!(ctx.is_defined("_type_i64"));
        assert!(ctx.is_defined("PI"));
        assert!(ctx.bootstrap_complete());
    }

    #[test]
    fn opt_out_suppresses_matching_builtins() {
        let mut ctx = Context::new(Dialect::default());
        let ts = TypeSystem::new();
        bootstrap(&mut ctx, &ts, Level::Core, builtins::opt_out::NO_STDOUT, &NoFragments).unwrap();
        assert!(!ctx.is_defined("print"));
        assert!(ctx.is_defined("eprint"));
    }
}
