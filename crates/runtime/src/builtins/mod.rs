//! The core-library binding table (C11 Design Notes): a registration array
//! `(name, arity, fn_ptr, level, opt_out_mask)` iterated at bootstrap,
//! replacing what the original library implements as "a large switch-like
//! enumeration". Grounded on the teacher's (navicore-cem3) `builtins.rs`,
//! which builds its effect table the same way — a `Vec`/slice of specs
//! assembled in one place and walked once, rather than branching per call
//! site.

pub mod arithmetic;
pub mod buffers;
pub mod errors;
pub mod io;
pub mod strings;
pub mod sys;
pub mod tuples;

use crate::context::Context;
use crate::value::Value;
use teascript_core::TeaError;

/// Staged bootstrap depth (§4.11): later levels load a strict superset of
/// earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Minimal,
    Util,
    Core,
    Full,
}

/// Bitmask of optional core-library capabilities a host may suppress.
pub mod opt_out {
    pub const NO_STDOUT: u32 = 1 << 0;
    pub const NO_STDERR: u32 = 1 << 1;
    pub const NO_FILE_READ: u32 = 1 << 2;
    pub const NO_FILE_WRITE: u32 = 1 << 3;
    pub const NO_FILE_DELETE: u32 = 1 << 4;
    pub const NO_EVAL: u32 = 1 << 5;
}

pub type BuiltinFn = fn(&mut Context, Vec<Value>) -> Result<Value, TeaError>;

pub struct BuiltinSpec {
    pub name: &'static str,
    /// `None` means variadic.
    pub arity: Option<usize>,
    pub level: Level,
    /// Set of `opt_out` bits that, if any are set in the host's mask,
    /// suppress registration of this entry.
    pub opt_out_mask: u32,
    pub func: BuiltinFn,
}

/// Registers every builtin whose `level` is at or below `level` and whose
/// `opt_out_mask` does not intersect `opt_out`. Idempotent per the same
/// `(level, opt_out)` pair, since `Context::add` on a name already added in
/// this scope would fail — callers must only call this once per Context.
pub fn register_all(ctx: &mut Context, level: Level, opt_out: u32, loc: teascript_core::SourceLocation) -> Result<(), TeaError> {
    for spec in all_specs() {
        if spec.level > level {
            continue;
        }
        if spec.opt_out_mask & opt_out != 0 {
            continue;
        }
        let func = crate::value::FunctionValue::Native {
            name: spec.name.to_string(),
            arity: spec.arity,
            func: native_thunk(spec.func),
        };
        ctx.add(spec.name, Value::new(crate::value::Data::Function(func)), loc)?;
    }
    Ok(())
}

fn native_thunk(f: BuiltinFn) -> crate::value::NativeFn {
    std::rc::Rc::new(move |ctx: &mut Context, args: Vec<Value>| f(ctx, args))
}

/// Fetch positional argument `i`, or fail with a `runtime_error` naming the
/// builtin that needed it. Every builtin below uses this instead of
/// indexing, since a wrong-arity native call is a script bug, not a panic.
pub fn arg<'a>(args: &'a [Value], i: usize, who: &'static str, loc: teascript_core::SourceLocation) -> Result<&'a Value, TeaError> {
    args.get(i)
        .ok_or_else(|| TeaError::new(teascript_core::ErrorKind::RuntimeError, loc, format!("{who}: missing argument {i}")))
}

fn all_specs() -> Vec<BuiltinSpec> {
    let mut v = Vec::new();
    v.extend(arithmetic::specs());
    v.extend(strings::specs());
    v.extend(tuples::specs());
    v.extend(buffers::specs());
    v.extend(sys::specs());
    v.extend(io::specs());
    v.extend(errors::specs());
    v
}
