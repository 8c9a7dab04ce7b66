//! Error and sequence constructors (§4.11). `_eval`/`eval_file` are *not*
//! registered here: they need a working lexer/parser/evaluator, which would
//! make this crate depend on `teascript-compiler` and cycle back through
//! `Value::Function::Compiled`. `teascript-compiler::corelib_ext` registers
//! those two once the evaluator exists, after this table has loaded.

use super::{arg, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, ErrorValue, IntegerSequence, Value};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn error_ctor(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let code = arg(&args, 0, "_error", loc())?.get_as_integer(loc())?;
    let message = match args.get(1) {
        Some(v) => v.get_as_string(loc())?,
        None => String::new(),
    };
    Ok(Value::new(Data::Error(ErrorValue { code, message })))
}

fn fail(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let code = arg(&args, 0, "fail", loc())?.get_as_integer(loc())?;
    let message = match args.get(1) {
        Some(v) => v.get_as_string(loc())?,
        None => String::new(),
    };
    Err(TeaError::new(ErrorKind::RuntimeError, loc(), if message.is_empty() { format!("fail({code})") } else { format!("fail({code}): {message}") }))
}

fn seq(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let start = arg(&args, 0, "seq", loc())?.get_as_integer(loc())?;
    let end = arg(&args, 1, "seq", loc())?.get_as_integer(loc())?;
    let step = match args.get(2) {
        Some(v) => v.get_as_integer(loc())?,
        None => if end >= start { 1 } else { -1 },
    };
    let s = IntegerSequence::new(start, end, step)?;
    Ok(Value::new(Data::IntegerSequence(s)))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "_error", arity: None, level: Level::Minimal, opt_out_mask: 0, func: error_ctor },
        BuiltinSpec { name: "fail", arity: None, level: Level::Minimal, opt_out_mask: 0, func: fail },
        BuiltinSpec { name: "seq", arity: None, level: Level::Minimal, opt_out_mask: 0, func: seq },
    ]
}
