//! File/filesystem and formatted-print leaves (§1 out-of-scope list, §4.11).
//! Each opens, uses, and closes its handle within one call — `std::fs`'s
//! one-shot helpers already guarantee that — except directory iteration,
//! whose passthrough token lives as long as the tuple holding it (not
//! implemented here; §5 Resource scoping documents the contract for a
//! fuller implementation).

use super::{arg, opt_out, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, Value};
use std::fs;
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn print(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "print", loc())?.get_as_string(loc())?;
    print!("{s}");
    Ok(Value::nav())
}

fn println_(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "println", loc())?.get_as_string(loc())?;
    println!("{s}");
    Ok(Value::nav())
}

fn eprint(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "eprint", loc())?.get_as_string(loc())?;
    eprint!("{s}");
    Ok(Value::nav())
}

fn readfile(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let path = arg(&args, 0, "readfile", loc())?.get_as_string(loc())?;
    fs::read_to_string(&path)
        .map(|s| Value::new(Data::String(s)))
        .map_err(|e| TeaError::new(ErrorKind::LoadFileError, loc(), format!("readfile '{path}': {e}")))
}

fn writefile(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let path = arg(&args, 0, "writefile", loc())?.get_as_string(loc())?;
    let content = arg(&args, 1, "writefile", loc())?.get_as_string(loc())?;
    fs::write(&path, content).map(|_| Value::nav()).map_err(|e| TeaError::new(ErrorKind::LoadFileError, loc(), format!("writefile '{path}': {e}")))
}

fn deletefile(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let path = arg(&args, 0, "deletefile", loc())?.get_as_string(loc())?;
    fs::remove_file(&path).map(|_| Value::nav()).map_err(|e| TeaError::new(ErrorKind::LoadFileError, loc(), format!("deletefile '{path}': {e}")))
}

fn file_exists(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let path = arg(&args, 0, "file_exists", loc())?.get_as_string(loc())?;
    Ok(Value::new(Data::Bool(fs::metadata(&path).is_ok())))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "print", arity: Some(1), level: Level::Core, opt_out_mask: opt_out::NO_STDOUT, func: print },
        BuiltinSpec { name: "println", arity: Some(1), level: Level::Core, opt_out_mask: opt_out::NO_STDOUT, func: println_ },
        BuiltinSpec { name: "eprint", arity: Some(1), level: Level::Core, opt_out_mask: opt_out::NO_STDERR, func: eprint },
        BuiltinSpec { name: "readfile", arity: Some(1), level: Level::Full, opt_out_mask: opt_out::NO_FILE_READ, func: readfile },
        BuiltinSpec { name: "writefile", arity: Some(2), level: Level::Full, opt_out_mask: opt_out::NO_FILE_WRITE, func: writefile },
        BuiltinSpec { name: "deletefile", arity: Some(1), level: Level::Full, opt_out_mask: opt_out::NO_FILE_DELETE, func: deletefile },
        BuiltinSpec { name: "file_exists", arity: Some(1), level: Level::Full, opt_out_mask: opt_out::NO_FILE_READ, func: file_exists },
    ]
}
