//! Buffer byte-level accessors (§3, §4.11): typed reads/writes at an offset
//! for the fixed-width integer widths and UTF-8 strings, wrapping
//! [`crate::value::Buffer`]'s typed accessors.

use super::{arg, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, Value};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn with_buffer_mut<R>(v: &Value, who: &'static str, f: impl FnOnce(&mut crate::value::Buffer) -> Result<R, TeaError>) -> Result<R, TeaError> {
    let mut data = v.borrow_mut();
    match &mut *data {
        Data::Buffer(b) => f(b),
        other => Err(TeaError::new(ErrorKind::TypeMismatch, loc(), format!("{who}: expected Buffer, found {}", other.type_name()))),
    }
}

fn buffer_new(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let capacity = arg(&args, 0, "buffer_new", loc())?.get_as_integer(loc())?;
    if capacity < 0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "buffer_new: negative capacity"));
    }
    Ok(Value::new(Data::Buffer(crate::value::Buffer::with_capacity(capacity as usize))))
}

fn buffer_len(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let v = arg(&args, 0, "buffer_len", loc())?;
    let len = with_buffer_mut(v, "buffer_len", |b| Ok(b.len()))?;
    Ok(Value::new(Data::U64(len as u64)))
}

fn buffer_capacity(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let v = arg(&args, 0, "buffer_capacity", loc())?;
    let cap = with_buffer_mut(v, "buffer_capacity", |b| Ok(b.capacity()))?;
    Ok(Value::new(Data::U64(cap as u64)))
}

macro_rules! buffer_rw_builtin {
    ($write_name:literal, $write_fn:ident, $read_name:literal, $read_fn:ident, $write_method:ident, $read_method:ident, $cast:ty, $variant:ident) => {
        fn $write_fn(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
            let v = arg(&args, 0, $write_name, loc())?;
            let offset = arg(&args, 1, $write_name, loc())?.get_as_integer(loc())?;
            let value = arg(&args, 2, $write_name, loc())?.get_as_integer(loc())? as $cast;
            if offset < 0 {
                return Err(TeaError::new(ErrorKind::OutOfRange, loc(), concat!($write_name, ": negative offset")));
            }
            with_buffer_mut(v, $write_name, |b| b.$write_method(offset as usize, value))?;
            Ok(Value::nav())
        }

        fn $read_fn(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
            let v = arg(&args, 0, $read_name, loc())?;
            let offset = arg(&args, 1, $read_name, loc())?.get_as_integer(loc())?;
            if offset < 0 {
                return Err(TeaError::new(ErrorKind::OutOfRange, loc(), concat!($read_name, ": negative offset")));
            }
            let value = with_buffer_mut(v, $read_name, |b| b.$read_method(offset as usize))?;
            Ok(Value::new(Data::$variant(value as _)))
        }
    };
}

buffer_rw_builtin!("buffer_write_u8", buffer_write_u8, "buffer_read_u8", buffer_read_u8, write_u8, read_u8, u8, U8);
buffer_rw_builtin!("buffer_write_u16", buffer_write_u16, "buffer_read_u16", buffer_read_u16, write_u16, read_u16, u16, I64);
buffer_rw_builtin!("buffer_write_u32", buffer_write_u32, "buffer_read_u32", buffer_read_u32, write_u32, read_u32, u32, I64);
buffer_rw_builtin!("buffer_write_i64", buffer_write_i64, "buffer_read_i64", buffer_read_i64, write_i64, read_i64, i64, I64);

fn buffer_write_string(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let v = arg(&args, 0, "buffer_write_string", loc())?;
    let offset = arg(&args, 1, "buffer_write_string", loc())?.get_as_integer(loc())?;
    let s = arg(&args, 2, "buffer_write_string", loc())?.get_as_string(loc())?;
    if offset < 0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "buffer_write_string: negative offset"));
    }
    with_buffer_mut(v, "buffer_write_string", |b| b.write_string(offset as usize, &s))?;
    Ok(Value::nav())
}

fn buffer_read_string(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let v = arg(&args, 0, "buffer_read_string", loc())?;
    let offset = arg(&args, 1, "buffer_read_string", loc())?.get_as_integer(loc())?;
    let len = arg(&args, 2, "buffer_read_string", loc())?.get_as_integer(loc())?;
    if offset < 0 || len < 0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "buffer_read_string: negative offset/len"));
    }
    let s = with_buffer_mut(v, "buffer_read_string", |b| b.read_string(offset as usize, len as usize))?;
    Ok(Value::new(Data::String(s)))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "buffer_new", arity: Some(1), level: Level::Util, opt_out_mask: 0, func: buffer_new },
        BuiltinSpec { name: "buffer_len", arity: Some(1), level: Level::Util, opt_out_mask: 0, func: buffer_len },
        BuiltinSpec { name: "buffer_capacity", arity: Some(1), level: Level::Util, opt_out_mask: 0, func: buffer_capacity },
        BuiltinSpec { name: "buffer_write_u8", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: buffer_write_u8 },
        BuiltinSpec { name: "buffer_read_u8", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: buffer_read_u8 },
        BuiltinSpec { name: "buffer_write_u16", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: buffer_write_u16 },
        BuiltinSpec { name: "buffer_read_u16", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: buffer_read_u16 },
        BuiltinSpec { name: "buffer_write_u32", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: buffer_write_u32 },
        BuiltinSpec { name: "buffer_read_u32", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: buffer_read_u32 },
        BuiltinSpec { name: "buffer_write_i64", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: buffer_write_i64 },
        BuiltinSpec { name: "buffer_read_i64", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: buffer_read_i64 },
        BuiltinSpec { name: "buffer_write_string", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: buffer_write_string },
        BuiltinSpec { name: "buffer_read_string", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: buffer_read_string },
    ]
}
