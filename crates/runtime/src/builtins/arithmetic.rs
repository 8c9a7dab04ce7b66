//! Arithmetic helpers beyond the operators the compiler/VM lower directly
//! (§4.11): the VM emits `+ - * / mod` and bit/compare instructions itself,
//! so this module only covers the handful of functions the language exposes
//! as calls — `abs`, `min`, `max`, `sqrt`, `pow`.

use super::{arg, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, Value};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn abs(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let v = arg(&args, 0, "abs", loc())?;
    match &*v.borrow() {
        Data::I64(n) => Ok(Value::new(Data::I64(n.abs()))),
        Data::F64(n) => Ok(Value::new(Data::F64(n.abs()))),
        Data::U8(n) => Ok(Value::new(Data::U8(*n))),
        Data::U64(n) => Ok(Value::new(Data::U64(*n))),
        other => Err(TeaError::new(ErrorKind::TypeMismatch, loc(), format!("abs: {} is not arithmetic", other.type_name()))),
    }
}

fn min(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let a = arg(&args, 0, "min", loc())?.get_as_f64(loc())?;
    let b = arg(&args, 1, "min", loc())?.get_as_f64(loc())?;
    if a <= b {
        Ok(args[0].clone())
    } else {
        Ok(args[1].clone())
    }
}

fn max(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let a = arg(&args, 0, "max", loc())?.get_as_f64(loc())?;
    let b = arg(&args, 1, "max", loc())?.get_as_f64(loc())?;
    if a >= b {
        Ok(args[0].clone())
    } else {
        Ok(args[1].clone())
    }
}

fn sqrt(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let v = arg(&args, 0, "sqrt", loc())?.get_as_f64(loc())?;
    if v < 0.0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "sqrt of a negative number"));
    }
    Ok(Value::new(Data::F64(v.sqrt())))
}

fn pow(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let base = arg(&args, 0, "pow", loc())?.get_as_f64(loc())?;
    let exp = arg(&args, 1, "pow", loc())?.get_as_f64(loc())?;
    Ok(Value::new(Data::F64(base.powf(exp))))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "abs", arity: Some(1), level: Level::Minimal, opt_out_mask: 0, func: abs },
        BuiltinSpec { name: "min", arity: Some(2), level: Level::Minimal, opt_out_mask: 0, func: min },
        BuiltinSpec { name: "max", arity: Some(2), level: Level::Minimal, opt_out_mask: 0, func: max },
        BuiltinSpec { name: "sqrt", arity: Some(1), level: Level::Util, opt_out_mask: 0, func: sqrt },
        BuiltinSpec { name: "pow", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: pow },
    ]
}
