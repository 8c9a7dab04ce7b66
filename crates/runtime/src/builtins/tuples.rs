//! Tuple operations exposed as core-library calls (§3, §4.4). The compiler
//! lowers `.` / `[]` access directly, but in-place structural edits go
//! through these so they participate in shared-mutation semantics (S4).

use super::{arg, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, Value};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn with_tuple_mut<R>(v: &Value, who: &'static str, f: impl FnOnce(&mut crate::tuple::Tuple) -> Result<R, TeaError>) -> Result<R, TeaError> {
    let mut data = v.borrow_mut();
    match &mut *data {
        Data::Tuple(t) => f(t),
        other => Err(TeaError::new(ErrorKind::TypeMismatch, loc(), format!("{who}: expected Tuple, found {}", other.type_name()))),
    }
}

fn tuple_set(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let target = arg(&args, 0, "_tuple_set", loc())?;
    let index = arg(&args, 1, "_tuple_set", loc())?.get_as_integer(loc())?;
    let value = arg(&args, 2, "_tuple_set", loc())?.clone();
    if index < 0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "_tuple_set: negative index"));
    }
    with_tuple_mut(target, "_tuple_set", |t| t.set_index(index as usize, value, loc()))?;
    Ok(Value::nav())
}

fn tuple_get(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let target = arg(&args, 0, "_tuple_get", loc())?;
    let index = arg(&args, 1, "_tuple_get", loc())?.get_as_integer(loc())?;
    if index < 0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "_tuple_get: negative index"));
    }
    with_tuple_mut(target, "_tuple_get", |t| {
        t.get_index(index as usize).cloned().ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc(), "_tuple_get: index out of range"))
    })
}

fn tuple_append(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let target = arg(&args, 0, "tuple_append", loc())?;
    let value = arg(&args, 1, "tuple_append", loc())?.clone();
    let idx = with_tuple_mut(target, "tuple_append", |t| Ok(t.append(value)))?;
    Ok(Value::new(Data::U64(idx as u64)))
}

fn tuple_remove(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let target = arg(&args, 0, "tuple_remove", loc())?;
    let index = arg(&args, 1, "tuple_remove", loc())?.get_as_integer(loc())?;
    if index < 0 {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "tuple_remove: negative index"));
    }
    with_tuple_mut(target, "tuple_remove", |t| t.remove_at(index as usize, loc()))
}

fn tuple_len(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let target = arg(&args, 0, "tuple_len", loc())?;
    let len = with_tuple_mut(target, "tuple_len", |t| Ok(t.len()))?;
    Ok(Value::new(Data::U64(len as u64)))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "_tuple_set", arity: Some(3), level: Level::Minimal, opt_out_mask: 0, func: tuple_set },
        BuiltinSpec { name: "_tuple_get", arity: Some(2), level: Level::Minimal, opt_out_mask: 0, func: tuple_get },
        BuiltinSpec { name: "tuple_append", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: tuple_append },
        BuiltinSpec { name: "tuple_remove", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: tuple_remove },
        BuiltinSpec { name: "tuple_len", arity: Some(1), level: Level::Minimal, opt_out_mask: 0, func: tuple_len },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use teascript_core::SourceLocation;

    #[test]
    fn tuple_set_observed_through_shared_alias() {
        let mut t = crate::tuple::Tuple::new();
        t.append(Value::new(Data::I64(1)));
        t.append(Value::new(Data::I64(2)));
        let owner = Value::new(Data::Tuple(t));
        let alias = owner.share();
        let mut ctx = Context::new(crate::context::Dialect::default());
        tuple_set(&mut ctx, vec![alias, Value::new(Data::I64(0)), Value::new(Data::I64(99))]).unwrap();
        match &*owner.borrow() {
            Data::Tuple(t) => assert_eq!(t.get_index(0).unwrap().get_as_integer(SourceLocation::synthetic()).unwrap(), 99),
            _ => panic!("expected tuple"),
        }
    }
}
