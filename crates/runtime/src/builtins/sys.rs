//! Time and random helpers (§4.11). These are host leaves per §1's
//! out-of-scope list ("time/random helpers") — a reimplementer may re-skin
//! them; we provide a working default using `rand`, the same crate the
//! teacher pulls in for its own randomized test fixtures.

use super::{arg, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, Value};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn clock(_ctx: &mut Context, _args: Vec<Value>) -> Result<Value, TeaError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TeaError::new(ErrorKind::RuntimeError, loc(), "system clock is before the Unix epoch"))?;
    Ok(Value::new(Data::U64(now.as_millis() as u64)))
}

fn rand_int(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let lo = arg(&args, 0, "rand_int", loc())?.get_as_integer(loc())?;
    let hi = arg(&args, 1, "rand_int", loc())?.get_as_integer(loc())?;
    if lo > hi {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "rand_int: low bound greater than high bound"));
    }
    let n = rand::thread_rng().gen_range(lo..=hi);
    Ok(Value::new(Data::I64(n)))
}

fn rand_float(_ctx: &mut Context, _args: Vec<Value>) -> Result<Value, TeaError> {
    Ok(Value::new(Data::F64(rand::thread_rng().gen_range(0.0..1.0))))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "clock", arity: Some(0), level: Level::Util, opt_out_mask: 0, func: clock },
        BuiltinSpec { name: "rand_int", arity: Some(2), level: Level::Util, opt_out_mask: 0, func: rand_int },
        BuiltinSpec { name: "rand_float", arity: Some(0), level: Level::Util, opt_out_mask: 0, func: rand_float },
    ]
}
