//! String utilities (§3, §4.11): bytes and glyphs are distinct and both
//! observable. `strlen` counts bytes; `glyphs` counts Unicode scalar values;
//! `strat` indexes by byte but always returns the complete code point that
//! byte falls within.

use super::{arg, BuiltinSpec, Level};
use crate::context::Context;
use crate::value::{Data, Value};
use teascript_core::{ErrorKind, SourceLocation, TeaError};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn strlen(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "strlen", loc())?.get_as_string(loc())?;
    Ok(Value::new(Data::U64(s.len() as u64)))
}

fn glyphs(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "glyphs", loc())?.get_as_string(loc())?;
    Ok(Value::new(Data::U64(s.chars().count() as u64)))
}

/// Find the byte range `[lo, hi)` of the code point that byte index
/// `byte_idx` falls within (or starts). Clamps `byte_idx` into range.
fn enclosing_codepoint_range(s: &str, byte_idx: usize) -> (usize, usize) {
    let byte_idx = byte_idx.min(s.len().saturating_sub(1).max(0));
    let mut lo = byte_idx;
    while lo > 0 && !s.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = lo + 1;
    while hi < s.len() && !s.is_char_boundary(hi) {
        hi += 1;
    }
    (lo, hi)
}

fn strat(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "strat", loc())?.get_as_string(loc())?;
    let idx = arg(&args, 1, "strat", loc())?.get_as_integer(loc())?;
    if idx < 0 || idx as usize >= s.len() {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), format!("strat: byte index {idx} out of range")));
    }
    let (lo, hi) = enclosing_codepoint_range(&s, idx as usize);
    Ok(Value::new(Data::String(s[lo..hi].to_string())))
}

fn substr(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "substr", loc())?.get_as_string(loc())?;
    let start = arg(&args, 1, "substr", loc())?.get_as_integer(loc())?;
    let len = arg(&args, 2, "substr", loc())?.get_as_integer(loc())?;
    if start < 0 || len < 0 || (start as usize) > s.len() || (start as usize + len as usize) > s.len() {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "substr: range out of bounds"));
    }
    let (start, len) = (start as usize, len as usize);
    if !s.is_char_boundary(start) || !s.is_char_boundary(start + len) {
        return Err(TeaError::new(ErrorKind::OutOfRange, loc(), "substr: range splits a code point"));
    }
    Ok(Value::new(Data::String(s[start..start + len].to_string())))
}

fn toupper(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "toupper", loc())?.get_as_string(loc())?;
    Ok(Value::new(Data::String(s.to_uppercase())))
}

fn tolower(_ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
    let s = arg(&args, 0, "tolower", loc())?.get_as_string(loc())?;
    Ok(Value::new(Data::String(s.to_lowercase())))
}

pub fn specs() -> Vec<BuiltinSpec> {
    vec![
        BuiltinSpec { name: "strlen", arity: Some(1), level: Level::Minimal, opt_out_mask: 0, func: strlen },
        BuiltinSpec { name: "glyphs", arity: Some(1), level: Level::Minimal, opt_out_mask: 0, func: glyphs },
        BuiltinSpec { name: "strat", arity: Some(2), level: Level::Minimal, opt_out_mask: 0, func: strat },
        BuiltinSpec { name: "substr", arity: Some(3), level: Level::Util, opt_out_mask: 0, func: substr },
        BuiltinSpec { name: "toupper", arity: Some(1), level: Level::Util, opt_out_mask: 0, func: toupper },
        BuiltinSpec { name: "tolower", arity: Some(1), level: Level::Util, opt_out_mask: 0, func: tolower },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strat_returns_full_codepoint_mid_sequence() {
        // "é" is 2 bytes in UTF-8; index 1 is the second byte of it.
        let s = "h\u{e9}llo".to_string();
        let (lo, hi) = enclosing_codepoint_range(&s, 2);
        assert_eq!(&s[lo..hi], "\u{e9}");
    }

    #[test]
    fn byte_len_is_at_least_glyph_count() {
        let s = "h\u{e9}llo".to_string();
        assert!(s.len() >= s.chars().count());
    }
}
