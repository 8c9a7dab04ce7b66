//! Value (C3): the runtime value representation.
//!
//! A `Value` is a small wrapper around a reference-counted cell holding the
//! actual discriminated union (`Data`), plus the two orthogonal flags §3
//! describes:
//!
//! - `is_const` — lives on the *binding* (this `Value` instance), not on the
//!   cell, so two bindings that alias the same cell can independently be
//!   const or not (`const y @= x` shares `x`'s cell but only `y` is locked).
//! - "shared" is exposed through [`Value::is_shared`]/[`Value::share_count`]
//!   and is true either because the value was explicitly declared shared
//!   (via [`Value::share`], which backs the `@=` operator) or because its
//!   cell happens to currently have more than one owner.
//!
//! `Value::clone()` (the `Clone` impl) always materializes a fresh cell —
//! "unshared values are copies" (§3) — because Rust's `Clone` is the
//! "give me an independent copy" operation and every other part of this
//! crate relies on that reading. Aliasing is an opt-in, explicit operation:
//! [`Value::share`].

use crate::tuple::Tuple;
use crate::typesystem::TypeId;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use teascript_core::{ErrorKind, SourceLocation, TeaError};

/// A program a compiled `Value::Function` calls into. Implemented by
/// `teascript_compiler`'s VM wrapper; kept as a trait object here so
/// `teascript-runtime` never depends on `teascript-compiler` (the
/// dependency would otherwise cycle, since the compiler needs `Value`).
pub trait CallableProgram: fmt::Debug {
    fn call(&self, entry: u32, ctx: &mut crate::context::Context, args: Vec<Value>) -> Result<Value, TeaError>;
}

pub type NativeFn = Rc<dyn Fn(&mut crate::context::Context, Vec<Value>) -> Result<Value, TeaError>>;

#[derive(Clone)]
pub enum FunctionValue {
    /// A native callback registered by the host or the core-library loader.
    Native { name: String, arity: Option<usize>, func: NativeFn },
    /// An entry point into a compiled program, plus its captured
    /// environment (closure cells, for future closure support — currently
    /// always empty since TeaScript functions close only over globals).
    Compiled { program: Rc<dyn CallableProgram>, entry: u32, name: String },
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionValue::Native { name, .. } => write!(f, "<native fn {name}>"),
            FunctionValue::Compiled { name, entry, .. } => write!(f, "<fn {name}@{entry}>"),
        }
    }
}

impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FunctionValue::Native { func: a, .. }, FunctionValue::Native { func: b, .. }) => Rc::ptr_eq(a, b),
            (
                FunctionValue::Compiled { program: pa, entry: ea, .. },
                FunctionValue::Compiled { program: pb, entry: eb, .. },
            ) => Rc::ptr_eq(pa, pb) && ea == eb,
            _ => false,
        }
    }
}

/// Opaque host-owned datum (§3 `Passthrough`). Assignable and callable in
/// parameter position, never operable upon by TeaScript code itself.
#[derive(Clone)]
pub struct Passthrough(pub Rc<dyn Any>);

impl fmt::Debug for Passthrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<passthrough>")
    }
}

impl PartialEq for Passthrough {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A length-plus-capacity byte vector (§3 `Buffer`). Writes beyond capacity
/// fail; the buffer never auto-grows at user level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Buffer { bytes: Vec::new(), capacity }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let capacity = bytes.len();
        Buffer { bytes, capacity }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn ensure_room(&self, offset: usize, nbytes: usize) -> Result<(), TeaError> {
        if offset + nbytes > self.capacity {
            Err(TeaError::new(
                ErrorKind::OutOfRange,
                SourceLocation::synthetic(),
                format!("buffer write of {nbytes} byte(s) at offset {offset} exceeds capacity {}", self.capacity),
            ))
        } else {
            Ok(())
        }
    }

    /// Append `nbytes` worth of zero-fill or actual bytes, growing `bytes`
    /// up to (but never past) `capacity`.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), TeaError> {
        self.ensure_room(offset, data.len())?;
        if self.bytes.len() < offset + data.len() {
            self.bytes.resize(offset + data.len(), 0);
        }
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: usize, nbytes: usize) -> Result<&[u8], TeaError> {
        if offset + nbytes > self.bytes.len() {
            return Err(TeaError::new(
                ErrorKind::OutOfRange,
                SourceLocation::synthetic(),
                format!("buffer read of {nbytes} byte(s) at offset {offset} exceeds length {}", self.bytes.len()),
            ));
        }
        Ok(&self.bytes[offset..offset + nbytes])
    }

    pub fn write_u8(&mut self, offset: usize, v: u8) -> Result<(), TeaError> {
        self.write_at(offset, &v.to_le_bytes())
    }
    pub fn read_u8(&self, offset: usize) -> Result<u8, TeaError> {
        Ok(self.read_at(offset, 1)?[0])
    }
    pub fn write_i8(&mut self, offset: usize, v: i8) -> Result<(), TeaError> {
        self.write_at(offset, &v.to_le_bytes())
    }
    pub fn read_i8(&self, offset: usize) -> Result<i8, TeaError> {
        Ok(self.read_at(offset, 1)?[0] as i8)
    }
}

macro_rules! buffer_typed_rw {
    ($write:ident, $read:ident, $ty:ty, $n:expr) => {
        impl Buffer {
            pub fn $write(&mut self, offset: usize, v: $ty) -> Result<(), TeaError> {
                self.write_at(offset, &v.to_le_bytes())
            }
            pub fn $read(&self, offset: usize) -> Result<$ty, TeaError> {
                let bytes = self.read_at(offset, $n)?;
                let arr: [u8; $n] = bytes.try_into().expect("length checked above");
                Ok(<$ty>::from_le_bytes(arr))
            }
        }
    };
}

buffer_typed_rw!(write_u16, read_u16, u16, 2);
buffer_typed_rw!(write_i16, read_i16, i16, 2);
buffer_typed_rw!(write_u32, read_u32, u32, 4);
buffer_typed_rw!(write_i32, read_i32, i32, 4);
buffer_typed_rw!(write_u64, read_u64, u64, 8);
buffer_typed_rw!(write_i64, read_i64, i64, 8);

impl Buffer {
    pub fn write_string(&mut self, offset: usize, s: &str) -> Result<(), TeaError> {
        self.write_at(offset, s.as_bytes())
    }
    pub fn read_string(&self, offset: usize, len: usize) -> Result<String, TeaError> {
        let bytes = self.read_at(offset, len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| TeaError::new(ErrorKind::BadValueCast, SourceLocation::synthetic(), "buffer slice is not valid UTF-8"))
    }
}

/// `(start, end, step, current)` with the invariant
/// `step != 0 ∧ sign(step) = sign(end − start)` (or `start == end`) (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerSequence {
    start: i64,
    end: i64,
    step: i64,
    current: i64,
}

impl IntegerSequence {
    pub fn new(start: i64, end: i64, step: i64) -> Result<Self, TeaError> {
        if step == 0 {
            return Err(TeaError::new(ErrorKind::OutOfRange, SourceLocation::synthetic(), "sequence step must not be zero"));
        }
        if start != end && step.signum() != (end - start).signum() {
            return Err(TeaError::new(
                ErrorKind::OutOfRange,
                SourceLocation::synthetic(),
                "sequence step sign must agree with the direction from start to end",
            ));
        }
        Ok(IntegerSequence { start, end, step, current: start })
    }

    pub fn start(&self) -> i64 {
        self.start
    }
    pub fn end(&self) -> i64 {
        self.end
    }
    pub fn step(&self) -> i64 {
        self.step
    }
    pub fn current(&self) -> i64 {
        self.current
    }

    /// Advance, but only if a further term is reachable without
    /// overshooting `end`. Returns the *previous* current value, matching
    /// an iterator-style "give me the term, then move on" contract.
    pub fn next(&mut self) -> Option<i64> {
        let produced = self.current;
        if self.start == self.end {
            // Degenerate single-point sequence: one term, then done.
            if self.current == self.start {
                self.current = self.current.wrapping_add(self.step.max(1));
                return Some(produced);
            }
            return None;
        }
        let within_range = if self.step > 0 { self.current <= self.end } else { self.current >= self.end };
        if !within_range {
            return None;
        }
        let next_val = self.current + self.step;
        let overshoots = if self.step > 0 { next_val > self.end } else { next_val < self.end };
        self.current = if overshoots {
            if self.step > 0 { self.end + 1 } else { self.end - 1 }
        } else {
            next_val
        };
        Some(produced)
    }

    pub fn reset(&mut self) {
        self.current = self.start;
    }
}

/// Host-visible error value (§3 `Error`), distinct from `TeaError`: this is
/// the value a `catch` expression binds, not the propagation channel.
/// Grounded on `examples/original_source/include/teascript/Error.hpp`'s
/// minimal `(code, message)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub code: i64,
    pub message: String,
}

/// The discriminated union of every TeaScript runtime type (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    NotAValue,
    Bool(bool),
    U8(u8),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Buffer(Buffer),
    TypeInfo(TypeId),
    Tuple(Tuple),
    Function(FunctionValue),
    IntegerSequence(IntegerSequence),
    Error(ErrorValue),
    Passthrough(Passthrough),
}

impl Data {
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::NotAValue => "NaV",
            Data::Bool(_) => "Bool",
            Data::U8(_) => "u8",
            Data::I64(_) => "i64",
            Data::U64(_) => "u64",
            Data::F64(_) => "f64",
            Data::String(_) => "String",
            Data::Buffer(_) => "Buffer",
            Data::TypeInfo(_) => "TypeInfo",
            Data::Tuple(_) => "Tuple",
            Data::Function(_) => "Function",
            Data::IntegerSequence(_) => "IntegerSequence",
            Data::Error(_) => "Error",
            Data::Passthrough(_) => "Passthrough",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Data::U8(_) | Data::I64(_) | Data::U64(_) | Data::F64(_))
    }
}

/// The runtime value: a cell of `Data` plus the `const` flag (§3).
pub struct Value {
    cell: Rc<RefCell<Data>>,
    is_const: bool,
    declared_shared: bool,
}

impl Value {
    pub fn new(data: Data) -> Self {
        Value { cell: Rc::new(RefCell::new(data)), is_const: false, declared_shared: false }
    }

    pub fn new_const(data: Data) -> Self {
        Value { cell: Rc::new(RefCell::new(data)), is_const: true, declared_shared: false }
    }

    pub fn nav() -> Self {
        Value::new(Data::NotAValue)
    }

    pub fn is_const(&self) -> bool {
        self.is_const
    }

    pub fn set_const(&mut self, is_const: bool) {
        self.is_const = is_const;
    }

    /// True if this value was declared shared (via `share`) or currently
    /// has more than one owner of its cell.
    pub fn is_shared(&self) -> bool {
        self.declared_shared || Rc::strong_count(&self.cell) > 1
    }

    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.cell)
    }

    /// Produce a new binding aliasing the same cell (backs the `@=`
    /// operator and shared parameter passing). Both the returned value and
    /// `self` are considered shared from this point on.
    pub fn share(&self) -> Value {
        Value { cell: Rc::clone(&self.cell), is_const: false, declared_shared: true }
    }

    /// `@@`: identity-of-cell test.
    pub fn same_cell(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, Data> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, Data> {
        self.cell.borrow_mut()
    }

    /// `assign`: type-aware copy into this binding's cell. Fails with
    /// `ConstAssign` if `self` is const; otherwise every other binding
    /// that shares this cell observes the mutation.
    pub fn assign(&self, source: &Value, loc: SourceLocation) -> Result<(), TeaError> {
        if self.is_const {
            return Err(TeaError::new(ErrorKind::ConstAssign, loc, "cannot assign to a const value"));
        }
        *self.cell.borrow_mut() = source.cell.borrow().clone();
        Ok(())
    }

    /// `shared_assign`: retarget this binding to alias `source`'s cell.
    /// Both sides must already be shared (§9 Open Question: a non-shared
    /// destination fails with `runtime_error`, "value must be shared").
    pub fn shared_assign(&mut self, source: &Value, loc: SourceLocation) -> Result<(), TeaError> {
        if self.is_const {
            return Err(TeaError::new(ErrorKind::ConstAssign, loc, "cannot assign to a const value"));
        }
        if !self.is_shared() || !source.is_shared() {
            return Err(TeaError::new(ErrorKind::RuntimeError, loc, "value must be shared"));
        }
        self.cell = Rc::clone(&source.cell);
        self.declared_shared = true;
        Ok(())
    }

    // --- conversions (§4.3) ---

    pub fn get_as_integer(&self, loc: SourceLocation) -> Result<i64, TeaError> {
        match &*self.borrow() {
            Data::Bool(b) => Ok(if *b { 1 } else { 0 }),
            Data::U8(v) => Ok(*v as i64),
            Data::I64(v) => Ok(*v),
            Data::U64(v) => Ok(*v as i64),
            Data::F64(v) => Ok(*v as i64), // truncates toward zero
            Data::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| TeaError::new(ErrorKind::BadValueCast, loc, format!("cannot convert \"{s}\" to integer"))),
            other => Err(TeaError::new(ErrorKind::BadValueCast, loc, format!("cannot convert {} to integer", other.type_name()))),
        }
    }

    pub fn get_as_bool(&self, loc: SourceLocation) -> Result<bool, TeaError> {
        match &*self.borrow() {
            Data::Bool(b) => Ok(*b),
            Data::U8(v) => Ok(*v != 0),
            Data::I64(v) => Ok(*v != 0),
            Data::U64(v) => Ok(*v != 0),
            Data::F64(v) => Ok(*v != 0.0),
            Data::String(s) => Ok(!s.is_empty()),
            other => Err(TeaError::new(ErrorKind::BadValueCast, loc, format!("cannot convert {} to bool", other.type_name()))),
        }
    }

    pub fn get_as_string(&self, loc: SourceLocation) -> Result<String, TeaError> {
        match &*self.borrow() {
            Data::String(s) => Ok(s.clone()),
            other => self.print_value_inner(other).map_err(|_| {
                TeaError::new(ErrorKind::BadValueCast, loc, format!("cannot convert {} to string", other.type_name()))
            }),
        }
    }

    pub fn get_as_f64(&self, loc: SourceLocation) -> Result<f64, TeaError> {
        match &*self.borrow() {
            Data::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Data::U8(v) => Ok(*v as f64),
            Data::I64(v) => Ok(*v as f64),
            Data::U64(v) => Ok(*v as f64),
            Data::F64(v) => Ok(*v),
            Data::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| TeaError::new(ErrorKind::BadValueCast, loc, format!("cannot convert \"{s}\" to f64"))),
            other => Err(TeaError::new(ErrorKind::BadValueCast, loc, format!("cannot convert {} to f64", other.type_name()))),
        }
    }

    /// Canonical debug rendering.
    pub fn print_value(&self) -> String {
        self.print_value_inner(&self.borrow()).unwrap_or_else(|_| "<unprintable>".to_string())
    }

    fn print_value_inner(&self, data: &Data) -> Result<String, ()> {
        Ok(match data {
            Data::NotAValue => "NaV".to_string(),
            Data::Bool(b) => b.to_string(),
            Data::U8(v) => v.to_string(),
            Data::I64(v) => v.to_string(),
            Data::U64(v) => v.to_string(),
            Data::F64(v) => v.to_string(),
            Data::String(s) => s.clone(),
            Data::Buffer(b) => format!("<Buffer len={} cap={}>", b.len(), b.capacity()),
            Data::TypeInfo(_) => "<TypeInfo>".to_string(),
            Data::Tuple(t) => t.print(0),
            Data::Function(f) => format!("{f:?}"),
            Data::IntegerSequence(s) => format!("seq({},{},{})", s.start(), s.end(), s.step()),
            Data::Error(e) => {
                if e.message.is_empty() {
                    format!("Error({})!", e.code)
                } else {
                    format!("Error({}): {}", e.code, e.message)
                }
            }
            Data::Passthrough(_) => "<Passthrough>".to_string(),
        })
    }
}

impl Clone for Value {
    /// "Unshared values are copies": always materializes a fresh cell.
    /// Constness is *not* carried over — constness belongs to a binding,
    /// and cloning produces a value with no binding yet.
    fn clone(&self) -> Self {
        Value { cell: Rc::new(RefCell::new(self.cell.borrow().clone())), is_const: false, declared_shared: false }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}, const={}, shared={})", self.print_value(), self.is_const, self.is_shared())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        *self.borrow() == *other.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_assignment_fails_and_leaves_value_unchanged() {
        let c = Value::new_const(Data::I64(5));
        let src = Value::new(Data::I64(9));
        let err = c.assign(&src, SourceLocation::synthetic()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConstAssign);
        assert_eq!(c.get_as_integer(SourceLocation::synthetic()).unwrap(), 5);
    }

    #[test]
    fn shared_values_observe_each_others_mutation() {
        let a = Value::new(Data::I64(1));
        let b = a.share();
        assert!(a.is_shared());
        assert!(b.is_shared());
        assert_eq!(a.share_count(), 2);
        assert_eq!(b.share_count(), 2);
        b.assign(&Value::new(Data::I64(42)), SourceLocation::synthetic()).unwrap();
        assert_eq!(a.get_as_integer(SourceLocation::synthetic()).unwrap(), 42);
        assert!(a.same_cell(&b));
    }

    #[test]
    fn shared_assign_onto_non_shared_destination_fails() {
        let shared_src = Value::new(Data::I64(1)).share();
        let mut dest = Value::new(Data::I64(0));
        let err = dest.shared_assign(&shared_src, SourceLocation::synthetic()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert_eq!(err.message, "value must be shared");
    }

    #[test]
    fn unshared_clone_is_independent() {
        let a = Value::new(Data::I64(1));
        let b = a.clone();
        b.assign(&Value::new(Data::I64(2)), SourceLocation::synthetic()).unwrap();
        assert_eq!(a.get_as_integer(SourceLocation::synthetic()).unwrap(), 1);
        assert_eq!(b.get_as_integer(SourceLocation::synthetic()).unwrap(), 2);
    }

    #[test]
    fn integer_sequence_never_overshoots() {
        let mut seq = IntegerSequence::new(0, 10, 3).unwrap();
        let mut out = Vec::new();
        while let Some(v) = seq.next() {
            out.push(v);
        }
        assert_eq!(out, vec![0, 3, 6, 9]);
    }

    #[test]
    fn integer_sequence_rejects_zero_step() {
        assert!(IntegerSequence::new(0, 10, 0).is_err());
    }

    #[test]
    fn buffer_write_beyond_capacity_fails() {
        let mut buf = Buffer::with_capacity(2);
        assert!(buf.write_u8(0, 1).is_ok());
        assert!(buf.write_u8(1, 2).is_ok());
        assert!(buf.write_u8(2, 3).is_err());
    }
}
