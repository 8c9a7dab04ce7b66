//! The stack VM (C9): executes a [`VmProgram`] produced by `crate::codegen`.
//!
//! `Call` dispatch reuses Rust's own call stack — `VmProgram::call` spawns a
//! fresh [`Vm`] per invocation rather than pushing an explicit frame onto a
//! frame array — a deliberate simplification relative to a literal
//! frame-stack design; nothing here needs to inspect frames from the
//! outside, so the host language's own recursion does the job. [`Boundary`]
//! mirrors the exact simplification `crate::eval::AstProgram::call` already
//! makes at a function-call edge: `Suspend`/`Yield`/`_Exit` are the
//! coroutine contract at the top level and an error inside a function body,
//! `return` is the reverse, by construction identical on both backends
//! (§8's tree-walk/VM equivalence property).

use crate::ast::{BinaryOp, UnaryOp};
use crate::codegen::{CompiledFunction, Instr, VmProgram};
use crate::eval::{self, Signal, StepResult};
use std::rc::Rc;
use std::time::Instant;
use teascript_core::{ErrorKind, SourceLocation, TeaError};
use teascript_runtime::{CallableProgram, Context, Data, FunctionValue, Tuple, Value};

/// Re-wraps a fresh `Rc<dyn CallableProgram>` around the program each time a
/// `func` statement executes (rather than caching one per entry) — one Rc
/// allocation, correctness-first, matching the spec's explicit non-goal of
/// VM performance tuning.
#[derive(Debug)]
pub struct VmCallable(pub Rc<VmProgram>);

impl CallableProgram for VmCallable {
    fn call(&self, entry: u32, ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
        let program = Rc::clone(&self.0);
        let cf: Rc<CompiledFunction> = program
            .functions
            .get(&entry)
            .cloned()
            .ok_or_else(|| TeaError::new(ErrorKind::RuntimeError, SourceLocation::synthetic(), format!("no compiled function at entry {entry}")))?;
        let mut guard = ctx.enter_scope_guarded();
        guard.ctx().set_param_list(args);
        for p in &cf.params {
            let mut v = guard.ctx().consume_param(p.loc)?;
            let is_const = if p.is_auto { false } else { p.is_const };
            v.set_const(is_const);
            guard.ctx().add(p.name.clone(), v, p.loc)?;
        }
        let mut vm = Vm::new();
        match vm.run(guard.ctx(), &program, &cf.code, Boundary::FunctionBody)? {
            ExecStop::Returned(v) => Ok(v),
            other => Err(TeaError::new(ErrorKind::RuntimeError, SourceLocation::synthetic(), format!("{other:?} escaped a function body"))),
        }
    }
}

/// What `Suspend`/`Yield`/`_Exit`/`return` mean at the point a `Vm::run`
/// call is entered — see module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    TopLevel,
    FunctionBody,
}

/// Why `Vm::run` stopped. `Suspended`/`Yielded` only ever come back under
/// `Boundary::TopLevel`; `Returned` only under `Boundary::FunctionBody`.
#[derive(Debug)]
pub enum ExecStop {
    Returned(Value),
    Suspended,
    Yielded(Value),
    Exited(Value),
    /// Instruction or wall-clock budget exhausted mid-program; `pc` marks
    /// where to resume (used by `CoroutineEngine`'s `run_for`).
    BudgetExceeded,
}

/// An execution cap, checked once per instruction (§4.9). Correctness-first,
/// not performance-tuned — a budget of `None`/`None` runs unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Budget {
    pub max_instructions: Option<u64>,
    pub deadline: Option<Instant>,
}

impl Budget {
    pub fn unbounded() -> Self {
        Budget::default()
    }
}

struct IterFrame {
    items: Vec<Value>,
    next: usize,
}

/// Holds the value stack, instruction pointer, and the live iterator frames
/// `forall` uses. Persisted across `run`/`run_for` calls by whoever owns a
/// `Vm` long-term (`CoroutineEngine`) so a `suspend`/`yield` resumes with
/// its stack exactly where it left off.
pub struct Vm {
    stack: Vec<Value>,
    pc: usize,
    iters: Vec<IterFrame>,
}

impl Vm {
    pub fn new() -> Self {
        Vm { stack: Vec::new(), pc: 0, iters: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.stack.clear();
        self.pc = 0;
        self.iters.clear();
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    fn pop(&mut self, loc: SourceLocation) -> Result<Value, TeaError> {
        self.stack.pop().ok_or_else(|| TeaError::new(ErrorKind::RuntimeError, loc, "VM stack underflow"))
    }

    fn top(&self, loc: SourceLocation) -> Result<&Value, TeaError> {
        self.stack.last().ok_or_else(|| TeaError::new(ErrorKind::RuntimeError, loc, "VM stack underflow"))
    }

    pub fn run(&mut self, ctx: &mut Context, program: &Rc<VmProgram>, code: &crate::codegen::Program, boundary: Boundary) -> Result<ExecStop, TeaError> {
        self.run_budgeted(ctx, program, code, boundary, Budget::unbounded())
    }

    pub fn run_budgeted(
        &mut self,
        ctx: &mut Context,
        program: &Rc<VmProgram>,
        code: &crate::codegen::Program,
        boundary: Boundary,
        budget: Budget,
    ) -> Result<ExecStop, TeaError> {
        let mut executed: u64 = 0;
        loop {
            if self.pc >= code.instrs.len() {
                let v = self.stack.pop().unwrap_or_else(Value::nav);
                return Ok(ExecStop::Returned(v));
            }
            if let Some(max) = budget.max_instructions {
                if executed >= max {
                    return Ok(ExecStop::BudgetExceeded);
                }
            }
            if let Some(deadline) = budget.deadline {
                if Instant::now() >= deadline {
                    return Ok(ExecStop::BudgetExceeded);
                }
            }
            executed += 1;
            let loc = code.locations[self.pc];
            ctx.set_breadcrumb(loc);
            let instr = code.instrs[self.pc].clone();
            self.pc += 1;
            match instr {
                Instr::PushLit(lit) => self.stack.push(literal_value(&lit)),
                Instr::PushStr(s) => self.stack.push(Value::new(Data::String(s))),
                Instr::BuildString(n) => {
                    let mut parts = Vec::with_capacity(n);
                    for _ in 0..n {
                        parts.push(self.pop(loc)?);
                    }
                    parts.reverse();
                    let mut out = String::new();
                    for p in parts {
                        out.push_str(&p.get_as_string(loc)?);
                    }
                    self.stack.push(Value::new(Data::String(out)));
                }
                Instr::PushNav => self.stack.push(Value::nav()),
                Instr::LoadVar(name) => {
                    let v = ctx.find(&name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))?;
                    self.stack.push(v.clone());
                }
                Instr::LoadVarShared(name) => {
                    let v = ctx.find(&name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))?;
                    self.stack.push(v.share());
                }
                Instr::StoreVar { name, shared } => {
                    let v = self.top(loc)?.clone_for_store();
                    ctx.assign(&name, &v, shared, loc)?;
                }
                Instr::DefVar { name, is_const, shared: _ } => {
                    let mut v = self.pop(loc)?;
                    v.set_const(is_const);
                    ctx.add(name, v, loc)?;
                }
                Instr::ShareTop => {
                    let v = self.pop(loc)?;
                    self.stack.push(v.share());
                }
                Instr::Undef(name) => {
                    ctx.remove(&name, loc)?;
                    self.stack.push(Value::nav());
                }
                Instr::IsDefined(name) => self.stack.push(Value::new(Data::Bool(ctx.is_defined(&name)))),
                Instr::DebugStmt => {
                    let v = self.pop(loc)?;
                    tracing::debug!(location = ?loc, value = %v.print_value(), "debug");
                    self.stack.push(Value::nav());
                }
                Instr::Pop => {
                    self.pop(loc)?;
                }
                Instr::UnOp(op) => {
                    let v = self.pop(loc)?;
                    self.stack.push(eval_unary(op, &v, loc)?);
                }
                Instr::BinOp(op) => {
                    let b = self.pop(loc)?;
                    let a = self.pop(loc)?;
                    self.stack.push(eval_binop(op, &a, &b, loc)?);
                }
                Instr::ToBool => {
                    let v = self.pop(loc)?;
                    self.stack.push(Value::new(Data::Bool(v.get_as_bool(loc)?)));
                }
                Instr::Jump(target) => self.pc = target,
                Instr::JumpIfFalse(target) => {
                    let v = self.pop(loc)?;
                    if !v.get_as_bool(loc)? {
                        self.pc = target;
                    }
                }
                Instr::JumpIfTrue(target) => {
                    let v = self.pop(loc)?;
                    if v.get_as_bool(loc)? {
                        self.pc = target;
                    }
                }
                Instr::EnterScope => ctx.enter_scope(),
                Instr::ExitScope => ctx.exit_scope()?,
                Instr::IterStart => {
                    let v = self.pop(loc)?;
                    let items = eval::iterable_items(&v, loc)?;
                    self.iters.push(IterFrame { items, next: 0 });
                }
                Instr::IterNext(jump_if_done) => {
                    let frame = self.iters.last_mut().expect("IterNext with no active iterator");
                    if frame.next < frame.items.len() {
                        self.stack.push(frame.items[frame.next].clone());
                        frame.next += 1;
                    } else {
                        self.pc = jump_if_done;
                    }
                }
                Instr::IterEnd => {
                    self.iters.pop();
                }
                Instr::Return => {
                    let v = self.pop(loc)?;
                    if boundary != Boundary::FunctionBody {
                        return Err(TeaError::new(ErrorKind::RuntimeError, loc, "return without enclosing function"));
                    }
                    return Ok(ExecStop::Returned(v));
                }
                Instr::Suspend => {
                    self.pop(loc)?;
                    if boundary != Boundary::TopLevel {
                        return Err(TeaError::new(ErrorKind::RuntimeError, loc, "suspend escaped a function body"));
                    }
                    return Ok(ExecStop::Suspended);
                }
                Instr::Yield => {
                    let v = self.pop(loc)?;
                    if boundary != Boundary::TopLevel {
                        return Err(TeaError::new(ErrorKind::RuntimeError, loc, "yield escaped a function body"));
                    }
                    return Ok(ExecStop::Yielded(v));
                }
                Instr::ExitProgram => {
                    let v = self.pop(loc)?;
                    if boundary != Boundary::TopLevel {
                        return Err(TeaError::new(ErrorKind::RuntimeError, loc, "_Exit escaped a function body"));
                    }
                    return Ok(ExecStop::Exited(v));
                }
                Instr::Call(nargs) => {
                    let mut args = Vec::with_capacity(nargs);
                    for _ in 0..nargs {
                        args.push(self.pop(loc)?);
                    }
                    args.reverse();
                    let callee = self.pop(loc)?;
                    let fv = match &*callee.borrow() {
                        Data::Function(f) => f.clone(),
                        other => return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("{} is not callable", other.type_name()))),
                    };
                    let result = match fv {
                        FunctionValue::Native { func, arity, name } => {
                            if let Some(n) = arity {
                                if n != args.len() {
                                    return Err(TeaError::new(ErrorKind::RuntimeError, loc, format!("'{name}' expects {n} argument(s), got {}", args.len())));
                                }
                            }
                            func(ctx, args)?
                        }
                        FunctionValue::Compiled { program: callee_program, entry, .. } => callee_program.call(entry, ctx, args)?,
                    };
                    self.stack.push(result);
                }
                Instr::MakeFunction { name, entry } => {
                    let callable: Rc<dyn CallableProgram> = Rc::new(VmCallable(Rc::clone(program)));
                    let fval = Value::new_const(Data::Function(FunctionValue::Compiled { program: callable, entry, name: name.clone() }));
                    ctx.add(name, fval, loc)?;
                }
                Instr::GetKey(name) => {
                    let t = self.pop(loc)?;
                    let data = t.borrow();
                    let Data::Tuple(tup) = &*data else {
                        return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("cannot access field '{name}' of a {}", data.type_name())));
                    };
                    let v = tup.get_key(&name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("no such tuple key '{name}'")))?.clone();
                    drop(data);
                    self.stack.push(v);
                }
                Instr::GetIndex => {
                    let idx_val = self.pop(loc)?;
                    let t = self.pop(loc)?;
                    let data = t.borrow();
                    let Data::Tuple(tup) = &*data else {
                        return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("cannot index a {}", data.type_name())));
                    };
                    let idx = idx_val.get_as_integer(loc)? as usize;
                    let v = tup.get_index(idx).ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc, format!("tuple index {idx} out of range")))?.clone();
                    drop(data);
                    self.stack.push(v);
                }
                Instr::MakeTuple(keys) => {
                    let mut values = Vec::with_capacity(keys.len());
                    for _ in 0..keys.len() {
                        values.push(self.pop(loc)?);
                    }
                    values.reverse();
                    let mut tup = Tuple::new();
                    for (key, val) in keys.into_iter().zip(values) {
                        match key {
                            Some(k) => {
                                tup.append_keyed(k, val, loc)?;
                            }
                            None => {
                                tup.append(val);
                            }
                        }
                    }
                    self.stack.push(Value::new(Data::Tuple(tup)));
                }
                Instr::AsCast(type_name) => {
                    let v = self.pop(loc)?;
                    let out = match type_name.as_str() {
                        "i64" => Data::I64(v.get_as_integer(loc)?),
                        "u64" => Data::U64(v.get_as_integer(loc)? as u64),
                        "u8" => Data::U8(v.get_as_integer(loc)? as u8),
                        "f64" => Data::F64(v.get_as_f64(loc)?),
                        "Bool" => Data::Bool(v.get_as_bool(loc)?),
                        "String" => Data::String(v.get_as_string(loc)?),
                        other => return Err(TeaError::new(ErrorKind::BadValueCast, loc, format!("unknown cast target type '{other}'"))),
                    };
                    self.stack.push(Value::new(out));
                }
                Instr::IsCheck(type_name) => {
                    let v = self.pop(loc)?;
                    let data = v.borrow();
                    let matches = match type_name.as_str() {
                        "Array" => matches!(&*data, Data::Tuple(t) if t.is_array()),
                        "Record" => matches!(&*data, Data::Tuple(t) if !t.is_array()),
                        other => data.type_name() == other,
                    };
                    drop(data);
                    self.stack.push(Value::new(Data::Bool(matches)));
                }
                Instr::Typeof => {
                    let v = self.pop(loc)?;
                    let tn = v.borrow().type_name().to_string();
                    let out = eval::lookup_type_descriptor(ctx, &tn).unwrap_or_else(|| Value::new(Data::String(tn)));
                    self.stack.push(out);
                }
                Instr::Typename => {
                    let v = self.pop(loc)?;
                    let tn = v.borrow().type_name().to_string();
                    self.stack.push(Value::new(Data::String(tn)));
                }
                Instr::EvalNode(node) => match eval::eval(&program.ast, node, ctx)? {
                    StepResult::Value(v) => self.stack.push(v),
                    StepResult::Signal(Signal::Return(v)) => return Ok(ExecStop::Returned(v)),
                    StepResult::Signal(Signal::Suspend) => return Ok(ExecStop::Suspended),
                    StepResult::Signal(Signal::Yield(v)) => return Ok(ExecStop::Yielded(v.unwrap_or_else(Value::nav))),
                    StepResult::Signal(Signal::Exit(v)) => return Ok(ExecStop::Exited(v)),
                    StepResult::Signal(other @ (Signal::Stop(..) | Signal::Loop(..))) => {
                        return Err(TeaError::new(
                            ErrorKind::RuntimeError,
                            loc,
                            format!("{other:?} escaped a catch handler compiled via the tree-walking fallback (the VM only resolves stop/loop to enclosing compiled loops)"),
                        ));
                    }
                },
            }
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

trait CloneForStore {
    fn clone_for_store(&self) -> Value;
}

impl CloneForStore for Value {
    /// `StoreVar` needs the *exact* binding (for `@=` aliasing) rather than
    /// a deep copy, so assignment reads the stack slot by reference; this
    /// only exists to give that intent a name at the call site.
    fn clone_for_store(&self) -> Value {
        self.share()
    }
}

fn literal_value(lit: &crate::ast::Literal) -> Value {
    use crate::ast::Literal;
    Value::new(match lit {
        Literal::NaV => Data::NotAValue,
        Literal::Bool(b) => Data::Bool(*b),
        Literal::U8(v) => Data::U8(*v),
        Literal::I64(v) => Data::I64(*v),
        Literal::U64(v) => Data::U64(*v),
        Literal::F64(v) => Data::F64(*v),
    })
}

fn eval_unary(op: UnaryOp, v: &Value, loc: SourceLocation) -> Result<Value, TeaError> {
    Ok(match op {
        UnaryOp::Neg => {
            if matches!(&*v.borrow(), Data::F64(_)) {
                Value::new(Data::F64(-v.get_as_f64(loc)?))
            } else {
                let i = v.get_as_integer(loc)?;
                Value::new(Data::I64(i.checked_neg().ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc, "integer overflow"))?))
            }
        }
        UnaryOp::Not => Value::new(Data::Bool(!v.get_as_bool(loc)?)),
        UnaryOp::BitNot => Value::new(Data::I64(!v.get_as_integer(loc)?)),
    })
}

fn eval_binop(op: BinaryOp, a: &Value, b: &Value, loc: SourceLocation) -> Result<Value, TeaError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => eval::binary_numeric(op, a, b, loc),
        BinaryOp::Concat => Ok(Value::new(Data::String(a.get_as_string(loc)? + &b.get_as_string(loc)?))),
        BinaryOp::Eq => Ok(Value::new(Data::Bool(*a.borrow() == *b.borrow()))),
        BinaryOp::Ne => Ok(Value::new(Data::Bool(*a.borrow() != *b.borrow()))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Ok(Value::new(Data::Bool(eval::numeric_cmp(op, a, b, loc)?))),
        BinaryOp::BitAnd => Ok(Value::new(Data::I64(a.get_as_integer(loc)? & b.get_as_integer(loc)?))),
        BinaryOp::BitOr => Ok(Value::new(Data::I64(a.get_as_integer(loc)? | b.get_as_integer(loc)?))),
        BinaryOp::BitXor => Ok(Value::new(Data::I64(a.get_as_integer(loc)? ^ b.get_as_integer(loc)?))),
        BinaryOp::BitLsh => Ok(Value::new(Data::I64(a.get_as_integer(loc)? << b.get_as_integer(loc)?))),
        BinaryOp::BitRsh => Ok(Value::new(Data::I64(a.get_as_integer(loc)? >> b.get_as_integer(loc)?))),
        BinaryOp::SameCell => Ok(Value::new(Data::Bool(a.same_cell(b)))),
        BinaryOp::And | BinaryOp::Or => unreachable!("And/Or compile to jumps, never reach BinOp"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{compile, OptLevel};
    use crate::parser::Parser;
    use teascript_core::SourceCursor;
    use teascript_runtime::context::Dialect;
    use teascript_runtime::corelib::{self, NoFragments};
    use teascript_runtime::typesystem::TypeSystem;

    fn run_source(src: &str) -> Value {
        let cursor = SourceCursor::new(src, 0);
        let mut p = Parser::new(cursor, Dialect::default()).unwrap();
        p.parse_program().unwrap();
        let ast = Rc::new(p.ast);
        let program = Rc::new(compile(&ast, OptLevel::O0).unwrap());
        let mut ctx = Context::new(Dialect::default());
        let ts = TypeSystem::new();
        corelib::bootstrap(&mut ctx, &ts, teascript_runtime::builtins::Level::Minimal, 0, &NoFragments).unwrap();
        let mut vm = Vm::new();
        match vm.run(&mut ctx, &program, &program.top, Boundary::TopLevel).unwrap() {
            ExecStop::Returned(v) => v,
            other => panic!("unexpected stop: {other:?}"),
        }
    }

    #[test]
    fn arithmetic_matches_tree_walker() {
        let v = run_source("1 + 2 * 3");
        assert_eq!(v.get_as_integer(SourceLocation::synthetic()).unwrap(), 7);
    }

    #[test]
    fn if_else_picks_the_right_branch() {
        let v = run_source("if 1 < 2 { \"yes\" } else { \"no\" }");
        assert_eq!(v.get_as_string(SourceLocation::synthetic()).unwrap(), "yes");
    }

    #[test]
    fn repeat_stop_with_returns_a_value() {
        let v = run_source("def i := 0 repeat { i := i + 1 if i >= 3 { stop with i } }");
        assert_eq!(v.get_as_integer(SourceLocation::synthetic()).unwrap(), 3);
    }

    #[test]
    fn forall_sums_a_tuple() {
        let v = run_source("def total := 0 forall x in (1, 2, 3) { total := total + x } total");
        assert_eq!(v.get_as_integer(SourceLocation::synthetic()).unwrap(), 6);
    }

    #[test]
    fn function_call_returns_expected_value() {
        let v = run_source("func double(x) { return x * 2 } double(21)");
        assert_eq!(v.get_as_integer(SourceLocation::synthetic()).unwrap(), 42);
    }

    #[test]
    fn recursive_function_calls_work() {
        let v = run_source("func fact(n) { if n <= 1 { return 1 } return n * fact(n - 1) } fact(5)");
        assert_eq!(v.get_as_integer(SourceLocation::synthetic()).unwrap(), 120);
    }

    #[test]
    fn tuple_field_and_index_access() {
        let v = run_source("def t := (a: 1, b: 2) t.a + t[1]");
        assert_eq!(v.get_as_integer(SourceLocation::synthetic()).unwrap(), 3);
    }
}
