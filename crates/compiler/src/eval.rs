//! The AST evaluator (C7): a tree-walking interpreter over the [`Ast`]
//! produced by [`crate::parser::Parser`]. Serves two roles: it is the
//! fastest path to a working script host while the bytecode compiler and VM
//! (C8/C9) are being built, and — via [`AstProgram`] implementing
//! `teascript_runtime::CallableProgram` — it is *also* how user-defined
//! `func` declarations stay callable regardless of which execution backend
//! (this evaluator, or the future VM) ends up running the call site, since
//! both go through the same trait-object seam.

use crate::ast::{Ast, AssignOp, BinaryOp, Literal, NodeId, NodeKind, StringPart, UnaryOp};
use std::fmt;
use std::rc::Rc;
use teascript_core::{ErrorKind, SourceLocation, TeaError};
use teascript_runtime::{CallableProgram, Context, Data, ErrorValue, FunctionValue, Tuple, Value};

/// A non-error control-flow transfer produced by evaluating a statement.
/// `Return`/`Stop`/`Loop` carry an optional label so nested `repeat`/
/// `forall` can tell whether they are the intended target (§4.7/§4.8).
#[derive(Debug)]
pub enum Signal {
    Return(Value),
    Stop(Option<String>, Option<Value>),
    Loop(Option<String>),
    Suspend,
    Yield(Option<Value>),
    Exit(Value),
}

pub enum StepResult {
    Value(Value),
    Signal(Signal),
}

fn label_matches(requested: &Option<String>, owner: &Option<String>) -> bool {
    match requested {
        None => true,
        Some(r) => owner.as_deref() == Some(r.as_str()),
    }
}

/// Implements `CallableProgram` by re-entering this evaluator at a stored
/// `func` declaration's node. `entry` is the `NodeId` of the `FuncDef` node
/// itself (not its body) so parameter metadata stays reachable from the
/// trait-object call boundary, which only carries a plain `u32`.
#[derive(Debug)]
pub struct AstProgram {
    pub ast: Rc<Ast>,
}

impl CallableProgram for AstProgram {
    fn call(&self, entry: u32, ctx: &mut Context, args: Vec<Value>) -> Result<Value, TeaError> {
        let node = self.ast.get(NodeId(entry));
        let (params, body) = match &node.kind {
            NodeKind::FuncDef { params, body, .. } => (params.clone(), *body),
            other => return Err(TeaError::new(ErrorKind::RuntimeError, node.loc, format!("call entry point is not a function ({other:?})"))),
        };
        let loc = node.loc;
        let mut guard = ctx.enter_scope_guarded();
        guard.ctx().set_param_list(args);
        for p in &params {
            let mut v = guard.ctx().consume_param(p.loc)?;
            let is_const = if p.is_auto { false } else { p.is_const };
            v.set_const(is_const);
            guard.ctx().add(p.name.clone(), v, p.loc)?;
        }
        match eval(&self.ast, body, guard.ctx())? {
            StepResult::Value(v) => Ok(v),
            StepResult::Signal(Signal::Return(v)) => Ok(v),
            StepResult::Signal(other) => Err(TeaError::new(ErrorKind::RuntimeError, loc, format!("{other:?} escaped a function body"))),
        }
    }
}

/// Runs every root statement of `ast` in `ctx`'s current scope, returning
/// the last statement's value. Used both for top-level script execution and
/// for bootstrap fragment evaluation (`util.tea`/`core.tea`).
pub fn eval_program(ast: &Rc<Ast>, ctx: &mut Context) -> Result<Value, TeaError> {
    let mut last = Value::nav();
    for &root in &ast.roots {
        match eval(ast, root, ctx)? {
            StepResult::Value(v) => last = v,
            StepResult::Signal(Signal::Exit(v)) => return Ok(v),
            StepResult::Signal(other) => return Err(TeaError::new(ErrorKind::RuntimeError, ast.get(root).loc, format!("{other:?} at top level has no enclosing loop/function"))),
        }
    }
    Ok(last)
}

fn eval_value(ast: &Rc<Ast>, node: NodeId, ctx: &mut Context) -> Result<Value, TeaError> {
    match eval(ast, node, ctx)? {
        StepResult::Value(v) => Ok(v),
        StepResult::Signal(s) => Err(TeaError::new(ErrorKind::RuntimeError, ast.get(node).loc, format!("unexpected {s:?} in expression position"))),
    }
}

/// Evaluates `value_node`, then — only for `@=` — turns the result into a
/// shared binding. Reading straight through an identifier shares its actual
/// cell (so the callee/new binding aliases the original variable); any other
/// expression shares the freshly produced, otherwise-unaliased value, which
/// is a harmless no-op beyond marking it shared.
fn eval_possibly_shared(ast: &Rc<Ast>, node: NodeId, ctx: &mut Context, shared: bool) -> Result<Value, TeaError> {
    if shared {
        if let NodeKind::Identifier(name) = &ast.get(node).kind {
            let name = name.clone();
            let loc = ast.get(node).loc;
            let v = ctx.find(&name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))?;
            return Ok(v.share());
        }
    }
    let v = eval_value(ast, node, ctx)?;
    Ok(if shared { v.share() } else { v })
}

enum PathSeg {
    Index(usize),
    Key(String),
}

fn collect_lvalue_path(ast: &Rc<Ast>, node: NodeId, ctx: &mut Context) -> Result<(String, Vec<PathSeg>), TeaError> {
    let mut segs = Vec::new();
    let mut cur = node;
    loop {
        match &ast.get(cur).kind {
            NodeKind::Identifier(name) => return Ok((name.clone(), { segs.reverse(); segs })),
            NodeKind::Index { target, index } => {
                let idx_val = eval_value(ast, *index, ctx)?;
                let idx = idx_val.get_as_integer(ast.get(*index).loc)? as usize;
                segs.push(PathSeg::Index(idx));
                cur = *target;
            }
            NodeKind::Dot { target, name } => {
                segs.push(PathSeg::Key(name.clone()));
                cur = *target;
            }
            _ => return Err(TeaError::new(ErrorKind::RuntimeError, ast.get(cur).loc, "invalid assignment target")),
        }
    }
}

fn navigate_assign(container: &Value, path: &[PathSeg], rhs: &Value, shared: bool, loc: SourceLocation) -> Result<(), TeaError> {
    let data = container.borrow();
    let Data::Tuple(t) = &*data else {
        return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("cannot index into a {}", data.type_name())));
    };
    let next = match &path[0] {
        PathSeg::Index(i) => t.get_index(*i).ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc, format!("tuple index {i} out of range")))?,
        PathSeg::Key(k) => t.get_key(k).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("no such tuple key '{k}'")))?,
    };
    if path.len() == 1 {
        if shared {
            return Err(TeaError::new(ErrorKind::RuntimeError, loc, "shared assignment into a tuple field is not supported"));
        }
        next.assign(rhs, loc)
    } else {
        navigate_assign(next, &path[1..], rhs, shared, loc)
    }
}

fn assign_to(ast: &Rc<Ast>, target: NodeId, ctx: &mut Context, rhs: &Value, shared: bool, loc: SourceLocation) -> Result<(), TeaError> {
    let (base, path) = collect_lvalue_path(ast, target, ctx)?;
    if path.is_empty() {
        ctx.assign(&base, rhs, shared, loc)
    } else {
        // Borrow the bound cell directly (never `.clone()`, which would
        // deep-copy and mutate a throwaway instead of the real binding).
        let container = ctx.find(&base).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{base}'")))?;
        navigate_assign(container, &path, rhs, shared, loc)
    }
}

fn gather_call_args(ast: &Rc<Ast>, args: &[NodeId], ctx: &mut Context) -> Result<Vec<Value>, TeaError> {
    let mut out = Vec::with_capacity(args.len());
    for &a in args {
        let v = if let NodeKind::Identifier(name) = &ast.get(a).kind {
            let loc = ast.get(a).loc;
            ctx.find(name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))?.share()
        } else {
            eval_value(ast, a, ctx)?
        };
        out.push(v);
    }
    Ok(out)
}

enum Num {
    F64(f64),
    I64(i64),
}

fn to_num(v: &Value, loc: SourceLocation) -> Result<Num, TeaError> {
    if matches!(&*v.borrow(), Data::F64(_)) {
        Ok(Num::F64(v.get_as_f64(loc)?))
    } else {
        Ok(Num::I64(v.get_as_integer(loc)?))
    }
}

pub(crate) fn binary_numeric(op: BinaryOp, a: &Value, b: &Value, loc: SourceLocation) -> Result<Value, TeaError> {
    let float = matches!(&*a.borrow(), Data::F64(_)) || matches!(&*b.borrow(), Data::F64(_));
    if float {
        let x = a.get_as_f64(loc)?;
        let y = b.get_as_f64(loc)?;
        let r = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => {
                if y == 0.0 {
                    return Err(TeaError::new(ErrorKind::DivByZero, loc, "division by zero"));
                }
                x / y
            }
            BinaryOp::Mod => {
                if y == 0.0 {
                    return Err(TeaError::new(ErrorKind::DivByZero, loc, "modulo by zero"));
                }
                x % y
            }
            _ => unreachable!("non-arithmetic op routed to binary_numeric"),
        };
        Ok(Value::new(Data::F64(r)))
    } else {
        let x = a.get_as_integer(loc)?;
        let y = b.get_as_integer(loc)?;
        let r = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    return Err(TeaError::new(ErrorKind::DivByZero, loc, "division by zero"));
                }
                x.checked_div(y)
            }
            BinaryOp::Mod => {
                if y == 0 {
                    return Err(TeaError::new(ErrorKind::DivByZero, loc, "modulo by zero"));
                }
                x.checked_rem(y)
            }
            _ => unreachable!("non-arithmetic op routed to binary_numeric"),
        };
        let r = r.ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc, "integer overflow"))?;
        Ok(Value::new(Data::I64(r)))
    }
}

pub(crate) fn numeric_cmp(op: BinaryOp, a: &Value, b: &Value, loc: SourceLocation) -> Result<bool, TeaError> {
    let ord = match (to_num(a, loc)?, to_num(b, loc)?) {
        (Num::F64(x), Num::F64(y)) => x.partial_cmp(&y),
        (Num::F64(x), Num::I64(y)) => x.partial_cmp(&(y as f64)),
        (Num::I64(x), Num::F64(y)) => (x as f64).partial_cmp(&y),
        (Num::I64(x), Num::I64(y)) => x.partial_cmp(&y),
    }
    .ok_or_else(|| TeaError::new(ErrorKind::RuntimeError, loc, "unordered comparison"))?;
    Ok(match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::Ge => ord.is_ge(),
        _ => unreachable!(),
    })
}

fn eval_binary(ast: &Rc<Ast>, op: BinaryOp, left: NodeId, right: NodeId, loc: SourceLocation, ctx: &mut Context) -> Result<Value, TeaError> {
    match op {
        BinaryOp::And => {
            let l = eval_value(ast, left, ctx)?.get_as_bool(loc)?;
            if !l {
                return Ok(Value::new(Data::Bool(false)));
            }
            let r = eval_value(ast, right, ctx)?.get_as_bool(loc)?;
            Ok(Value::new(Data::Bool(r)))
        }
        BinaryOp::Or => {
            let l = eval_value(ast, left, ctx)?.get_as_bool(loc)?;
            if l {
                return Ok(Value::new(Data::Bool(true)));
            }
            let r = eval_value(ast, right, ctx)?.get_as_bool(loc)?;
            Ok(Value::new(Data::Bool(r)))
        }
        _ => {
            let a = eval_value(ast, left, ctx)?;
            let b = eval_value(ast, right, ctx)?;
            match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => binary_numeric(op, &a, &b, loc),
                BinaryOp::Concat => Ok(Value::new(Data::String(a.get_as_string(loc)? + &b.get_as_string(loc)?))),
                BinaryOp::Eq => Ok(Value::new(Data::Bool(*a.borrow() == *b.borrow()))),
                BinaryOp::Ne => Ok(Value::new(Data::Bool(*a.borrow() != *b.borrow()))),
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Ok(Value::new(Data::Bool(numeric_cmp(op, &a, &b, loc)?))),
                BinaryOp::BitAnd => Ok(Value::new(Data::I64(a.get_as_integer(loc)? & b.get_as_integer(loc)?))),
                BinaryOp::BitOr => Ok(Value::new(Data::I64(a.get_as_integer(loc)? | b.get_as_integer(loc)?))),
                BinaryOp::BitXor => Ok(Value::new(Data::I64(a.get_as_integer(loc)? ^ b.get_as_integer(loc)?))),
                BinaryOp::BitLsh => Ok(Value::new(Data::I64(a.get_as_integer(loc)? << b.get_as_integer(loc)?))),
                BinaryOp::BitRsh => Ok(Value::new(Data::I64(a.get_as_integer(loc)? >> b.get_as_integer(loc)?))),
                BinaryOp::SameCell => Ok(Value::new(Data::Bool(a.same_cell(&b)))),
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
    }
}

pub(crate) fn iterable_items(v: &Value, loc: SourceLocation) -> Result<Vec<Value>, TeaError> {
    match &*v.borrow() {
        Data::Tuple(t) => Ok(t.iter().map(|(_, item)| item.clone()).collect()),
        Data::IntegerSequence(seq) => {
            let mut seq = *seq;
            let mut out = Vec::new();
            while let Some(n) = seq.next() {
                out.push(Value::new(Data::I64(n)));
            }
            Ok(out)
        }
        other => Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("{} is not iterable", other.type_name()))),
    }
}

pub(crate) fn lookup_type_descriptor(ctx: &Context, type_name: &str) -> Option<Value> {
    ctx.find(&format!("_type_{type_name}")).cloned()
}

/// Evaluates one AST node. Statements that transfer control (`return`,
/// `stop`, `loop`, `suspend`, `yield`, `_Exit`) produce `StepResult::Signal`
/// instead of a value; every loop/function boundary is responsible for
/// catching the signals addressed to it and re-propagating the rest.
pub fn eval(ast: &Rc<Ast>, node: NodeId, ctx: &mut Context) -> Result<StepResult, TeaError> {
    let n = ast.get(node);
    let loc = n.loc;
    ctx.set_breadcrumb(loc);
    match n.kind.clone() {
        NodeKind::Literal(lit) => Ok(StepResult::Value(Value::new(match lit {
            Literal::NaV => Data::NotAValue,
            Literal::Bool(b) => Data::Bool(b),
            Literal::U8(v) => Data::U8(v),
            Literal::I64(v) => Data::I64(v),
            Literal::U64(v) => Data::U64(v),
            Literal::F64(v) => Data::F64(v),
        }))),
        NodeKind::StringLit(parts) => {
            let mut s = String::new();
            for p in parts {
                match p {
                    StringPart::Literal(lit) => s.push_str(&lit),
                    StringPart::Expr(e) => s.push_str(&eval_value(ast, e, ctx)?.get_as_string(loc)?),
                }
            }
            Ok(StepResult::Value(Value::new(Data::String(s))))
        }
        NodeKind::Identifier(name) => {
            let v = ctx.find(&name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("unknown identifier '{name}'")))?;
            Ok(StepResult::Value(v.clone()))
        }
        NodeKind::Unary(op, e) => {
            let v = eval_value(ast, e, ctx)?;
            let out = match op {
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
            };
            Ok(StepResult::Value(out))
        }
        NodeKind::Binary(op, l, r) => Ok(StepResult::Value(eval_binary(ast, op, l, r, loc, ctx)?)),
        NodeKind::Assign { target, op, value } => {
            let shared = matches!(op, AssignOp::Shared);
            let rhs = eval_possibly_shared(ast, value, ctx, shared)?;
            assign_to(ast, target, ctx, &rhs, shared, loc)?;
            Ok(StepResult::Value(rhs))
        }
        NodeKind::Def { name, modifiers, op, value } => {
            let shared = matches!(op, AssignOp::Shared);
            let mut v = match value {
                Some(v) => eval_possibly_shared(ast, v, ctx, shared)?,
                None => Value::nav(),
            };
            v.set_const(modifiers.is_const);
            ctx.add(name, v, loc)?;
            Ok(StepResult::Value(Value::nav()))
        }
        NodeKind::Undef(name) => {
            ctx.remove(&name, loc)?;
            Ok(StepResult::Value(Value::nav()))
        }
        NodeKind::IsDefined(name) => Ok(StepResult::Value(Value::new(Data::Bool(ctx.is_defined(&name))))),
        NodeKind::Debug(e) => {
            let v = eval_value(ast, e, ctx)?;
            tracing::debug!(location = ?loc, value = %v.print_value(), "debug");
            Ok(StepResult::Value(Value::nav()))
        }
        NodeKind::Block(stmts) => {
            let mut guard = ctx.enter_scope_guarded();
            let mut last = Value::nav();
            for s in stmts {
                match eval(ast, s, guard.ctx())? {
                    StepResult::Value(v) => last = v,
                    signal @ StepResult::Signal(_) => return Ok(signal),
                }
            }
            Ok(StepResult::Value(last))
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            if eval_value(ast, cond, ctx)?.get_as_bool(loc)? {
                eval(ast, then_branch, ctx)
            } else if let Some(eb) = else_branch {
                eval(ast, eb, ctx)
            } else {
                Ok(StepResult::Value(Value::nav()))
            }
        }
        NodeKind::Repeat { label, body } => loop {
            match eval(ast, body, ctx)? {
                StepResult::Value(_) => continue,
                StepResult::Signal(Signal::Stop(l, with)) if label_matches(&l, &label) => {
                    return Ok(StepResult::Value(with.unwrap_or_else(Value::nav)));
                }
                StepResult::Signal(Signal::Loop(l)) if label_matches(&l, &label) => continue,
                signal @ StepResult::Signal(_) => return Ok(signal),
            }
        },
        NodeKind::Forall { label, binder, iterable, body } => {
            let iterable_val = eval_value(ast, iterable, ctx)?;
            let items = iterable_items(&iterable_val, loc)?;
            for item in items {
                let mut guard = ctx.enter_scope_guarded();
                guard.ctx().add(binder.clone(), item, loc)?;
                match eval(ast, body, guard.ctx())? {
                    StepResult::Value(_) => continue,
                    StepResult::Signal(Signal::Stop(l, with)) if label_matches(&l, &label) => {
                        return Ok(StepResult::Value(with.unwrap_or_else(Value::nav)));
                    }
                    StepResult::Signal(Signal::Loop(l)) if label_matches(&l, &label) => continue,
                    signal @ StepResult::Signal(_) => return Ok(signal),
                }
            }
            Ok(StepResult::Value(Value::nav()))
        }
        NodeKind::FuncDef { name, .. } => {
            let program: Rc<dyn CallableProgram> = Rc::new(AstProgram { ast: Rc::clone(ast) });
            let fval = Value::new_const(Data::Function(FunctionValue::Compiled { program, entry: node.0, name: name.clone() }));
            ctx.add(name, fval, loc)?;
            Ok(StepResult::Value(Value::nav()))
        }
        NodeKind::Return(v) => {
            let value = match v {
                Some(v) => eval_value(ast, v, ctx)?,
                None => Value::nav(),
            };
            Ok(StepResult::Signal(Signal::Return(value)))
        }
        NodeKind::Stop { label, with_expr } => {
            let value = match with_expr {
                Some(e) => Some(eval_value(ast, e, ctx)?),
                None => None,
            };
            Ok(StepResult::Signal(Signal::Stop(label, value)))
        }
        NodeKind::Loop { label } => Ok(StepResult::Signal(Signal::Loop(label))),
        NodeKind::Suspend => Ok(StepResult::Signal(Signal::Suspend)),
        NodeKind::Yield(v) => {
            let value = match v {
                Some(v) => Some(eval_value(ast, v, ctx)?),
                None => None,
            };
            Ok(StepResult::Signal(Signal::Yield(value)))
        }
        NodeKind::Exit(e) => Ok(StepResult::Signal(Signal::Exit(eval_value(ast, e, ctx)?))),
        NodeKind::Call { callee, args } => {
            let callee_val = eval_value(ast, callee, ctx)?;
            let fv = match &*callee_val.borrow() {
                Data::Function(f) => f.clone(),
                other => return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("{} is not callable", other.type_name()))),
            };
            let arg_values = gather_call_args(ast, &args, ctx)?;
            let result = match fv {
                FunctionValue::Native { func, arity, name } => {
                    if let Some(n) = arity {
                        if n != arg_values.len() {
                            return Err(TeaError::new(ErrorKind::RuntimeError, loc, format!("'{name}' expects {n} argument(s), got {}", arg_values.len())));
                        }
                    }
                    func(ctx, arg_values)?
                }
                FunctionValue::Compiled { program, entry, .. } => program.call(entry, ctx, arg_values)?,
            };
            Ok(StepResult::Value(result))
        }
        NodeKind::Dot { target, name } => {
            let t = eval_value(ast, target, ctx)?;
            let data = t.borrow();
            let Data::Tuple(tup) = &*data else {
                return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("cannot access field '{name}' of a {}", data.type_name())));
            };
            let v = tup.get_key(&name).ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc, format!("no such tuple key '{name}'")))?;
            Ok(StepResult::Value(v.clone()))
        }
        NodeKind::Index { target, index } => {
            let t = eval_value(ast, target, ctx)?;
            let idx_val = eval_value(ast, index, ctx)?;
            let data = t.borrow();
            let Data::Tuple(tup) = &*data else {
                return Err(TeaError::new(ErrorKind::TypeMismatch, loc, format!("cannot index a {}", data.type_name())));
            };
            let idx = idx_val.get_as_integer(loc)? as usize;
            let v = tup.get_index(idx).ok_or_else(|| TeaError::new(ErrorKind::OutOfRange, loc, format!("tuple index {idx} out of range")))?;
            Ok(StepResult::Value(v.clone()))
        }
        NodeKind::TupleLit(elems) => {
            let mut tup = Tuple::new();
            for (key, v) in elems {
                let val = eval_value(ast, v, ctx)?;
                match key {
                    Some(k) => {
                        tup.append_keyed(k, val, loc)?;
                    }
                    None => {
                        tup.append(val);
                    }
                }
            }
            Ok(StepResult::Value(Value::new(Data::Tuple(tup))))
        }
        NodeKind::As { expr, type_name } => {
            let v = eval_value(ast, expr, ctx)?;
            let out = match type_name.as_str() {
                "i64" => Data::I64(v.get_as_integer(loc)?),
                "u64" => Data::U64(v.get_as_integer(loc)? as u64),
                "u8" => Data::U8(v.get_as_integer(loc)? as u8),
                "f64" => Data::F64(v.get_as_f64(loc)?),
                "Bool" => Data::Bool(v.get_as_bool(loc)?),
                "String" => Data::String(v.get_as_string(loc)?),
                other => return Err(TeaError::new(ErrorKind::BadValueCast, loc, format!("unknown cast target type '{other}'"))),
            };
            Ok(StepResult::Value(Value::new(out)))
        }
        NodeKind::Is { expr, type_name } => {
            let v = eval_value(ast, expr, ctx)?;
            let data = v.borrow();
            let matches = match type_name.as_str() {
                "Array" => matches!(&*data, Data::Tuple(t) if t.is_array()),
                "Record" => matches!(&*data, Data::Tuple(t) if !t.is_array()),
                other => data.type_name() == other,
            };
            Ok(StepResult::Value(Value::new(Data::Bool(matches))))
        }
        NodeKind::Typeof(e) => {
            let v = eval_value(ast, e, ctx)?;
            let tn = v.borrow().type_name().to_string();
            let out = lookup_type_descriptor(ctx, &tn).unwrap_or_else(|| Value::new(Data::String(tn)));
            Ok(StepResult::Value(out))
        }
        NodeKind::Typename(e) => {
            let v = eval_value(ast, e, ctx)?;
            let tn = v.borrow().type_name().to_string();
            Ok(StepResult::Value(Value::new(Data::String(tn))))
        }
        // The caught name binds into the *current* scope for the duration of
        // the handler, not a fresh child scope (§9 Open Question, resolved).
        NodeKind::Catch { expr, binder, handler } => match eval(ast, expr, ctx) {
            Ok(step) => Ok(step),
            Err(e) => {
                let err_val = Value::new(Data::Error(ErrorValue { code: e.kind as i64, message: e.message.clone() }));
                if let Some(name) = binder {
                    ctx.add(name, err_val, loc)?;
                    let result = eval(ast, handler, ctx);
                    ctx.remove(name, loc)?;
                    result
                } else {
                    eval(ast, handler, ctx)
                }
            }
        },
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
