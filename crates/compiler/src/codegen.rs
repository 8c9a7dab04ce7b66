//! The bytecode compiler (C8): lowers an [`Ast`] into a [`VmProgram`] the
//! stack VM (`crate::vm`) runs. A handful of node kinds — `catch` and
//! assignment through a nested `t.field`/`t[i]` path — compile to a single
//! [`Instr::EvalNode`] that re-enters the tree-walking evaluator (`crate::
//! eval`) for that one subtree instead of being flattened into stack
//! instructions; both need machinery (error unwinding, lvalue-path
//! navigation) that already lives there, and duplicating it here would just
//! be a second copy of the same bug surface to keep in sync. Everything on
//! the hot path — arithmetic, comparisons, calls, loops — compiles to real
//! instructions and reuses `eval::binary_numeric`/`numeric_cmp` so the two
//! backends agree on arithmetic by construction.

use crate::ast::{Ast, AssignOp, BinaryOp, Literal, NodeId, NodeKind, Param, UnaryOp};
use std::collections::HashMap;
use std::rc::Rc;
use teascript_core::{ErrorKind, SourceLocation, TeaError};
use teascript_runtime::{Context, Data, Value};

/// How aggressively `compile` optimizes. `Debug` and `O0` both emit
/// straight-line code with no rewriting (kept distinct so a host can ask for
/// "no optimization, but also don't pretend this is a release build" the way
/// the original's `-O0`/`-g` distinction does); `O1` folds constant
/// expressions and drops unreachable `if` branches; `O2` additionally elides
/// pure, value-discarded non-last statements in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    Debug,
    O0,
    O1,
    O2,
}

#[derive(Debug, Clone)]
pub enum Instr {
    PushLit(Literal),
    PushStr(String),
    BuildString(usize),
    PushNav,

    LoadVar(String),
    LoadVarShared(String),
    StoreVar { name: String, shared: bool },
    DefVar { name: String, is_const: bool, shared: bool },
    ShareTop,
    Undef(String),
    IsDefined(String),
    DebugStmt,

    Pop,

    UnOp(UnaryOp),
    BinOp(BinaryOp),
    ToBool,

    Jump(usize),
    JumpIfFalse(usize),
    JumpIfTrue(usize),

    EnterScope,
    ExitScope,

    IterStart,
    IterNext(usize),
    IterEnd,

    Return,
    Suspend,
    Yield,
    ExitProgram,

    Call(usize),
    MakeFunction { name: String, entry: u32 },

    GetKey(String),
    GetIndex,
    MakeTuple(Vec<Option<String>>),

    AsCast(String),
    IsCheck(String),
    Typeof,
    Typename,

    /// Escape hatch: re-run `eval::eval` over the original AST subtree
    /// rooted at this node (see module docs).
    EvalNode(NodeId),
}

#[derive(Debug, Default)]
pub struct Program {
    pub instrs: Vec<Instr>,
    pub locations: Vec<SourceLocation>,
}

#[derive(Debug)]
pub struct CompiledFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub code: Program,
}

/// The whole unit a `compile()` call produces: the top-level script's code
/// plus every `func` body reachable from it, keyed by the `FuncDef` node's
/// id (the same id `AstProgram` uses as `entry`, so both backends name a
/// given function identically — see §8's cross-backend equivalence note).
#[derive(Debug)]
pub struct VmProgram {
    pub ast: Rc<Ast>,
    pub top: Program,
    pub functions: HashMap<u32, Rc<CompiledFunction>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Repeat,
    Forall,
}

struct LoopCx {
    label: Option<String>,
    kind: LoopKind,
    continue_target: usize,
    scope_depth_at_entry: usize,
    break_patches: Vec<usize>,
}

struct Compiler<'a> {
    ast: &'a Ast,
    level: OptLevel,
    instrs: Vec<Instr>,
    locations: Vec<SourceLocation>,
    loops: Vec<LoopCx>,
    scope_depth: usize,
    functions: HashMap<u32, Rc<CompiledFunction>>,
}

pub fn compile(ast: &Rc<Ast>, level: OptLevel) -> Result<VmProgram, TeaError> {
    let mut c = Compiler { ast, level, instrs: Vec::new(), locations: Vec::new(), loops: Vec::new(), scope_depth: 0, functions: HashMap::new() };
    for (i, &root) in ast.roots.iter().enumerate() {
        c.compile_expr(root)?;
        if i + 1 < ast.roots.len() {
            c.emit(Instr::Pop, ast.get(root).loc);
        }
    }
    if ast.roots.is_empty() {
        c.emit(Instr::PushNav, SourceLocation::synthetic());
    }
    let top = Program { instrs: c.instrs, locations: c.locations };
    Ok(VmProgram { ast: Rc::clone(ast), top, functions: c.functions })
}

impl<'a> Compiler<'a> {
    fn emit(&mut self, instr: Instr, loc: SourceLocation) -> usize {
        self.instrs.push(instr);
        self.locations.push(loc);
        self.instrs.len() - 1
    }

    fn patch_jump(&mut self, idx: usize, target: usize) {
        match &mut self.instrs[idx] {
            Instr::Jump(t) | Instr::JumpIfFalse(t) | Instr::JumpIfTrue(t) | Instr::IterNext(t) => *t = target,
            other => unreachable!("patch_jump on non-jump instruction {other:?}"),
        }
    }

    fn pc(&self) -> usize {
        self.instrs.len()
    }

    fn find_loop(&self, label: &Option<String>, loc: SourceLocation) -> Result<usize, TeaError> {
        for (i, lp) in self.loops.iter().enumerate().rev() {
            if label.is_none() || lp.label == *label {
                return Ok(i);
            }
        }
        Err(TeaError::new(ErrorKind::RuntimeError, loc, format!("no enclosing loop matches label {label:?}")))
    }

    fn unwind_to(&mut self, target_depth: usize, loc: SourceLocation) {
        for _ in target_depth..self.scope_depth {
            self.emit(Instr::ExitScope, loc);
        }
    }

    /// Folds `node` to a literal at compile time if it's a literal, or a
    /// unary/binary expression over literals. Returns `None` for anything
    /// else (including identifiers, calls, and anything with side effects).
    fn const_fold(&self, node: NodeId) -> Option<Value> {
        if self.level < OptLevel::O1 {
            return None;
        }
        let n = self.ast.get(node);
        match &n.kind {
            NodeKind::Literal(lit) => Some(literal_to_value(lit)),
            NodeKind::Unary(op, e) => {
                let v = self.const_fold(*e)?;
                match op {
                    UnaryOp::Neg if matches!(&*v.borrow(), Data::F64(_)) => Some(Value::new(Data::F64(-v.get_as_f64(n.loc).ok()?))),
                    UnaryOp::Neg => Some(Value::new(Data::I64(v.get_as_integer(n.loc).ok()?.checked_neg()?))),
                    UnaryOp::Not => Some(Value::new(Data::Bool(!v.get_as_bool(n.loc).ok()?))),
                    UnaryOp::BitNot => Some(Value::new(Data::I64(!v.get_as_integer(n.loc).ok()?))),
                }
            }
            NodeKind::Binary(op, l, r) if !matches!(op, BinaryOp::And | BinaryOp::Or) => {
                let a = self.const_fold(*l)?;
                let b = self.const_fold(*r)?;
                match op {
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => crate::eval::binary_numeric(*op, &a, &b, n.loc).ok(),
                    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Some(Value::new(Data::Bool(crate::eval::numeric_cmp(*op, &a, &b, n.loc).ok()?))),
                    BinaryOp::Eq => Some(Value::new(Data::Bool(*a.borrow() == *b.borrow()))),
                    BinaryOp::Ne => Some(Value::new(Data::Bool(*a.borrow() != *b.borrow()))),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn compile_expr(&mut self, node: NodeId) -> Result<(), TeaError> {
        let loc = self.ast.get(node).loc;
        if let Some(v) = self.const_fold(node) {
            if let Some(lit) = value_to_literal(&v) {
                self.emit(Instr::PushLit(lit), loc);
                return Ok(());
            }
        }
        let kind = self.ast.get(node).kind.clone();
        match kind {
            NodeKind::Literal(lit) => {
                self.emit(Instr::PushLit(lit), loc);
            }
            NodeKind::StringLit(parts) => {
                let n = parts.len();
                for p in parts {
                    match p {
                        crate::ast::StringPart::Literal(s) => {
                            self.emit(Instr::PushStr(s), loc);
                        }
                        crate::ast::StringPart::Expr(e) => {
                            self.compile_expr(e)?;
                        }
                    }
                }
                self.emit(Instr::BuildString(n), loc);
            }
            NodeKind::Identifier(name) => {
                self.emit(Instr::LoadVar(name), loc);
            }
            NodeKind::Unary(op, e) => {
                self.compile_expr(e)?;
                self.emit(Instr::UnOp(op), loc);
            }
            NodeKind::Binary(BinaryOp::And, l, r) => {
                self.compile_expr(l)?;
                self.emit(Instr::ToBool, loc);
                let jf = self.emit(Instr::JumpIfFalse(0), loc);
                self.emit(Instr::Pop, loc);
                self.compile_expr(r)?;
                self.emit(Instr::ToBool, loc);
                let end = self.pc();
                self.patch_jump(jf, end);
            }
            NodeKind::Binary(BinaryOp::Or, l, r) => {
                self.compile_expr(l)?;
                self.emit(Instr::ToBool, loc);
                let jt = self.emit(Instr::JumpIfTrue(0), loc);
                self.emit(Instr::Pop, loc);
                self.compile_expr(r)?;
                self.emit(Instr::ToBool, loc);
                let end = self.pc();
                self.patch_jump(jt, end);
            }
            NodeKind::Binary(op, l, r) => {
                self.compile_expr(l)?;
                self.compile_expr(r)?;
                self.emit(Instr::BinOp(op), loc);
            }
            NodeKind::Assign { target, op, value } => {
                self.compile_assign(node, target, op, value, loc)?;
            }
            NodeKind::Def { name, modifiers, op, value } => {
                let shared = matches!(op, AssignOp::Shared);
                match value {
                    Some(v) => self.compile_possibly_shared(v, shared)?,
                    None => {
                        self.emit(Instr::PushNav, loc);
                    }
                }
                self.emit(Instr::DefVar { name, is_const: modifiers.is_const, shared }, loc);
                self.emit(Instr::PushNav, loc);
            }
            NodeKind::Undef(name) => {
                self.emit(Instr::Undef(name), loc);
            }
            NodeKind::IsDefined(name) => {
                self.emit(Instr::IsDefined(name), loc);
            }
            NodeKind::Debug(e) => {
                self.compile_expr(e)?;
                self.emit(Instr::DebugStmt, loc);
            }
            NodeKind::Block(stmts) => {
                self.emit(Instr::EnterScope, loc);
                self.scope_depth += 1;
                if stmts.is_empty() {
                    self.emit(Instr::PushNav, loc);
                } else {
                    let skip_pure = self.level >= OptLevel::O2;
                    for (i, s) in stmts.iter().enumerate() {
                        let is_last = i + 1 == stmts.len();
                        if !is_last && skip_pure && is_pure_discardable(self.ast, *s) {
                            continue;
                        }
                        self.compile_expr(*s)?;
                        if !is_last {
                            self.emit(Instr::Pop, loc);
                        }
                    }
                }
                self.emit(Instr::ExitScope, loc);
                self.scope_depth -= 1;
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                if self.level >= OptLevel::O1 {
                    if let Some(v) = self.const_fold(cond) {
                        if let Ok(b) = v.get_as_bool(loc) {
                            if b {
                                self.compile_expr(then_branch)?;
                            } else if let Some(eb) = else_branch {
                                self.compile_expr(eb)?;
                            } else {
                                self.emit(Instr::PushNav, loc);
                            }
                            return Ok(());
                        }
                    }
                }
                self.compile_expr(cond)?;
                let jf = self.emit(Instr::JumpIfFalse(0), loc);
                self.compile_expr(then_branch)?;
                let jend = self.emit(Instr::Jump(0), loc);
                let else_start = self.pc();
                self.patch_jump(jf, else_start);
                match else_branch {
                    Some(eb) => {
                        self.compile_expr(eb)?;
                    }
                    None => {
                        self.emit(Instr::PushNav, loc);
                    }
                }
                let end = self.pc();
                self.patch_jump(jend, end);
            }
            NodeKind::Repeat { label, body } => {
                let start = self.pc();
                self.loops.push(LoopCx { label, kind: LoopKind::Repeat, continue_target: start, scope_depth_at_entry: self.scope_depth, break_patches: Vec::new() });
                self.compile_expr(body)?;
                self.emit(Instr::Pop, loc);
                self.emit(Instr::Jump(start), loc);
                let end = self.pc();
                let lp = self.loops.pop().unwrap();
                for idx in lp.break_patches {
                    self.patch_jump(idx, end);
                }
            }
            NodeKind::Forall { label, binder, iterable, body } => {
                self.compile_expr(iterable)?;
                self.emit(Instr::IterStart, loc);
                let start = self.pc();
                self.loops.push(LoopCx { label, kind: LoopKind::Forall, continue_target: start, scope_depth_at_entry: self.scope_depth, break_patches: Vec::new() });
                let jdone = self.emit(Instr::IterNext(0), loc);
                self.emit(Instr::EnterScope, loc);
                self.scope_depth += 1;
                self.emit(Instr::DefVar { name: binder, is_const: false, shared: false }, loc);
                self.compile_expr(body)?;
                self.emit(Instr::Pop, loc);
                self.emit(Instr::ExitScope, loc);
                self.scope_depth -= 1;
                self.emit(Instr::Jump(start), loc);
                let exhausted = self.pc();
                self.patch_jump(jdone, exhausted);
                self.emit(Instr::IterEnd, loc);
                self.emit(Instr::PushNav, loc);
                let end = self.pc();
                let lp = self.loops.pop().unwrap();
                for idx in lp.break_patches {
                    self.patch_jump(idx, end);
                }
            }
            NodeKind::FuncDef { name, params, body } => {
                let entry = node.0;
                let saved_instrs = std::mem::take(&mut self.instrs);
                let saved_locations = std::mem::take(&mut self.locations);
                let saved_loops = std::mem::take(&mut self.loops);
                let saved_depth = self.scope_depth;
                self.scope_depth = 0;
                self.compile_expr(body)?;
                self.emit(Instr::Return, loc);
                let code = Program { instrs: std::mem::replace(&mut self.instrs, saved_instrs), locations: std::mem::replace(&mut self.locations, saved_locations) };
                self.loops = saved_loops;
                self.scope_depth = saved_depth;
                self.functions.insert(entry, Rc::new(CompiledFunction { name: name.clone(), params, code }));
                self.emit(Instr::MakeFunction { name, entry }, loc);
                self.emit(Instr::PushNav, loc);
            }
            NodeKind::Return(v) => {
                match v {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        self.emit(Instr::PushNav, loc);
                    }
                }
                self.emit(Instr::Return, loc);
            }
            NodeKind::Stop { label, with_expr } => {
                match with_expr {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        self.emit(Instr::PushNav, loc);
                    }
                }
                let depth = self.find_loop(&label, loc)?;
                self.unwind_to(self.loops[depth].scope_depth_at_entry, loc);
                if self.loops[depth].kind == LoopKind::Forall {
                    self.emit(Instr::IterEnd, loc);
                }
                let patch = self.emit(Instr::Jump(0), loc);
                self.loops[depth].break_patches.push(patch);
            }
            NodeKind::Loop { label } => {
                let depth = self.find_loop(&label, loc)?;
                self.unwind_to(self.loops[depth].scope_depth_at_entry, loc);
                let target = self.loops[depth].continue_target;
                self.emit(Instr::Jump(target), loc);
            }
            NodeKind::Suspend => {
                self.emit(Instr::PushNav, loc);
                self.emit(Instr::Suspend, loc);
            }
            NodeKind::Yield(v) => {
                match v {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        self.emit(Instr::PushNav, loc);
                    }
                }
                self.emit(Instr::Yield, loc);
            }
            NodeKind::Exit(e) => {
                self.compile_expr(e)?;
                self.emit(Instr::ExitProgram, loc);
            }
            NodeKind::Call { callee, args } => {
                self.compile_expr(callee)?;
                let nargs = args.len();
                for a in args {
                    if let NodeKind::Identifier(name) = &self.ast.get(a).kind {
                        self.emit(Instr::LoadVarShared(name.clone()), loc);
                    } else {
                        self.compile_expr(a)?;
                    }
                }
                self.emit(Instr::Call(nargs), loc);
            }
            NodeKind::Dot { target, name } => {
                self.compile_expr(target)?;
                self.emit(Instr::GetKey(name), loc);
            }
            NodeKind::Index { target, index } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.emit(Instr::GetIndex, loc);
            }
            NodeKind::TupleLit(elems) => {
                let keys: Vec<Option<String>> = elems.iter().map(|(k, _)| k.clone()).collect();
                for (_, v) in elems {
                    self.compile_expr(v)?;
                }
                self.emit(Instr::MakeTuple(keys), loc);
            }
            NodeKind::As { expr, type_name } => {
                self.compile_expr(expr)?;
                self.emit(Instr::AsCast(type_name), loc);
            }
            NodeKind::Is { expr, type_name } => {
                self.compile_expr(expr)?;
                self.emit(Instr::IsCheck(type_name), loc);
            }
            NodeKind::Typeof(e) => {
                self.compile_expr(e)?;
                self.emit(Instr::Typeof, loc);
            }
            NodeKind::Typename(e) => {
                self.compile_expr(e)?;
                self.emit(Instr::Typename, loc);
            }
            NodeKind::Catch { .. } => {
                self.emit(Instr::EvalNode(node), loc);
            }
        }
        Ok(())
    }

    fn compile_possibly_shared(&mut self, node: NodeId, shared: bool) -> Result<(), TeaError> {
        let loc = self.ast.get(node).loc;
        if shared {
            if let NodeKind::Identifier(name) = &self.ast.get(node).kind {
                self.emit(Instr::LoadVarShared(name.clone()), loc);
                return Ok(());
            }
            self.compile_expr(node)?;
            self.emit(Instr::ShareTop, loc);
            Ok(())
        } else {
            self.compile_expr(node)
        }
    }

    fn compile_assign(&mut self, node: NodeId, target: NodeId, op: AssignOp, value: NodeId, loc: SourceLocation) -> Result<(), TeaError> {
        let shared = matches!(op, AssignOp::Shared);
        if let NodeKind::Identifier(name) = &self.ast.get(target).kind {
            let name = name.clone();
            self.compile_possibly_shared(value, shared)?;
            self.emit(Instr::StoreVar { name, shared }, loc);
            Ok(())
        } else {
            // Nested lvalue path (`t.field := v`, `t[i] := v`): delegate the
            // whole assignment to the tree-walking evaluator, which already
            // implements path navigation correctly (see module docs).
            self.emit(Instr::EvalNode(node), loc);
            Ok(())
        }
    }
}

fn literal_to_value(lit: &Literal) -> Value {
    Value::new(match lit {
        Literal::NaV => Data::NotAValue,
        Literal::Bool(b) => Data::Bool(*b),
        Literal::U8(v) => Data::U8(*v),
        Literal::I64(v) => Data::I64(*v),
        Literal::U64(v) => Data::U64(*v),
        Literal::F64(v) => Data::F64(*v),
    })
}

fn value_to_literal(v: &Value) -> Option<Literal> {
    Some(match &*v.borrow() {
        Data::NotAValue => Literal::NaV,
        Data::Bool(b) => Literal::Bool(*b),
        Data::U8(n) => Literal::U8(*n),
        Data::I64(n) => Literal::I64(*n),
        Data::U64(n) => Literal::U64(*n),
        Data::F64(n) => Literal::F64(*n),
        _ => return None,
    })
}

/// O2's dead-store elision: a statement whose value would be discarded
/// anyway (it isn't the block's last statement) and which cannot have a
/// side effect. Deliberately conservative — anything that isn't obviously a
/// bare read is left in, since miscategorizing a side-effecting node here
/// would silently drop behavior.
fn is_pure_discardable(ast: &Ast, node: NodeId) -> bool {
    matches!(ast.get(node).kind, NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::IsDefined(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use teascript_core::SourceCursor;
    use teascript_runtime::context::Dialect;

    fn parse(src: &str) -> Ast {
        let cursor = SourceCursor::new(src, 0);
        let mut p = Parser::new(cursor, Dialect::default()).unwrap();
        p.parse_program().unwrap();
        p.ast
    }

    #[test]
    fn compiles_arithmetic_without_error() {
        let ast = Rc::new(parse("1 + 2 * 3"));
        let program = compile(&ast, OptLevel::O0).unwrap();
        assert!(!program.top.instrs.is_empty());
    }

    #[test]
    fn o1_folds_constant_arithmetic() {
        let ast = Rc::new(parse("1 + 2"));
        let program = compile(&ast, OptLevel::O1).unwrap();
        assert!(matches!(program.top.instrs.as_slice(), [Instr::PushLit(Literal::I64(3))]));
    }

    #[test]
    fn funcdef_registers_a_compiled_function() {
        let ast = Rc::new(parse("func add(a, b) { return a + b }"));
        let program = compile(&ast, OptLevel::O0).unwrap();
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn unmatched_stop_label_is_a_compile_error() {
        let ast = Rc::new(parse("repeat { stop \"nowhere\" }"));
        assert!(compile(&ast, OptLevel::O0).is_err());
    }
}
