//! The coroutine engine (C10): a resumable facade over the VM (C9).
//! Grounded on the same `Engine` (C6) host-facing shape, but owning a
//! persistent [`Vm`] instead of running one program to completion and
//! discarding it — `run`/`run_for` resume exactly where the VM's `pc`
//! and stacks were left (§4.9/§5: suspend/resume never unwinds scopes).

use crate::codegen::{compile, OptLevel, VmProgram};
use crate::corelib_ext::EngineEvaluator;
use crate::parser::Parser;
use crate::vm::{Boundary, Budget, ExecStop, Vm};
use std::rc::Rc;
use teascript_core::{ErrorKind, SourceCursor, SourceLocation, TeaError};
use teascript_runtime::builtins::Level;
use teascript_runtime::context::{Context, Dialect};
use teascript_runtime::corelib;
use teascript_runtime::tuple::Tuple;
use teascript_runtime::typesystem::TypeSystem;
use teascript_runtime::value::{Data, Value};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

/// What one `run`/`run_for` call produced (§4.10). `run()`'s host-facing
/// contract collapses this to `Option<Value>` — "no value" on completion
/// or suspend — but the richer shape is kept internally so
/// `can_be_continued` and error reporting stay precise.
#[derive(Debug)]
pub enum RunOutcome {
    Yielded(Value),
    Suspended,
    Completed(Value),
    BudgetExceeded,
}

/// Compiles `source` into a [`VmProgram`] multiple [`CoroutineEngine`]
/// instances can share read-only (§4.10: "safe because the compiled
/// program is immutable post-compile").
pub fn build(source: &str, opt: OptLevel, name: &str) -> Result<Rc<VmProgram>, TeaError> {
    let cursor = SourceCursor::new(source, 0);
    let mut parser = Parser::new(cursor, Dialect::default()).map_err(|e| annotate(e, name))?;
    parser.parse_program().map_err(|e| annotate(e, name))?;
    let ast = Rc::new(parser.ast);
    let program = compile(&ast, opt).map_err(|e| annotate(e, name))?;
    Ok(Rc::new(program))
}

fn annotate(e: TeaError, name: &str) -> TeaError {
    if e.message.contains(name) {
        e
    } else {
        TeaError::new(e.kind, e.location, format!("{name}: {}", e.message))
    }
}

/// One resumable instance of a compiled program: its own [`Context`] and
/// [`Vm`] state, independent of any other instance sharing the same
/// `program` (§5 Ordering guarantees).
pub struct CoroutineEngine {
    ctx: Context,
    vm: Vm,
    program: Rc<VmProgram>,
    completed: bool,
    legacy_args: bool,
}

impl CoroutineEngine {
    /// Builds a fresh instance: bootstraps a new `Context` at
    /// `core_lib_level` and is ready to accept `set_input_parameters`.
    pub fn new(program: Rc<VmProgram>, dialect: Dialect, core_lib_level: Level, opt_out: u32) -> Result<Self, TeaError> {
        let mut ctx = Context::new(dialect);
        let ts = TypeSystem::new();
        let evaluator = EngineEvaluator::new(opt_out);
        corelib::bootstrap(&mut ctx, &ts, core_lib_level, opt_out, &evaluator)?;
        Ok(CoroutineEngine { ctx, vm: Vm::new(), program, completed: false, legacy_args: false })
    }

    pub fn legacy_args(mut self, enabled: bool) -> Self {
        self.legacy_args = enabled;
        self
    }

    /// Installs `values` as the `args` tuple (plus, if `legacy_args`,
    /// `arg1`..`argN`) in global scope, ahead of the next `run`/`run_for`
    /// (§4.10). Re-definition is allowed between runs — any prior `args`
    /// binding is dropped first so repeated calls don't hit
    /// `redefinition_of_variable`.
    pub fn set_input_parameters(&mut self, values: Vec<Value>) -> Result<(), TeaError> {
        let _ = self.ctx.remove("args", loc());
        let mut tuple = Tuple::new();
        for v in &values {
            tuple.append(v.clone());
        }
        self.ctx.add("args", Value::new(Data::Tuple(tuple)), loc())?;
        if self.legacy_args {
            for (i, v) in values.iter().enumerate() {
                let name = format!("arg{}", i + 1);
                let _ = self.ctx.remove(&name, loc());
                self.ctx.add(name, v.clone(), loc())?;
            }
        }
        Ok(())
    }

    /// Runs until the next `yield`, `suspend`, or completion (§4.10). A
    /// completed instance refuses to resume — see `reset`/`change_coroutine`.
    pub fn run(&mut self) -> Result<RunOutcome, TeaError> {
        self.run_for(Budget::unbounded())
    }

    pub fn run_for(&mut self, budget: Budget) -> Result<RunOutcome, TeaError> {
        if self.completed {
            return Err(TeaError::new(ErrorKind::RuntimeError, loc(), "coroutine already completed; call reset() or change_coroutine() before resuming"));
        }
        let program = Rc::clone(&self.program);
        match self.vm.run_budgeted(&mut self.ctx, &program, &program.top, Boundary::TopLevel, budget)? {
            ExecStop::Returned(v) => {
                self.completed = true;
                Ok(RunOutcome::Completed(v))
            }
            ExecStop::Exited(v) => {
                self.completed = true;
                Ok(RunOutcome::Completed(v))
            }
            ExecStop::Suspended => Ok(RunOutcome::Suspended),
            ExecStop::Yielded(v) => Ok(RunOutcome::Yielded(v)),
            ExecStop::BudgetExceeded => Ok(RunOutcome::BudgetExceeded),
        }
    }

    /// `true` iff suspended or yielded and not completed (§4.10). A
    /// budget-exceeded run is also still continuable.
    pub fn can_be_continued(&self) -> bool {
        !self.completed
    }

    /// Zeroes VM state (`pc`, stacks) and drops local scopes back to
    /// global, but preserves the compiled program and whatever host
    /// bindings live in global scope (§4.9/§4.10).
    pub fn reset(&mut self) {
        self.vm.reset();
        self.ctx.truncate_to_global();
        self.completed = false;
    }

    /// Swaps in a different compiled program, keeping the context and its
    /// global bindings; VM state is zeroed since resuming a different
    /// program's `pc` against a new instruction stream makes no sense.
    pub fn change_coroutine(&mut self, program: Rc<VmProgram>) {
        self.program = program;
        self.vm.reset();
        self.completed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factorial_coroutine_yields_running_products() {
        let program = build("def fac := 1 def i := 1 repeat { fac := fac * i yield fac i := i + 1 }", OptLevel::O0, "<fac>").unwrap();
        let mut engine = CoroutineEngine::new(program, Dialect::default(), Level::Minimal, 0).unwrap();
        let mut last = 0i64;
        for _ in 0..5 {
            match engine.run().unwrap() {
                RunOutcome::Yielded(v) => last = v.get_as_integer(loc()).unwrap(),
                other => panic!("expected a yield, got {other:?}"),
            }
        }
        assert_eq!(last, 120);
        assert!(engine.can_be_continued());
    }

    #[test]
    fn input_parameter_coroutine_reads_three_args() {
        let program = build("forall a in args { yield a }", OptLevel::O0, "<args>").unwrap();
        let mut engine = CoroutineEngine::new(program, Dialect::default(), Level::Minimal, 0).unwrap();
        engine
            .set_input_parameters(vec![Value::new(Data::I64(42)), Value::new(Data::Bool(true)), Value::new(Data::String("Hello".to_string()))])
            .unwrap();

        let first = match engine.run().unwrap() {
            RunOutcome::Yielded(v) => v,
            other => panic!("expected a yield, got {other:?}"),
        };
        assert_eq!(first.get_as_integer(loc()).unwrap(), 42);

        let second = match engine.run().unwrap() {
            RunOutcome::Yielded(v) => v,
            other => panic!("expected a yield, got {other:?}"),
        };
        assert!(second.get_as_bool(loc()).unwrap());

        let third = match engine.run().unwrap() {
            RunOutcome::Yielded(v) => v,
            other => panic!("expected a yield, got {other:?}"),
        };
        assert_eq!(third.get_as_string(loc()).unwrap(), "Hello");

        match engine.run().unwrap() {
            RunOutcome::Completed(_) => {}
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(!engine.can_be_continued());
    }

    #[test]
    fn reset_allows_rerunning_after_completion() {
        let program = build("yield 1", OptLevel::O0, "<once>").unwrap();
        let mut engine = CoroutineEngine::new(program, Dialect::default(), Level::Minimal, 0).unwrap();
        engine.run().unwrap();
        match engine.run().unwrap() {
            RunOutcome::Completed(_) => {}
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(engine.run().is_err());
        engine.reset();
        match engine.run().unwrap() {
            RunOutcome::Yielded(v) => assert_eq!(v.get_as_integer(loc()).unwrap(), 1),
            other => panic!("expected a yield after reset, got {other:?}"),
        }
    }
}
