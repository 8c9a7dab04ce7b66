//! `Engine` (§6): the host-facing facade tying together a [`Context`], the
//! core-library bootstrap (C11), and the AST evaluator (C7) into the single
//! entry point embedding code talks to. Grounded on the teacher's
//! `CompilerConfig::new().with_builtin(...)` builder style (`compiler/src/
//! config.rs`) for the `with_dialect`/`core_lib_level` methods.

use crate::corelib_ext::EngineEvaluator;
use crate::eval::eval_program;
use crate::parser::Parser;
use std::fs;
use std::rc::Rc;
use teascript_core::{ErrorKind, SourceCursor, SourceLocation, TeaError};
use teascript_runtime::builtins::Level;
use teascript_runtime::context::{Context, Dialect};
use teascript_runtime::corelib;
use teascript_runtime::tuple::Tuple;
use teascript_runtime::typesystem::TypeSystem;
use teascript_runtime::value::{Data, FunctionValue, NativeFn, Value};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{feff}').unwrap_or(s)
}

/// A host embedding a TeaScript program. One `Engine` owns one [`Context`];
/// running multiple, independent programs means constructing multiple
/// engines (§5: instances never share mutable state with each other).
pub struct Engine {
    ctx: Context,
    ts: TypeSystem,
    level: Level,
    opt_out: u32,
    /// `true` exposes script args as `arg1`..`argN` in addition to the
    /// `args` tuple, matching the original's legacy flag (§6).
    legacy_args: bool,
    next_file_id: u32,
    bootstrapped: bool,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            ctx: Context::new(Dialect::default()),
            ts: TypeSystem::new(),
            level: Level::Full,
            opt_out: 0,
            legacy_args: false,
            next_file_id: 1,
            bootstrapped: false,
        }
    }

    /// Selects the grammar/parameter-binding dialect (§4.6, §9 Glossary).
    /// Must be called before the first `execute_*`/`add_var`/`call_func`,
    /// since bootstrap latches once the Context is first used.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.ctx = Context::new(dialect);
        self
    }

    /// Selects how much of the core library (§4.11) to load: `Minimal`
    /// loads only native builtins and type descriptors, `Full` also runs
    /// the higher-level TeaScript-source fragments.
    pub fn core_lib_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Suppresses optional core-library capabilities (§4.11). Bitwise-OR
    /// of `teascript_runtime::builtins::opt_out` flags.
    pub fn opt_out(mut self, mask: u32) -> Self {
        self.opt_out = mask;
        self
    }

    /// Exposes script arguments as `arg1`..`argN` in addition to the
    /// `args` tuple (legacy compatibility surface, §6).
    pub fn legacy_args(mut self, enabled: bool) -> Self {
        self.legacy_args = enabled;
        self
    }

    fn ensure_bootstrapped(&mut self) -> Result<(), TeaError> {
        if self.bootstrapped {
            return Ok(());
        }
        let evaluator = EngineEvaluator::new(self.opt_out);
        corelib::bootstrap(&mut self.ctx, &self.ts, self.level, self.opt_out, &evaluator)?;
        self.bootstrapped = true;
        Ok(())
    }

    fn fresh_file_id(&mut self) -> u32 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    fn run_source(&mut self, source: &str, file_id: u32) -> Result<Value, TeaError> {
        self.ensure_bootstrapped()?;
        let cursor = SourceCursor::new(source, file_id);
        let mut parser = Parser::new(cursor, self.ctx.dialect)?;
        parser.parse_program()?;
        let ast = Rc::new(parser.ast);
        eval_program(&ast, &mut self.ctx)
    }

    /// Parses and evaluates `source` as a standalone program (§6). `name`
    /// identifies the source for diagnostics only — it is not BOM-stripped
    /// since `execute_code` takes in-memory text, not a file (§9 Open
    /// Question).
    pub fn execute_code(&mut self, source: &str, name: &str) -> Result<Value, TeaError> {
        let file_id = self.fresh_file_id();
        self.run_source(source, file_id).map_err(|e| annotate(e, name))
    }

    /// Reads `path`, strips a leading BOM, and evaluates it (§6). Script
    /// `args` are bound as an `args` tuple of strings plus, if
    /// `legacy_args` is set, individual `arg1`..`argN` globals.
    pub fn execute_script(&mut self, path: &str, args: &[String]) -> Result<Value, TeaError> {
        let raw = fs::read_to_string(path).map_err(|e| TeaError::new(ErrorKind::LoadFileError, loc(), format!("execute_script '{path}': {e}")))?;
        let source = strip_bom(&raw).to_string();

        self.ensure_bootstrapped()?;
        self.bind_script_args(args)?;

        let file_id = self.fresh_file_id();
        self.run_source(&source, file_id).map_err(|e| annotate(e, path))
    }

    fn bind_script_args(&mut self, args: &[String]) -> Result<(), TeaError> {
        let mut tuple = Tuple::new();
        for a in args {
            tuple.append(Value::new(Data::String(a.clone())));
        }
        self.ctx.add("args", Value::new(Data::Tuple(tuple)), loc())?;
        if self.legacy_args {
            for (i, a) in args.iter().enumerate() {
                self.ctx.add(format!("arg{}", i + 1), Value::new(Data::String(a.clone())), loc())?;
            }
        }
        Ok(())
    }

    /// Binds a host value into script scope as a mutable variable.
    pub fn add_var(&mut self, name: &str, value: Value) -> Result<(), TeaError> {
        self.ensure_bootstrapped()?;
        self.ctx.add(name, value, loc())
    }

    /// Binds a host value into script scope as a `const`.
    pub fn add_const(&mut self, name: &str, value: Value) -> Result<(), TeaError> {
        self.ensure_bootstrapped()?;
        let mut value = value;
        value.set_const(true);
        self.ctx.add(name, value, loc())
    }

    /// Reads a script-visible global back out.
    pub fn get_var(&mut self, name: &str) -> Result<Value, TeaError> {
        self.ensure_bootstrapped()?;
        self.ctx
            .find(name)
            .cloned()
            .ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc(), format!("get_var: '{name}' is not defined")))
    }

    /// Registers a host-implemented function callable from script as
    /// `name(...)` (§6). `func` receives the live `Context` (so it can
    /// itself call back into script) and the positional argument list.
    pub fn register_user_callback(&mut self, name: &str, arity: Option<usize>, func: NativeFn) -> Result<(), TeaError> {
        self.ensure_bootstrapped()?;
        let f = FunctionValue::Native { name: name.to_string(), arity, func };
        self.ctx.add(name, Value::new(Data::Function(f)), loc())
    }

    /// Calls a previously-defined script function by name.
    pub fn call_func(&mut self, name: &str, args: Vec<Value>) -> Result<Value, TeaError> {
        self.ensure_bootstrapped()?;
        let callee = self
            .ctx
            .find(name)
            .cloned()
            .ok_or_else(|| TeaError::new(ErrorKind::UnknownIdentifier, loc(), format!("call_func: '{name}' is not defined")))?;
        let func = match callee.borrow().clone() {
            Data::Function(f) => f,
            other => return Err(TeaError::new(ErrorKind::TypeMismatch, loc(), format!("call_func: '{name}' is a {}, not a Function", other.type_name()))),
        };
        match func {
            FunctionValue::Native { func, arity, name: fname } => {
                if let Some(n) = arity {
                    if args.len() != n {
                        return Err(TeaError::new(ErrorKind::RuntimeError, loc(), format!("{fname}: expected {n} argument(s), got {}", args.len())));
                    }
                }
                func(&mut self.ctx, args)
            }
            FunctionValue::Compiled { program, entry, .. } => program.call(entry, &mut self.ctx, args),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

fn annotate(e: TeaError, name: &str) -> TeaError {
    if e.message.contains(name) {
        e
    } else {
        TeaError::new(e.kind, e.location, format!("{name}: {}", e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_code_returns_value() {
        let mut engine = Engine::new();
        let result = engine.execute_code("1 + 2", "<test>").unwrap();
        assert_eq!(result.get_as_integer(loc()).unwrap(), 3);
    }

    #[test]
    fn add_var_is_visible_to_script() {
        let mut engine = Engine::new();
        engine.add_var("x", Value::new(Data::I64(10))).unwrap();
        let result = engine.execute_code("x + 1", "<test>").unwrap();
        assert_eq!(result.get_as_integer(loc()).unwrap(), 11);
    }

    #[test]
    fn add_const_rejects_reassignment() {
        let mut engine = Engine::new();
        engine.add_const("k", Value::new(Data::I64(5))).unwrap();
        let err = engine.execute_code("k := 6", "<test>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConstAssign);
    }

    #[test]
    fn call_func_invokes_script_function() {
        let mut engine = Engine::new();
        engine.execute_code("func double(x) { return x * 2 }", "<test>").unwrap();
        let result = engine.call_func("double", vec![Value::new(Data::I64(21))]).unwrap();
        assert_eq!(result.get_as_integer(loc()).unwrap(), 42);
    }

    #[test]
    fn get_var_reads_script_binding() {
        let mut engine = Engine::new();
        engine.execute_code("def y := 9", "<test>").unwrap();
        let v = engine.get_var("y").unwrap();
        assert_eq!(v.get_as_integer(loc()).unwrap(), 9);
    }
}
