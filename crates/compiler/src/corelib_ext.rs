//! Bridges the AST evaluator (C7) into the core-library bootstrap (C11),
//! which lives in `teascript-runtime` and cannot depend on this crate.
//!
//! `EngineEvaluator` implements `teascript_runtime::corelib::FragmentEvaluator`:
//! `eval_fragment` runs the staged `util.tea`/`core.tea` bootstrap sources
//! through [`crate::parser::Parser`] + [`crate::eval::eval_program`], and
//! `register_extra_natives` registers `_eval`/`eval_file`, the two builtins
//! that need a parser and so could never live in `teascript-runtime` itself.

use crate::eval::eval_program;
use crate::parser::Parser;
use std::fs;
use std::rc::Rc;
use teascript_core::{ErrorKind, SourceCursor, SourceLocation, TeaError};
use teascript_runtime::builtins::opt_out;
use teascript_runtime::context::{Context, Dialect};
use teascript_runtime::corelib::FragmentEvaluator;
use teascript_runtime::value::{Data, FunctionValue, Value};

/// File id used for source that has no file of its own: bootstrap
/// fragments and strings passed to `_eval`. Real scripts get their own id
/// from the host (§6); nothing here collides with those since the engine
/// never reuses this one for a file path.
const DYNAMIC_FILE_ID: u32 = u32::MAX;

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

/// Strips a leading UTF-8 byte-order mark. Applied only when reading a
/// script from disk (`eval_file`), never to an in-memory string handed to
/// `_eval` — matching `execute_script`'s own file-reading path (§4, Open
/// Questions).
fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{feff}').unwrap_or(s)
}

fn parse_and_run(source: &str, file_id: u32, dialect: Dialect, ctx: &mut Context) -> Result<Value, TeaError> {
    let cursor = SourceCursor::new(source, file_id);
    let mut parser = Parser::new(cursor, dialect)?;
    parser.parse_program()?;
    let ast = Rc::new(parser.ast);
    eval_program(&ast, ctx)
}

/// Implements [`FragmentEvaluator`] on top of the tree-walking evaluator.
/// Carries the host's opt-out mask (§4.11) since `register_extra_natives`
/// runs outside `builtins::register_all`'s own per-entry opt-out check and
/// so has to gate `_eval`/`eval_file` on `NO_EVAL` itself.
pub struct EngineEvaluator {
    opt_out: u32,
}

impl EngineEvaluator {
    pub fn new(opt_out: u32) -> Self {
        EngineEvaluator { opt_out }
    }
}

impl Default for EngineEvaluator {
    fn default() -> Self {
        EngineEvaluator::new(0)
    }
}

impl FragmentEvaluator for EngineEvaluator {
    fn eval_fragment(&self, ctx: &mut Context, name: &str, source: &str) -> Result<Value, TeaError> {
        parse_and_run(source, DYNAMIC_FILE_ID, Dialect::default(), ctx).map_err(|e| {
            TeaError::new(ErrorKind::ParsingError, e.location, format!("bootstrap fragment '{name}': {}", e.message))
        })
    }

    fn register_extra_natives(&self, ctx: &mut Context) -> Result<(), TeaError> {
        if self.opt_out & opt_out::NO_EVAL != 0 {
            return Ok(());
        }
        let f = FunctionValue::Native { name: "_eval".to_string(), arity: Some(1), func: native_eval() };
        ctx.add("_eval", Value::new(Data::Function(f)), loc())?;
        let f = FunctionValue::Native { name: "eval_file".to_string(), arity: Some(1), func: native_eval_file() };
        ctx.add("eval_file", Value::new(Data::Function(f)), loc())?;
        Ok(())
    }
}

fn native_eval() -> teascript_runtime::value::NativeFn {
    Rc::new(|ctx: &mut Context, args: Vec<Value>| {
        let source = teascript_runtime::builtins::arg(&args, 0, "_eval", loc())?.get_as_string(loc())?;
        let dialect = ctx.dialect;
        parse_and_run(&source, DYNAMIC_FILE_ID, dialect, ctx)
    })
}

fn native_eval_file() -> teascript_runtime::value::NativeFn {
    Rc::new(|ctx: &mut Context, args: Vec<Value>| {
        let path = teascript_runtime::builtins::arg(&args, 0, "eval_file", loc())?.get_as_string(loc())?;
        let raw = fs::read_to_string(&path).map_err(|e| TeaError::new(ErrorKind::LoadFileError, loc(), format!("eval_file '{path}': {e}")))?;
        let source = strip_bom(&raw);
        let dialect = ctx.dialect;
        parse_and_run(source, DYNAMIC_FILE_ID, dialect, ctx)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use teascript_runtime::corelib::{self, NoFragments};
    use teascript_runtime::typesystem::TypeSystem;

    #[test]
    fn eval_fragment_runs_core_source() {
        let mut ctx = Context::new(Dialect::default());
        let ts = TypeSystem::new();
        corelib::bootstrap(&mut ctx, &ts, teascript_runtime::builtins::Level::Minimal, 0, &NoFragments).unwrap();
        let evaluator = EngineEvaluator::default();
        let result = evaluator.eval_fragment(&mut ctx, "<test>", "1 + 2").unwrap();
        assert_eq!(result.get_as_integer(loc()).unwrap(), 3);
    }

    #[test]
    fn register_extra_natives_adds_eval() {
        let mut ctx = Context::new(Dialect::default());
        let ts = TypeSystem::new();
        corelib::bootstrap(&mut ctx, &ts, teascript_runtime::builtins::Level::Minimal, 0, &NoFragments).unwrap();
        EngineEvaluator::default().register_extra_natives(&mut ctx).unwrap();
        assert!(ctx.is_defined("_eval"));
        assert!(ctx.is_defined("eval_file"));
    }

    #[test]
    fn no_eval_opt_out_suppresses_registration() {
        let mut ctx = Context::new(Dialect::default());
        let ts = TypeSystem::new();
        corelib::bootstrap(&mut ctx, &ts, teascript_runtime::builtins::Level::Minimal, 0, &NoFragments).unwrap();
        EngineEvaluator::new(opt_out::NO_EVAL).register_extra_natives(&mut ctx).unwrap();
        assert!(!ctx.is_defined("_eval"));
        assert!(!ctx.is_defined("eval_file"));
    }
}
