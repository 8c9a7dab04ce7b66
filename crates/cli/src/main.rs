//! `teascript` - command-line host for the TeaScript engine.
//!
//! Thin driver over `teascript-compiler`'s `Engine` (tree-walking backend,
//! C7) and its bytecode compiler + VM (C8/C9): `--backend vm` runs the same
//! program through `codegen::compile` + `vm::Vm` instead, which exists
//! mainly so the two backends' outputs can be diffed from the command line.

use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use teascript_compiler::codegen::{compile, OptLevel as CodegenOptLevel};
use teascript_compiler::corelib_ext::EngineEvaluator;
use teascript_compiler::parser::Parser;
use teascript_compiler::vm::{Boundary, ExecStop, Vm};
use teascript_compiler::Engine;
use teascript_core::{ErrorKind, SourceCursor, SourceLocation, TeaError};
use teascript_runtime::builtins::Level;
use teascript_runtime::context::{Context, Dialect};
use teascript_runtime::corelib;
use teascript_runtime::typesystem::TypeSystem;
use teascript_runtime::value::Value;

#[derive(ClapParser)]
#[command(name = "teascript")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and evaluate TeaScript programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Which execution backend evaluates the program.
    #[arg(long, value_enum, default_value_t = Backend::Tree, global = true)]
    backend: Backend,

    /// Bytecode optimization level, only meaningful with `--backend vm`.
    #[arg(long, value_enum, default_value_t = OptArg::O1, global = true)]
    opt: OptArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Tree,
    Vm,
}

#[derive(Clone, Copy, ValueEnum)]
enum OptArg {
    Debug,
    O0,
    O1,
    O2,
}

impl From<OptArg> for CodegenOptLevel {
    fn from(o: OptArg) -> Self {
        match o {
            OptArg::Debug => CodegenOptLevel::Debug,
            OptArg::O0 => CodegenOptLevel::O0,
            OptArg::O1 => CodegenOptLevel::O1,
            OptArg::O2 => CodegenOptLevel::O2,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a .tea source file.
    Run {
        /// Path to the TeaScript source file.
        path: PathBuf,

        /// Arguments exposed to the script as the `args` tuple.
        args: Vec<String>,
    },

    /// Evaluate an inline snippet of TeaScript source.
    Eval {
        /// Source text to parse and run.
        code: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("teascript=info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run { path, args } => run_path(&cli, path, args),
        Commands::Eval { code } => run_code(&cli, code),
    };

    match result {
        Ok(value) => {
            println!("{}", value.print_value());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_path(cli: &Cli, path: &PathBuf, args: &[String]) -> Result<Value, TeaError> {
    match cli.backend {
        Backend::Tree => {
            let mut engine = Engine::new();
            let path_str = path.to_string_lossy().into_owned();
            engine.execute_script(&path_str, args)
        }
        Backend::Vm => {
            let source = std::fs::read_to_string(path).map_err(|e| TeaError::new(ErrorKind::LoadFileError, SourceLocation::synthetic(), format!("{}: {e}", path.display())))?;
            run_via_vm(&source, cli.opt.into())
        }
    }
}

fn run_code(cli: &Cli, code: &str) -> Result<Value, TeaError> {
    match cli.backend {
        Backend::Tree => {
            let mut engine = Engine::new();
            engine.execute_code(code, "<eval>")
        }
        Backend::Vm => run_via_vm(code, cli.opt.into()),
    }
}

fn run_via_vm(source: &str, level: CodegenOptLevel) -> Result<Value, TeaError> {
    let cursor = SourceCursor::new(source, 0);
    let mut parser = Parser::new(cursor, Dialect::default())?;
    parser.parse_program()?;
    let ast = Rc::new(parser.ast);
    let program = Rc::new(compile(&ast, level)?);

    let mut ctx = Context::new(Dialect::default());
    let ts = TypeSystem::new();
    let evaluator = EngineEvaluator::new(0);
    corelib::bootstrap(&mut ctx, &ts, Level::Full, 0, &evaluator)?;

    let mut vm = Vm::new();
    match vm.run(&mut ctx, &program, &program.top, Boundary::TopLevel)? {
        ExecStop::Returned(v) | ExecStop::Exited(v) | ExecStop::Yielded(v) => Ok(v),
        ExecStop::Suspended => Ok(Value::nav()),
        ExecStop::BudgetExceeded => unreachable!("run() uses an unbounded budget"),
    }
}
