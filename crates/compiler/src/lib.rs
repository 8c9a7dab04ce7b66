pub mod ast;
pub mod codegen;
pub mod corelib_ext;
pub mod coroutine;
pub mod engine;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod vm;

pub use ast::Ast;
pub use engine::Engine;
pub use eval::{eval_program, Signal, StepResult};
pub use lexer::Lexer;
pub use parser::{Parser, PartialParser};
