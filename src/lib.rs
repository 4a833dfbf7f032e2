// Kestrel language interpreter library
//
// A small dynamically typed expression language with closures, exact
// arithmetic and user-declared algebraic data types.

pub mod ast;
pub mod config;
pub mod datatype;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod function;
pub mod lexer;
pub mod library;
pub mod number;
pub mod output;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod value;

pub use ast::{Expr, Program};
pub use config::Config;
pub use environment::{Environment, FrameId};
pub use error::{ErrorKind, KestrelError, Position, Span};
pub use evaluator::Evaluator;
pub use lexer::{Lexer, Token, TokenType};
pub use output::{BufferSink, OutputSink, StdoutSink};
pub use parser::Parser;
pub use value::Value;

pub use repl::start as start_repl;
pub use runner::{interpret, interpret_with_config, parse_source, run};
