use crate::ast::Program;
use crate::config::Config;
use crate::environment::Environment;
use crate::error::KestrelError;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::output::{OutputSink, StdoutSink};
use crate::parser::Parser;

pub fn parse_source(source: &str) -> Result<Program, KestrelError> {
    let mut lexer = Lexer::new(source.to_string());
    let tokens = lexer.scan_tokens()?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}

/// Lexes, parses and evaluates `source`, returning the environment the
/// program left behind.
pub fn interpret(source: &str, sink: &mut dyn OutputSink) -> Result<Environment, KestrelError> {
    interpret_with_config(source, sink, Config::default())
}

pub fn interpret_with_config(
    source: &str,
    sink: &mut dyn OutputSink,
    config: Config,
) -> Result<Environment, KestrelError> {
    let program = parse_source(source)?;
    tracing::debug!(statements = program.statements.len(), "parsed program");

    let mut evaluator = Evaluator::new(sink, config);
    evaluator.check_types(&program)?;
    evaluator.evaluate_program(&program)?;
    Ok(evaluator.into_environment())
}

/// Runs a script against stdout, reporting any error. Returns whether it succeeded.
pub fn run(source: &str, filename: Option<&str>, config: Config) -> bool {
    let mut sink = StdoutSink;
    match interpret_with_config(source, &mut sink, config) {
        Ok(_) => true,
        Err(error) => {
            error.report(source, filename);
            false
        }
    }
}
