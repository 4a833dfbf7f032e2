use crate::ast::{AssignTarget, Expr, Program};
use crate::config::Config;
use crate::evaluator::Evaluator;
use crate::output::StdoutSink;
use crate::runner::parse_source;
use std::io::{self, Write};

/// Interactive session. Definitions persist between lines; the value of a
/// line is echoed unless it is a binding or declaration.
pub fn start(config: Config) {
    println!("Kestrel {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    let mut sink = StdoutSink;
    let mut evaluator = Evaluator::new(&mut sink, config);

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                if !run_repl_command(line, &mut evaluator) {
                    break;
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}

/// Returns `false` when the session cannot continue.
fn run_repl_command(source: &str, evaluator: &mut Evaluator) -> bool {
    let program = match parse_source(source) {
        Ok(program) => program,
        Err(error) => {
            error.report(source, None);
            return true;
        }
    };

    if let Err(error) = evaluator.check_types(&program) {
        error.report(source, None);
        return true;
    }

    match evaluator.evaluate_program(&program) {
        Ok(Some(value)) if echoes(&program) => {
            println!("{}", value);
            true
        }
        Ok(_) => true,
        Err(error) => {
            error.report(source, None);
            !error.is_fatal()
        }
    }
}

fn echoes(program: &Program) -> bool {
    !matches!(
        program.statements.last(),
        Some(Expr::Assign {
            target: AssignTarget::Variable(_),
            ..
        }) | Some(Expr::FunctionDef { .. })
            | Some(Expr::DataTypeDecl { .. })
            | None
    )
}
