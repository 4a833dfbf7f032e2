use clap::{Arg, ArgAction, Command};
use kestrel::Config;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let matches = Command::new("kestrel")
        .about("Interpreter for the Kestrel expression language")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("Maximum nesting of function calls")
                .value_parser(clap::value_parser!(usize))
                .default_value("10000"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log interpreter internals (repeat for more detail)")
                .action(ArgAction::Count),
        )
        .get_matches();

    init_tracing(matches.get_count("verbose"));

    let depth = matches
        .get_one::<usize>("max-depth")
        .copied()
        .unwrap_or(Config::DEFAULT_MAX_CALL_DEPTH);
    let config = Config::default().with_max_call_depth(depth);
    let file = matches.get_one::<String>("file");
    let interactive = matches.get_flag("interactive");

    let succeeded = match file {
        Some(path) if !interactive => run_file(path, config),
        _ => {
            kestrel::start_repl(config);
            true
        }
    };

    if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_file(path: &str, config: Config) -> bool {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        return false;
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let filename = path.display().to_string();
            kestrel::run(&source, Some(filename.as_str()), config)
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            false
        }
    }
}
