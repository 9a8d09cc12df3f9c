//! `opo`: inspect and run OPL object files.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Usage, input or file format error
//! - 3: Runtime error, or the program reached an unknown opcode

mod commands;
mod console;

use std::process;

use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "info" => commands::info(&args[2..]),
        "run" => commands::run(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,opo_vm=info,opo_loader=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    eprintln!("Usage: opo <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  info <file.opo> [--json]                          Show header and procedures");
    eprintln!("  run <file.opo> [--heap-size N] [--max-steps N]    Execute a program");
}
