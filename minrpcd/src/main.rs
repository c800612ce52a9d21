//! # MinRPC Host Daemon
//!
//! Main entry point for the MinRPC daemon.

use minrpcd::{logger, parse_args, print_usage, CliAction, Daemon};
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("minrpcd");

    let config = match parse_args(&args) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_usage(program);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(program);
            process::exit(1);
        }
    };

    let level = config.level_filter().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });
    if let Err(e) = logger::init(level) {
        eprintln!("Failed to install logger: {}", e);
        process::exit(1);
    }

    let mut daemon = Daemon::new(config);
    match daemon.run() {
        Ok(status) => process::exit(status.code()),
        Err(e) => {
            eprintln!("Daemon error: {}", e);
            process::exit(1);
        }
    }
}
