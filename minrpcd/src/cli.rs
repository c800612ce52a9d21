//! Command-line parsing

use crate::config::{DaemonConfig, TransportMode};
use std::path::Path;

/// What the command line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(DaemonConfig),
    Help,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

/// Parses `args`, including the program name at index 0
///
/// A `--config` file is loaded first wherever it appears; every other flag
/// then overrides what the file set.
pub fn parse_args(args: &[String]) -> Result<CliAction, String> {
    let mut config = match args.iter().position(|arg| arg == "--config" || arg == "-c") {
        Some(i) => {
            let path = value(args, i + 1, "--config")?;
            DaemonConfig::load(Path::new(path))
                .map_err(|e| format!("Failed to load config file: {}", e))?
        }
        None => DaemonConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
            }
            "--listen" | "-l" => {
                i += 1;
                let addr = value(args, i, "--listen")?;
                config.transport = TransportMode::Tcp {
                    addr: addr.to_string(),
                };
            }
            "--stdio" => {
                config.transport = TransportMode::Stdio;
            }
            "--page-size" => {
                i += 1;
                let raw = value(args, i, "--page-size")?;
                config.server.page_size = raw
                    .parse()
                    .map_err(|_| format!("Invalid page-size value: {}", raw))?;
            }
            "--arena-limit" => {
                i += 1;
                let raw = value(args, i, "--arena-limit")?;
                let limit: usize = raw
                    .parse()
                    .map_err(|_| format!("Invalid arena-limit value: {}", raw))?;
                config.server.arena_limit = (limit > 0).then_some(limit);
            }
            "--log-level" => {
                i += 1;
                config.log_level = value(args, i, "--log-level")?.to_string();
            }
            "--once" => {
                config.once = true;
            }
            "--help" | "-h" => return Ok(CliAction::Help),
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    config.level_filter().map_err(|e| e.to_string())?;
    Ok(CliAction::Run(config))
}

pub fn print_usage(program: &str) {
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      JSON config file, overridden by other flags");
    eprintln!("  -l, --listen <ADDR>      Serve TCP connections on ADDR");
    eprintln!("  --stdio                  Serve one session on stdin/stdout (default)");
    eprintln!("  --page-size <BYTES>      Arena page size (default 2048)");
    eprintln!("  --arena-limit <BYTES>    Cap on arena bytes per session (0 = unlimited)");
    eprintln!("  --log-level <LEVEL>      off, error, warn, info, debug or trace");
    eprintln!("  --once                   Exit after the first TCP session");
    eprintln!("  -h, --help               Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} --stdio --log-level warn", program);
    eprintln!("  {} --listen 127.0.0.1:9091 --once", program);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("minrpcd")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn run_config(list: &[&str]) -> DaemonConfig {
        match parse_args(&args(list)).unwrap() {
            CliAction::Run(config) => config,
            CliAction::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn test_no_flags_is_default() {
        assert_eq!(run_config(&[]), DaemonConfig::default());
    }

    #[test]
    fn test_listen_and_limits() {
        let config = run_config(&[
            "--listen",
            "0.0.0.0:9091",
            "--page-size",
            "4096",
            "--arena-limit",
            "1048576",
            "--once",
        ]);
        assert_eq!(
            config.transport,
            TransportMode::Tcp {
                addr: "0.0.0.0:9091".to_string()
            }
        );
        assert_eq!(config.server.page_size, 4096);
        assert_eq!(config.server.arena_limit, Some(1048576));
        assert!(config.once);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "transport": {{ "mode": "tcp", "addr": "127.0.0.1:1" }}, "log_level": "debug" }}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = run_config(&["--stdio", "--config", path]);
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_args(&args(&["--listen"])),
            Err("Missing value for --listen".to_string())
        );
        assert!(parse_args(&args(&["--page-size", "big"])).is_err());
        assert!(parse_args(&args(&["--log-level", "loud"])).is_err());
        assert_eq!(
            parse_args(&args(&["--bogus"])),
            Err("Unknown option: --bogus".to_string())
        );
        assert_eq!(parse_args(&args(&["-h"])), Ok(CliAction::Help));
    }
}
