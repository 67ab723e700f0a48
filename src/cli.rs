//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a number of seconds, fractional allowed
fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s.parse().map_err(|e| format!("Invalid seconds: {}", e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("Timeout must be a positive number of seconds".to_string());
    }
    Ok(secs)
}

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Backend to use, with options as name:key=value,... [available: {}]",
        fpctl_platform::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "fpctl")]
#[command(author, version, about = "Fingerprint sensor power and interrupt control", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a board file
    Check {
        /// Board file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Attach a sensor and report interrupt notifications
    Attach {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Board file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Enable wake-on-interrupt after attaching
        #[arg(long)]
        wakeup: bool,

        /// Stop after this many notifications
        #[arg(long)]
        events: Option<u64>,

        /// Stop after this many seconds without a notification
        #[arg(long, default_value = "10", value_parser = parse_seconds)]
        timeout: f64,
    },

    /// List compiled-in backends
    ListBackends,

    /// List supported sensor variants
    ListVariants,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_attach() {
        let cli = Cli::try_parse_from([
            "fpctl", "-vv", "attach", "-b", "dummy", "-c", "board.toml", "--wakeup", "--events",
            "3", "--timeout", "0.5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Attach {
                backend,
                config,
                wakeup,
                events,
                timeout,
            } => {
                assert_eq!(backend, "dummy");
                assert_eq!(config, PathBuf::from("board.toml"));
                assert!(wakeup);
                assert_eq!(events, Some(3));
                assert_eq!(timeout, 0.5);
            }
            _ => panic!("expected attach"),
        }
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("2"), Ok(2.0));
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
    }
}
