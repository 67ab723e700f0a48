//! fpctl - Fingerprint sensor power and interrupt control
//!
//! Brings up an FPC1020 or Goodix gf3266 fingerprint sensor from a board
//! file: claims its lines and supply, applies the active pin state, powers
//! it, pulses reset and bridges its interrupt into `irq` attribute
//! notifications.
//!
//! # Architecture
//!
//! The CLI only talks to `fpctl-platform`, which opens a backend by name
//! (the emulated `dummy` platform or the Linux GPIO character device) and
//! hands back a `SensorHandle`. The electrical lifecycle lives in
//! `fpctl-core` and is identical for every backend.

mod cli;
mod commands;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Check { config } => commands::run_check(&config),
        Commands::Attach {
            backend,
            config,
            wakeup,
            events,
            timeout,
        } => commands::run_attach(
            &backend,
            &config,
            wakeup,
            events,
            Duration::from_secs_f64(timeout),
        ),
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
        Commands::ListVariants => {
            commands::list_variants();
            Ok(())
        }
    }
}
