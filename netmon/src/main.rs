//! `netmon`: the passive capture binary (spec.md §6 "Monitor"). Parses CLI
//! flags and an optional YAML config file into a `Configuration`, spawns one
//! worker thread per configured worker, and runs until SIGINT/SIGTERM.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;

use netmon::config::{Cli, Configuration};
use netmon::worker;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = match Configuration::load(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("netmon: configuration error: {e}");
            std::process::exit(1);
        }
    };

    log::info!(
        "starting netmon: device={} capture_method={:?} workers={} events_dir={}",
        config.device,
        config.capture_method,
        config.workers,
        config.events_dir.display(),
    );

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_signal_handlers(&stop) {
        eprintln!("netmon: failed to install signal handlers: {e}");
        std::process::exit(1);
    }

    match worker::workers::run(&config, stop) {
        Ok(stats) => {
            for (id, s) in stats.iter().enumerate() {
                s.log_summary(&id.to_string());
            }
        }
        Err(e) => {
            eprintln!("netmon: {e}");
            std::process::exit(1);
        }
    }
}

/// Registers SIGINT and SIGTERM to flip `stop` (spec.md §5 "Cancellation"),
/// which every worker polls at each 100ms capture timeout.
fn install_signal_handlers(stop: &Arc<AtomicBool>) -> Result<(), std::io::Error> {
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(stop))?;
    Ok(())
}
