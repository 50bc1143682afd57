//! `netmon-merge`: k-way merges two or more event files into one, ordered by
//! timestamp (spec.md §4.4, §8 property 3). Thin CLI shell over
//! `netmon_events::merger::merge`.

use std::path::PathBuf;

use clap::Parser;

/// CLI surface for `netmon-merge` (spec.md §6).
#[derive(Debug, Parser)]
#[command(name = "netmon-merge", about = "Merge event files in timestamp order")]
struct Cli {
    /// Two or more input files, merged in timestamp order.
    #[arg(required = true, num_args = 2..)]
    inputs: Vec<PathBuf>,

    /// Output file; must not already exist.
    #[arg(short, long)]
    output: PathBuf,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match netmon_events::merger::merge(&cli.inputs, &cli.output) {
        Ok(header) => {
            log::info!(
                "merged {} file(s) into {} (first_ts={} last_ts={})",
                cli.inputs.len(),
                cli.output.display(),
                header.first_ts,
                header.last_ts,
            );
        }
        Err(e) => {
            eprintln!("netmon-merge: {e}");
            std::process::exit(1);
        }
    }
}
