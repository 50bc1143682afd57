//! `netmon-sort`: sorts an event file's `tcp_end` records by duration or
//! byte count and writes the result to a fresh file (spec.md §4.4 "Sorting
//! tool"). Every matching record is read into memory before the first byte
//! of output is written, so a failure while reading or sorting never leaves
//! a partial output file; a failure while writing unlinks the output it had
//! started.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use netmon_events::base::TcpEndEvent;
use netmon_events::{Event, EventReader, EventWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortKey {
    Duration,
    TransferredClient,
    TransferredServer,
    Transferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Order {
    Ascending,
    Descending,
}

/// CLI surface for `netmon-sort` (spec.md §6).
#[derive(Debug, Parser)]
#[command(name = "netmon-sort", about = "Sort an event file's tcp_end records")]
struct Cli {
    input: PathBuf,
    output: PathBuf,

    #[arg(long, value_enum, default_value = "duration")]
    key: SortKey,

    #[arg(long, value_enum, default_value = "ascending")]
    order: Order,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("netmon-sort: {e}");
        std::process::exit(1);
    }
}

fn sort_key(key: SortKey) -> fn(&TcpEndEvent) -> u64 {
    match key {
        SortKey::Duration => |e| e.base.timestamp.saturating_sub(e.creation),
        SortKey::TransferredClient => |e| e.transferred_client,
        SortKey::TransferredServer => |e| e.transferred_server,
        SortKey::Transferred => |e| e.transferred_client + e.transferred_server,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let reader = EventReader::open(&cli.input)?;

    let mut ends: Vec<TcpEndEvent> = Vec::new();
    for record in reader.iter() {
        let (event, _len) = record?;
        if let Event::TcpEnd(end) = event {
            ends.push(end);
        }
    }

    let key_fn = sort_key(cli.key);
    ends.sort_by_key(key_fn);
    if cli.order == Order::Descending {
        ends.reverse();
    }

    let mut writer = EventWriter::open(&cli.output, netmon_events::writer::DEFAULT_BUFFER_SIZE, netmon_events::writer::DEFAULT_ALLOC_SIZE)?;
    for end in &ends {
        if let Err(e) = writer.write(&Event::TcpEnd(*end)) {
            let _ = std::fs::remove_file(&cli.output);
            return Err(e.into());
        }
    }
    writer.close()?;

    log::info!("sorted {} tcp_end record(s) into {}", ends.len(), cli.output.display());
    Ok(())
}
