//! `netmon-read`: prints an event file's header, or its events as
//! human-readable text, JSON or CSV, optionally restricted by a filter
//! expression (spec.md §4.4 "Reader/printer tool", §4.6 filter grammar).
//!
//! A DNS response updates the reader's inverted cache as it is read, so
//! hostname-based output and filtering only ever see resolutions that
//! appeared earlier in the file -- the same causal order the original
//! capture observed them in.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use netmon::dns::InvertedCache;
use netmon_events::display::{self, EventFmt};
use netmon_events::{Address, EventReader, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputKind {
    Header,
    HumanReadable,
    Json,
    Csv,
}

/// CLI surface for `netmon-read` (spec.md §6).
#[derive(Debug, Parser)]
#[command(name = "netmon-read", about = "Print an event file's header or its events")]
struct Cli {
    /// Event file to read.
    input: PathBuf,

    /// Where to write output; defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "human-readable")]
    kind: OutputKind,

    /// Filter expression restricting which events are printed (spec.md §4.6).
    #[arg(long)]
    filter: Option<String>,

    /// Field delimiter for `--kind csv`.
    #[arg(long, default_value_t = ',')]
    csv_delim: char,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("netmon-read: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let reader = EventReader::open(&cli.input)?;

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    if cli.kind == OutputKind::Header {
        let header = reader.header();
        writeln!(out, "first_ts={} last_ts={}", header.first_ts, header.last_ts)?;
        return Ok(());
    }

    let filter = cli.filter.as_deref().map(Filter::parse).transpose()?;
    let mut cache = InvertedCache::new();

    for record in reader.iter() {
        let (event, _len) = record?;

        if let netmon_events::Event::Dns(dns) = &event {
            for addr in &dns.responses {
                cache.observe(*addr, &dns.domain);
            }
        }

        if let Some(filter) = &filter {
            let resolve = |addr: &Address| cache.resolve(addr);
            if !filter.matches(&event, &resolve) {
                continue;
            }
        }

        match cli.kind {
            OutputKind::HumanReadable => writeln!(out, "{}", event.format_text(' '))?,
            OutputKind::Csv => writeln!(out, "{}", event.format_text(cli.csv_delim))?,
            OutputKind::Json => writeln!(out, "{}", display::format_json(&event)?)?,
            OutputKind::Header => unreachable!("handled above"),
        }
    }

    Ok(())
}
