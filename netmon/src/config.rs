//! Monitor configuration (spec.md §6, §9 design notes; supplemented from
//! `original_source/net/mon/configuration.cpp`, by far the largest single
//! file in the source tree). A YAML file plus CLI overrides, CLI taking
//! precedence, validated eagerly into the *Configuration* error taxonomy of
//! spec.md §7.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::ConfigError;

const MIN_HASH_TABLE_SIZE: u64 = 16;
const MAX_HASH_TABLE_SIZE: u64 = 1 << 20;
const MIN_RING_BLOCK: u32 = 4096;
const MAX_RING_BLOCK: u32 = 16 * 1024 * 1024;
const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMethod {
    Pcap,
    RingBuffer,
    Socket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorList {
    All,
    Even,
    Odd,
    Explicit(Vec<usize>),
}

impl ProcessorList {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "all" => Ok(ProcessorList::All),
            "even" => Ok(ProcessorList::Even),
            "odd" => Ok(ProcessorList::Odd),
            other => other
                .split(',')
                .map(|part| {
                    part.trim().parse::<usize>().map_err(|_| ConfigError::UnknownEnum {
                        field: "processors".to_string(),
                        value: other.to_string(),
                    })
                })
                .collect::<Result<Vec<usize>, ConfigError>>()
                .map(ProcessorList::Explicit),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RingBufferConfig {
    pub block_size: u32,
    pub frame_size: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FamilyConfig {
    pub hash_table_size: u64,
    pub max_connections: usize,
    pub connection_timeout_us: u64,
    pub time_wait_us: u64,
}

/// CLI surface for the `netmon` binary (spec.md §6 "Monitor"). An optional
/// `--config` YAML file supplies the same fields; any flag given on the
/// command line overrides the file's value for that field.
#[derive(Debug, Parser)]
#[command(name = "netmon", about = "Passive TCP/IP and DNS traffic monitor")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub capture_method: Option<CaptureMethod>,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long)]
    pub receive_buffer_size: Option<u32>,

    #[arg(long)]
    pub promiscuous: Option<bool>,

    #[arg(long)]
    pub ring_block_size: Option<u32>,

    #[arg(long)]
    pub ring_frame_size: Option<u32>,

    #[arg(long)]
    pub ring_count: Option<u32>,

    #[arg(long)]
    pub ipv4_hash_table_size: Option<u64>,

    #[arg(long)]
    pub ipv4_max_connections: Option<usize>,

    #[arg(long)]
    pub ipv6_hash_table_size: Option<u64>,

    #[arg(long)]
    pub ipv6_max_connections: Option<usize>,

    #[arg(long)]
    pub connection_timeout_secs: Option<u64>,

    #[arg(long)]
    pub time_wait_secs: Option<u64>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub processors: Option<String>,

    #[arg(long)]
    pub events_dir: Option<PathBuf>,

    #[arg(long)]
    pub file_alloc_size: Option<u64>,

    #[arg(long)]
    pub writer_buffer_size: Option<usize>,

    /// Replays a capture file instead of opening `device` live (spec.md §6
    /// "File replay"). Forces a single worker regardless of `--workers`.
    #[arg(long)]
    pub replay_file: Option<PathBuf>,
}

/// The YAML shape read by `--config`. Every field optional so CLI flags can
/// fill in what the file leaves out and vice versa.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileConfig {
    capture_method: Option<CaptureMethod>,
    device: Option<String>,
    receive_buffer_size: Option<u32>,
    promiscuous: Option<bool>,
    ring_block_size: Option<u32>,
    ring_frame_size: Option<u32>,
    ring_count: Option<u32>,
    ipv4_hash_table_size: Option<u64>,
    ipv4_max_connections: Option<usize>,
    ipv6_hash_table_size: Option<u64>,
    ipv6_max_connections: Option<usize>,
    connection_timeout_secs: Option<u64>,
    time_wait_secs: Option<u64>,
    workers: Option<usize>,
    processors: Option<String>,
    events_dir: Option<PathBuf>,
    file_alloc_size: Option<u64>,
    writer_buffer_size: Option<usize>,
    replay_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub capture_method: CaptureMethod,
    pub device: String,
    pub receive_buffer_size: u32,
    pub promiscuous: bool,
    pub ring_buffer: RingBufferConfig,
    pub ipv4: FamilyConfig,
    pub ipv6: FamilyConfig,
    pub workers: usize,
    pub processors: ProcessorList,
    pub events_dir: PathBuf,
    pub file_alloc_size: u64,
    pub writer_buffer_size: usize,
    pub replay_file: Option<PathBuf>,
}

macro_rules! resolve {
    ($cli:expr, $file:expr, $field:ident, $default:expr) => {
        $cli.$field.or($file.$field).unwrap_or($default)
    };
    ($cli:expr, $file:expr, $field:ident) => {
        $cli.$field.clone().or($file.$field.clone())
    };
}

impl Configuration {
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                serde_yaml::from_str(&text)?
            }
            None => FileConfig::default(),
        };

        let device = resolve!(cli, file, device).ok_or_else(|| ConfigError::MissingField("device".to_string()))?;
        let events_dir =
            resolve!(cli, file, events_dir).ok_or_else(|| ConfigError::MissingField("events_dir".to_string()))?;

        let processors_str = resolve!(cli, file, processors).unwrap_or_else(|| "all".to_string());
        let replay_file = resolve!(cli, file, replay_file);
        let mut workers = resolve!(cli, file, workers, 1);
        if replay_file.is_some() && workers > 1 {
            log::warn!("replay-file given with workers={workers}; replaying a single file through more than one worker would just duplicate every event, so clamping to 1");
            workers = 1;
        }

        let config = Configuration {
            capture_method: resolve!(cli, file, capture_method, CaptureMethod::Pcap),
            device,
            receive_buffer_size: resolve!(cli, file, receive_buffer_size, 2 * 1024 * 1024),
            promiscuous: resolve!(cli, file, promiscuous, false),
            ring_buffer: RingBufferConfig {
                block_size: resolve!(cli, file, ring_block_size, 1024 * 1024),
                frame_size: resolve!(cli, file, ring_frame_size, 2048),
                count: resolve!(cli, file, ring_count, 64),
            },
            ipv4: FamilyConfig {
                hash_table_size: resolve!(cli, file, ipv4_hash_table_size, 4096),
                max_connections: resolve!(cli, file, ipv4_max_connections, 65536),
                connection_timeout_us: resolve!(cli, file, connection_timeout_secs, 600) * 1_000_000,
                time_wait_us: resolve!(cli, file, time_wait_secs, 60) * 1_000_000,
            },
            ipv6: FamilyConfig {
                hash_table_size: resolve!(cli, file, ipv6_hash_table_size, 4096),
                max_connections: resolve!(cli, file, ipv6_max_connections, 65536),
                connection_timeout_us: resolve!(cli, file, connection_timeout_secs, 600) * 1_000_000,
                time_wait_us: resolve!(cli, file, time_wait_secs, 60) * 1_000_000,
            },
            workers,
            processors: ProcessorList::parse(&processors_str)?,
            events_dir,
            file_alloc_size: resolve!(cli, file, file_alloc_size, 64 * 1024 * 1024),
            writer_buffer_size: resolve!(cli, file, writer_buffer_size, netmon_events::writer::DEFAULT_BUFFER_SIZE),
            replay_file,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_power_of_two("ipv4-hash-table-size", self.ipv4.hash_table_size)?;
        check_power_of_two("ipv6-hash-table-size", self.ipv6.hash_table_size)?;
        check_range(
            "ipv4-hash-table-size",
            self.ipv4.hash_table_size,
            MIN_HASH_TABLE_SIZE,
            MAX_HASH_TABLE_SIZE,
        )?;
        check_range(
            "ipv6-hash-table-size",
            self.ipv6.hash_table_size,
            MIN_HASH_TABLE_SIZE,
            MAX_HASH_TABLE_SIZE,
        )?;

        if self.ring_buffer.frame_size > self.ring_buffer.block_size {
            return Err(ConfigError::FrameExceedsBlock {
                frame_size: self.ring_buffer.frame_size,
                block_size: self.ring_buffer.block_size,
            });
        }
        check_range(
            "ring-block-size",
            self.ring_buffer.block_size as u64,
            MIN_RING_BLOCK as u64,
            MAX_RING_BLOCK as u64,
        )?;

        if !self.events_dir.is_dir() {
            return Err(ConfigError::DirectoryMissing(self.events_dir.display().to_string()));
        }

        check_filename_len(&self.device)?;

        Ok(())
    }

    /// Filename for this worker's own output file (spec.md §5 "each worker
    /// writes to its own filename").
    pub fn worker_filename(&self, worker_id: usize) -> PathBuf {
        self.events_dir.join(format!("events-{}.{}.bin", self.device, worker_id))
    }
}

fn check_power_of_two(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value & (value - 1) != 0 {
        return Err(ConfigError::NotPowerOfTwo {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value: value as i64,
            min: min as i64,
            max: max as i64,
        });
    }
    Ok(())
}

fn check_filename_len(name: &str) -> Result<(), ConfigError> {
    if name.len() > MAX_FILENAME_LEN {
        return Err(ConfigError::FilenameTooLong(name.to_string(), name.len(), MAX_FILENAME_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn base_cli(events_dir: PathBuf) -> Cli {
        Cli {
            config: None,
            capture_method: None,
            device: Some("eth0".to_string()),
            receive_buffer_size: None,
            promiscuous: None,
            ring_block_size: None,
            ring_frame_size: None,
            ring_count: None,
            ipv4_hash_table_size: None,
            ipv4_max_connections: None,
            ipv6_hash_table_size: None,
            ipv6_max_connections: None,
            connection_timeout_secs: None,
            time_wait_secs: None,
            workers: None,
            processors: None,
            events_dir: Some(events_dir),
            file_alloc_size: None,
            writer_buffer_size: None,
            replay_file: None,
        }
    }

    #[test]
    fn defaults_validate_successfully() {
        let dir = tempdir().unwrap();
        let cfg = Configuration::load(base_cli(dir.path().to_path_buf())).unwrap();
        assert_eq!(cfg.ipv4.hash_table_size, 4096);
        assert_eq!(cfg.workers, 1);
    }

    #[test]
    fn non_power_of_two_hash_size_is_rejected() {
        let dir = tempdir().unwrap();
        let mut cli = base_cli(dir.path().to_path_buf());
        cli.ipv4_hash_table_size = Some(100);
        assert!(matches!(
            Configuration::load(cli),
            Err(ConfigError::NotPowerOfTwo { .. })
        ));
    }

    #[test]
    fn frame_size_exceeding_block_size_is_rejected() {
        let dir = tempdir().unwrap();
        let mut cli = base_cli(dir.path().to_path_buf());
        cli.ring_block_size = Some(4096);
        cli.ring_frame_size = Some(8192);
        assert!(matches!(
            Configuration::load(cli),
            Err(ConfigError::FrameExceedsBlock { .. })
        ));
    }

    #[test]
    fn missing_events_directory_is_rejected() {
        let mut cli = base_cli(PathBuf::from("/nonexistent/path/for/netmon/tests"));
        cli.device = Some("eth0".to_string());
        assert!(matches!(
            Configuration::load(cli),
            Err(ConfigError::DirectoryMissing(_))
        ));
    }

    #[test]
    fn processor_list_keywords_parse() {
        assert_eq!(ProcessorList::parse("all").unwrap(), ProcessorList::All);
        assert_eq!(ProcessorList::parse("even").unwrap(), ProcessorList::Even);
        assert_eq!(
            ProcessorList::parse("0,2,4").unwrap(),
            ProcessorList::Explicit(vec![0, 2, 4])
        );
    }

    #[test]
    fn cli_device_overrides_file_value() {
        let dir = tempdir().unwrap();
        let yaml_path = dir.path().join("netmon.yaml");
        fs::write(&yaml_path, "device: eth1\nevents-dir: \"/tmp\"\n").unwrap();

        let mut cli = base_cli(dir.path().to_path_buf());
        cli.config = Some(yaml_path);
        cli.device = Some("eth0".to_string()); // CLI wins over the file's eth1

        let cfg = Configuration::load(cli).unwrap();
        assert_eq!(cfg.device, "eth0");
    }
}
