//! Application-level error taxonomy (spec.md §7): packet parsing, protocol
//! semantics, connection-table capacity, and configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("frame too short: need at least {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },

    #[error("IPv4 header length {ihl} words is smaller than the minimum of 5")]
    BadIhl { ihl: u8 },

    #[error("IPv4 total length {tot_len} does not match captured length {len}")]
    Ipv4LengthMismatch { tot_len: u16, len: usize },

    #[error("IPv6 payload length {plen} + 40 does not match captured length {len}")]
    Ipv6LengthMismatch { plen: u16, len: usize },

    #[error("IPv6 extension header chain runs past the end of the packet")]
    ExtensionHeaderOverrun,

    #[error("MPLS label stack runs past the end of the packet")]
    MplsOverrun,

    #[error("raw IP capture frame has unrecognised version nibble {0}")]
    UnknownIpVersion(u8),
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("message is {0} bytes, shorter than the 12 byte header")]
    TooShort(usize),

    #[error("message is {0} bytes, longer than the 512 byte limit")]
    TooLong(usize),

    #[error("unsupported opcode {0}")]
    UnsupportedOpcode(u8),

    #[error("truncated (TC) flag set")]
    Truncated,

    #[error("non-zero response code {0}")]
    NonZeroRcode(u8),

    #[error("QDCOUNT is zero")]
    NoQuestion,

    #[error("compression pointer chain exceeds the limit of {0} hops")]
    PointerLoopLimit(u32),

    #[error("compression pointer target {offset} is outside [12, {len})")]
    PointerOutOfRange { offset: usize, len: usize },

    #[error("name runs past the end of the message")]
    NameOverrun,

    #[error("QTYPE {0} exceeds the single-byte event field")]
    QtypeTooLarge(u16),

    #[error("QCLASS {0} is not IN (1)")]
    BadQclass(u16),

    #[error("answer record runs past the end of the message")]
    AnswerOverrun,

    #[error("answer RDLENGTH {rdlength} does not match the {expected} bytes required for its type")]
    BadRdLength { rdlength: u16, expected: u16 },

    #[error("response carried zero usable A/AAAA records")]
    NoUsableAnswers,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("timed out waiting for a packet")]
    Timeout,

    #[error("capture source exhausted (end of file or interface closed)")]
    Eof,

    #[error("unsupported link-layer type {0:?}")]
    UnsupportedLinkType(String),

    #[error(transparent)]
    Pcap(#[from] pcap::Error),

    #[error(transparent)]
    PcapFile(#[from] pcap_file::PcapError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("connection table is at its configured maximum of {0} flows")]
    ConnectionTableFull(usize),

    #[error("event writer buffer allocation failed")]
    WriterOutOfMemory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{field}' must be a power of two, got {value}")]
    NotPowerOfTwo { field: String, value: u64 },

    #[error("'{field}' value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("unknown value '{value}' for '{field}'")]
    UnknownEnum { field: String, value: String },

    #[error("missing mandatory field '{0}'")]
    MissingField(String),

    #[error("events directory '{0}' does not exist")]
    DirectoryMissing(String),

    #[error("filename '{0}' is {1} bytes, longer than the limit of {2}")]
    FilenameTooLong(String, usize, usize),

    #[error("ring buffer frame_size ({frame_size}) must be <= block_size ({block_size})")]
    FrameExceedsBlock { frame_size: u32, block_size: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
