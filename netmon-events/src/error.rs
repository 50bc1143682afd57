use thiserror::Error;

/// Errors produced while encoding or decoding a single event record.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("truncated record: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("record length {len} out of bounds [{min}, {max}]")]
    LengthOutOfBounds { len: u16, min: u16, max: u16 },

    #[error("unknown event type tag {0}")]
    UnknownType(u8),

    #[error("invalid address length {0}, expected 4 or 16")]
    InvalidAddrLen(u8),

    #[error("source and destination addresses have different families")]
    MixedAddressFamily,

    #[error("DNS domain name is {0} bytes, longer than the 255 byte limit")]
    DomainTooLong(usize),

    #[error("DNS response count {0} exceeds the maximum of 24")]
    TooManyResponses(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced by the event-file header, writer, reader or merger.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("bad magic: expected {expected:#018x}, found {found:#018x}")]
    BadMagic { expected: u64, found: u64 },

    #[error("file is only {0} bytes, too short to hold a header")]
    TooShortForHeader(usize),

    #[error("output file already exists")]
    OutputExists,

    #[error("need at least 2 input files to merge, got {0}")]
    NotEnoughInputs(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors produced while parsing or evaluating a filter expression.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("expression nesting exceeds the maximum depth of {0}")]
    TooDeep(usize),

    #[error("mixing && and || at the same parenthesis depth requires explicit parentheses")]
    MixedLogicalOperators,

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("'{op}' is not a valid comparison for identifier '{ident}'")]
    InvalidComparison { ident: String, op: String },

    #[error("invalid value for identifier '{ident}': {reason}")]
    InvalidValue { ident: String, reason: String },
}
