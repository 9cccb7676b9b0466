//! Error types for the proof codec

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unexpected end of input at offset {offset}")]
    Truncated { offset: usize },

    #[error("Varuint at offset {offset} overflows 63 bits")]
    VarintOverflow { offset: usize },

    #[error("Timestamp nesting exceeds {limit} levels")]
    DeepRecursion { limit: usize },

    #[error("{what} is {actual}, exceeding the limit of {max}")]
    SizeLimit {
        what: &'static str,
        actual: usize,
        max: usize,
    },

    #[error("Append/prepend argument must be at least one byte")]
    EmptyArgument,

    #[error("Unknown operation tag {tag:#04x} at offset {offset}")]
    UnknownOp { tag: u8, offset: usize },

    #[error("Unknown attestation tag {}", hex::encode(.magic))]
    UnknownAttestation { magic: [u8; 8] },

    #[error("Operation {0} not accepted by the strict profile")]
    ForbiddenOp(&'static str),

    #[error("Missing detached timestamp header magic")]
    BadHeaderMagic,

    #[error("Unsupported detached timestamp version {0}")]
    UnsupportedVersion(u64),

    #[error("The file hash operation must be a hash, not {0}")]
    BadFileHashOp(&'static str),

    #[error("Root message is {actual} bytes but the file hash op produces {expected}")]
    DigestLengthMismatch { expected: usize, actual: usize },

    #[error("Trailing bytes at offset {offset}")]
    TrailingBytes { offset: usize },

    #[error("Invalid calendar URI")]
    InvalidUri,

    #[error("Timestamps are for different messages")]
    MessageMismatch,

    #[error("An empty timestamp can't be serialized")]
    EmptyTimestamp,
}
