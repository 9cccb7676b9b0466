//! OpenTimestamps client library
//!
//! Stamps digests against remote calendars, upgrades pending proofs once
//! the calendars have committed to a blockchain, and verifies completed
//! proofs against a block-header oracle.

pub mod cache;
pub mod calendar;
pub mod config;
pub mod git;
pub mod oracle;
pub mod stamper;
pub mod testutil;
pub mod upgrader;
pub mod verifier;

pub use cache::TimestampCache;
pub use calendar::{Calendar, HttpCalendar};
pub use config::ClientConfig;
pub use oracle::{BitcoinRpcOracle, BlockHeaderOracle};
pub use stamper::{StampPolicy, Stamper};
pub use upgrader::{UpgradeOptions, Upgrader};
pub use verifier::{verify_timestamp, Outcome};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Calendar {url}: {msg}")]
    Transport { url: String, msg: String },

    #[error("Calendar {url}: commitment not found")]
    NotFound { url: String },

    #[error("Calendar {url}: commitment pending confirmation")]
    Pending { url: String },

    #[error("Calendar {url}: timed out")]
    Timeout { url: String },

    #[error("Only {received} of {required} calendars responded")]
    InsufficientCalendars { received: usize, required: usize },

    #[error("Block header oracle: {0}")]
    Oracle(String),

    #[error("Malformed armored timestamp: {0}")]
    Armor(String),

    #[error("Configuration: {0}")]
    Config(String),

    #[error("Storage: {0}")]
    Storage(String),

    #[error(transparent)]
    Codec(#[from] ots_types::Error),

    #[error(transparent)]
    Verify(#[from] ots_core::VerifyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
