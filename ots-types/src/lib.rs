//! Proof types and binary codec for OpenTimestamps timestamps
//!
//! This crate defines the timestamp proof tree, the operations and
//! attestations it is built from, and the detached `.ots` file format.

pub mod attestation;
pub mod error;
pub mod op;
pub mod ser;
pub mod timestamp;

pub use attestation::Attestation;
pub use error::{Error, Result};
pub use op::Op;
pub use timestamp::{DetachedTimestampFile, Profile, Timestamp};
