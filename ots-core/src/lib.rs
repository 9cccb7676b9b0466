//! Timestamp aggregation and verification
//!
//! This crate provides:
//! - Pairwise merkle aggregation of many file timestamps into one commitment
//! - Random nonce edges that keep file digests private from calendars
//! - Proof walking and block-header attestation checking

pub mod merkle;
pub mod nonce;
pub mod verify;

pub use merkle::{cat_sha256, make_merkle_tree};
pub use nonce::{nonce_commitment, NonceGenerator, NONCE_LENGTH};
pub use verify::{attestation_time, chain_of, walk, BlockHeader, Chain, VerifyError};
