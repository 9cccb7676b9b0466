//! Resolving walked proofs to block times
//!
//! The walk itself is pure; only the header lookups suspend. Each
//! block-header attestation is checked independently so one bad leaf
//! doesn't stop a good one from verifying.

use tracing::{info, warn};

use ots_core::{attestation_time, chain_of, walk, Chain, VerifyError};
use ots_types::{Attestation, Timestamp};

use crate::oracle::BlockHeaderOracle;
use crate::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct VerifiedBlock {
    pub chain: Chain,
    pub height: u64,
    /// Block timestamp, seconds since the epoch.
    pub time: u32,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// At least one block-header attestation matched. `earliest` is the
    /// minimum block time across the matches.
    Verified {
        blocks: Vec<VerifiedBlock>,
        earliest: u32,
    },
    /// Nothing verifiable yet; these calendars still owe a commitment.
    Pending { calendars: Vec<String> },
}

/// Walk the proof and check each block-header attestation against the
/// oracle.
pub async fn verify_timestamp(
    stamp: &Timestamp,
    oracle: &dyn BlockHeaderOracle,
) -> Result<Outcome> {
    let leaves = walk(stamp)?;

    let mut blocks: Vec<VerifiedBlock> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut failure: Option<ClientError> = None;

    for (commitment, attestation) in &leaves {
        if let Some((chain, height)) = chain_of(attestation) {
            match oracle.block_header(chain, height).await {
                Ok(header) => match attestation_time(chain, height, commitment, &header) {
                    Ok(time) => {
                        info!(%chain, height, time, "attestation verified");
                        blocks.push(VerifiedBlock {
                            chain,
                            height,
                            time,
                        });
                    }
                    Err(err) => {
                        warn!(%chain, height, error = %err, "attestation check failed");
                        // a mismatch is more telling than a lookup failure
                        if failure.is_none()
                            || matches!(err, VerifyError::AttestationMismatch { .. })
                        {
                            failure = Some(err.into());
                        }
                    }
                },
                Err(err) => {
                    warn!(%chain, height, error = %err, "header lookup failed");
                    failure.get_or_insert(err);
                }
            }
        } else {
            match attestation {
                Attestation::Pending { uri } => pending.push(uri.clone()),
                Attestation::Unknown { tag, .. } => {
                    info!(tag = %hex::encode(tag), "ignoring unrecognised attestation");
                }
                _ => {}
            }
        }
    }

    if !blocks.is_empty() {
        let earliest = blocks.iter().map(|block| block.time).min().unwrap_or(0);
        return Ok(Outcome::Verified { blocks, earliest });
    }
    if let Some(err) = failure {
        return Err(err);
    }
    if !pending.is_empty() {
        pending.sort();
        pending.dedup();
        return Ok(Outcome::Pending {
            calendars: pending,
        });
    }
    Err(VerifyError::NoVerifiableAttestation.into())
}
