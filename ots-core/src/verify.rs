//! Proof walking and block-header attestation checking
//!
//! The walker replays every operation edge from the root message, so a
//! proof whose stored intermediate messages disagree with its operations is
//! caught before any attestation is trusted. Nothing here touches the
//! network; header bytes come from the caller.

use std::fmt;

use thiserror::Error;

use ots_types::{Attestation, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Bitcoin,
    Litecoin,
    Ethereum,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Chain::Bitcoin => "Bitcoin",
            Chain::Litecoin => "Litecoin",
            Chain::Ethereum => "Ethereum",
        })
    }
}

/// The header fields a block-header attestation is checked against.
///
/// The merkle root is kept in on-wire byte order, reversed from the hex a
/// node's RPC interface reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub merkle_root: [u8; 32],
    /// Block timestamp, seconds since the epoch.
    pub time: u32,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Commitment at attestation is {0} bytes; expected 32")]
    BadCommitmentLength(usize),

    #[error("Commitment does not match the merkle root of {chain} block {height}")]
    AttestationMismatch { chain: Chain, height: u64 },

    #[error("An edge's stored message disagrees with its operation result")]
    CorruptProof,

    #[error("No attestation could be resolved to a confirmed block")]
    NoVerifiableAttestation,
}

/// The chain and height a block-header attestation refers to.
pub fn chain_of(attestation: &Attestation) -> Option<(Chain, u64)> {
    match attestation {
        Attestation::Bitcoin { height } => Some((Chain::Bitcoin, *height)),
        Attestation::Litecoin { height } => Some((Chain::Litecoin, *height)),
        Attestation::Ethereum { height } => Some((Chain::Ethereum, *height)),
        _ => None,
    }
}

/// Replay the proof from its root message, checking every edge, and return
/// each attestation with the message at its node.
pub fn walk(stamp: &Timestamp) -> Result<Vec<(Vec<u8>, Attestation)>, VerifyError> {
    let mut leaves = Vec::new();
    walk_node(stamp, stamp.msg(), &mut leaves)?;
    Ok(leaves)
}

fn walk_node(
    node: &Timestamp,
    msg: &[u8],
    leaves: &mut Vec<(Vec<u8>, Attestation)>,
) -> Result<(), VerifyError> {
    for attestation in &node.attestations {
        leaves.push((msg.to_vec(), attestation.clone()));
    }
    for (op, child) in &node.ops {
        let derived = op.apply(msg).map_err(|_| VerifyError::CorruptProof)?;
        if derived != child.msg() {
            return Err(VerifyError::CorruptProof);
        }
        walk_node(child, &derived, leaves)?;
    }
    Ok(())
}

/// Check a walked commitment against a block header, returning the block
/// time on success.
pub fn attestation_time(
    chain: Chain,
    height: u64,
    commitment: &[u8],
    header: &BlockHeader,
) -> Result<u32, VerifyError> {
    if commitment.len() != 32 {
        return Err(VerifyError::BadCommitmentLength(commitment.len()));
    }
    if commitment != header.merkle_root {
        return Err(VerifyError::AttestationMismatch { chain, height });
    }
    Ok(header.time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_types::Op;

    fn header(root: [u8; 32], time: u32) -> BlockHeader {
        BlockHeader {
            merkle_root: root,
            time,
        }
    }

    #[test]
    fn walk_collects_leaves_with_derived_messages() {
        let mut stamp = Timestamp::new(b"msg".to_vec()).unwrap();
        stamp.add_attestation(Attestation::Pending {
            uri: "https://cal.example".into(),
        });
        let child = stamp.add_op(Op::Sha256).unwrap();
        let child_msg = child.msg().to_vec();
        child.add_attestation(Attestation::Bitcoin { height: 42 });

        let leaves = walk(&stamp).unwrap();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0, b"msg");
        assert_eq!(leaves[1].0, child_msg);
        assert_eq!(leaves[1].1, Attestation::Bitcoin { height: 42 });
    }

    #[test]
    fn walk_detects_tampered_interior_message() {
        let mut stamp = Timestamp::new(b"msg".to_vec()).unwrap();
        let child = stamp.add_op(Op::Sha256).unwrap();
        child.add_attestation(Attestation::Bitcoin { height: 42 });

        // graft the subtree under a different root message
        let subtree = stamp.ops[&Op::Sha256].clone();
        let mut tampered = Timestamp::new(b"other".to_vec()).unwrap();
        tampered.ops.insert(Op::Sha256, subtree);

        assert!(matches!(walk(&tampered), Err(VerifyError::CorruptProof)));
    }

    #[test]
    fn attestation_time_matches_merkle_root() {
        let commitment = [7u8; 32];
        let h = header(commitment, 1_432_825_200);
        assert_eq!(
            attestation_time(Chain::Bitcoin, 358391, &commitment, &h).unwrap(),
            1_432_825_200
        );
    }

    #[test]
    fn attestation_time_rejects_mismatch() {
        let h = header([7u8; 32], 1_432_825_200);
        let err = attestation_time(Chain::Bitcoin, 358391, &[8u8; 32], &h).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::AttestationMismatch {
                chain: Chain::Bitcoin,
                height: 358391
            }
        ));
    }

    #[test]
    fn attestation_time_rejects_short_commitment() {
        let h = header([7u8; 32], 0);
        assert!(matches!(
            attestation_time(Chain::Bitcoin, 1, &[7u8; 20], &h),
            Err(VerifyError::BadCommitmentLength(20))
        ));
    }
}
