//! Cryptographic nonce edges

use rand::RngCore;

use ots_types::{Op, Result, Timestamp};

/// Length of the random nonce appended before submission.
pub const NONCE_LENGTH: usize = 16;

/// Generator for cryptographically secure random nonces
pub struct NonceGenerator {
    rng: rand::rngs::ThreadRng,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    pub fn generate(&mut self) -> [u8; NONCE_LENGTH] {
        let mut bytes = [0u8; NONCE_LENGTH];
        self.rng.fill_bytes(&mut bytes);
        bytes
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Append a nonce and rehash, returning the node whose message is safe to
/// show to a calendar.
///
/// Files and their timestamps can get separated later, so every file gets
/// its own nonce; without one, a shared proof would leak the digests of
/// files stamped alongside it.
pub fn nonce_commitment<'a>(
    stamp: &'a mut Timestamp,
    nonce: &[u8; NONCE_LENGTH],
) -> Result<&'a mut Timestamp> {
    stamp.add_op(Op::Append(nonce.to_vec()))?.add_op(Op::Sha256)
}
