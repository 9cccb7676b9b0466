//! Commitment operations
//!
//! Each operation is a pure function from one message to another. A proof
//! is a chain of these operations ending in an attestation, so two edges
//! carrying the same operation are the same edge. Hash tags follow the
//! RFC 4880 algorithm numbering where one exists.

use std::cmp::Ordering;
use std::fmt;

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use sha3::Keccak256;

use crate::error::{Error, Result};
use crate::ser::{Reader, Writer};

/// Longest message an operation will accept or produce.
pub const MAX_MSG_LENGTH: usize = 4096;

/// Longest immediate argument of an append/prepend.
pub const MAX_ARG_LENGTH: usize = 4096;

pub const TAG_SHA1: u8 = 0x02;
pub const TAG_RIPEMD160: u8 = 0x03;
pub const TAG_SHA256: u8 = 0x08;
pub const TAG_KECCAK256: u8 = 0x67;
pub const TAG_APPEND: u8 = 0xf0;
pub const TAG_PREPEND: u8 = 0xf1;
pub const TAG_REVERSE: u8 = 0xf2;
pub const TAG_HEXLIFY: u8 = 0xf3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// `msg ‖ arg`
    Append(Vec<u8>),
    /// `arg ‖ msg`
    Prepend(Vec<u8>),
    /// Byte-reversal. Historic; rejected by the strict profile.
    Reverse,
    /// Lowercase ASCII hex expansion. Historic; rejected by the strict profile.
    Hexlify,
    Sha1,
    Ripemd160,
    Sha256,
    Keccak256,
}

impl Op {
    pub fn tag(&self) -> u8 {
        match self {
            Op::Append(_) => TAG_APPEND,
            Op::Prepend(_) => TAG_PREPEND,
            Op::Reverse => TAG_REVERSE,
            Op::Hexlify => TAG_HEXLIFY,
            Op::Sha1 => TAG_SHA1,
            Op::Ripemd160 => TAG_RIPEMD160,
            Op::Sha256 => TAG_SHA256,
            Op::Keccak256 => TAG_KECCAK256,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Append(_) => "append",
            Op::Prepend(_) => "prepend",
            Op::Reverse => "reverse",
            Op::Hexlify => "hexlify",
            Op::Sha1 => "sha1",
            Op::Ripemd160 => "ripemd160",
            Op::Sha256 => "sha256",
            Op::Keccak256 => "keccak256",
        }
    }

    /// The immediate argument, empty for unary operations.
    pub fn arg(&self) -> &[u8] {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => arg,
            _ => &[],
        }
    }

    /// Whether this is a cryptographic hash usable as a file hash op.
    pub fn is_hash(&self) -> bool {
        self.digest_len().is_some()
    }

    /// Output length of hash operations.
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Op::Sha1 | Op::Ripemd160 => Some(20),
            Op::Sha256 | Op::Keccak256 => Some(32),
            _ => None,
        }
    }

    /// Apply the operation to a message.
    pub fn apply(&self, msg: &[u8]) -> Result<Vec<u8>> {
        if msg.len() > MAX_MSG_LENGTH {
            return Err(Error::SizeLimit {
                what: "message",
                actual: msg.len(),
                max: MAX_MSG_LENGTH,
            });
        }
        let result = match self {
            Op::Append(arg) => {
                check_arg(arg)?;
                let mut out = msg.to_vec();
                out.extend_from_slice(arg);
                out
            }
            Op::Prepend(arg) => {
                check_arg(arg)?;
                let mut out = arg.clone();
                out.extend_from_slice(msg);
                out
            }
            Op::Reverse => msg.iter().rev().copied().collect(),
            Op::Hexlify => hex::encode(msg).into_bytes(),
            Op::Sha1 => Sha1::digest(msg).to_vec(),
            Op::Ripemd160 => Ripemd160::digest(msg).to_vec(),
            Op::Sha256 => Sha256::digest(msg).to_vec(),
            Op::Keccak256 => Keccak256::digest(msg).to_vec(),
        };
        if result.len() > MAX_MSG_LENGTH {
            return Err(Error::SizeLimit {
                what: "operation result",
                actual: result.len(),
                max: MAX_MSG_LENGTH,
            });
        }
        Ok(result)
    }

    pub fn serialize(&self, w: &mut Writer) {
        w.write_byte(self.tag());
        match self {
            Op::Append(arg) | Op::Prepend(arg) => w.write_varbytes(arg),
            _ => {}
        }
    }

    pub fn deserialize(r: &mut Reader<'_>) -> Result<Op> {
        let tag = r.read_byte()?;
        Self::deserialize_from_tag(r, tag)
    }

    /// Decode the remainder of an operation whose tag byte was already read.
    pub fn deserialize_from_tag(r: &mut Reader<'_>, tag: u8) -> Result<Op> {
        match tag {
            TAG_APPEND | TAG_PREPEND => {
                let arg = r.read_varbytes(MAX_ARG_LENGTH, "append/prepend argument")?;
                check_arg(arg)?;
                if tag == TAG_APPEND {
                    Ok(Op::Append(arg.to_vec()))
                } else {
                    Ok(Op::Prepend(arg.to_vec()))
                }
            }
            TAG_REVERSE => Ok(Op::Reverse),
            TAG_HEXLIFY => Ok(Op::Hexlify),
            TAG_SHA1 => Ok(Op::Sha1),
            TAG_RIPEMD160 => Ok(Op::Ripemd160),
            TAG_SHA256 => Ok(Op::Sha256),
            TAG_KECCAK256 => Ok(Op::Keccak256),
            other => Err(Error::UnknownOp {
                tag: other,
                // the tag byte sits just before the cursor
                offset: r.position().saturating_sub(1),
            }),
        }
    }
}

fn check_arg(arg: &[u8]) -> Result<()> {
    if arg.is_empty() {
        return Err(Error::EmptyArgument);
    }
    if arg.len() > MAX_ARG_LENGTH {
        return Err(Error::SizeLimit {
            what: "append/prepend argument",
            actual: arg.len(),
            max: MAX_ARG_LENGTH,
        });
    }
    Ok(())
}

// Siblings in a timestamp node are ordered by tag, then by immediate
// argument. This makes serialization canonical.
impl Ord for Op {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag()
            .cmp(&other.tag())
            .then_with(|| self.arg().cmp(other.arg()))
    }
}

impl PartialOrd for Op {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => {
                write!(f, "{} {}", self.name(), hex::encode(arg))
            }
            _ => f.write_str(self.name()),
        }
    }
}
