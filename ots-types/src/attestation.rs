//! Attestations, the leaves of a timestamp proof
//!
//! An attestation asserts a fact about the message it is rooted at: either
//! a calendar has promised to commit it, or it equals the merkle root of a
//! block at some height. Unrecognised 8-byte tags are preserved verbatim so
//! proofs from newer clients survive a round-trip.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::ser::{Reader, Writer};

/// Upper bound on the framed payload of a single attestation.
pub const MAX_PAYLOAD_LENGTH: usize = 8192;

/// Upper bound on a calendar URI.
pub const MAX_URI_LENGTH: usize = 1024;

pub const PENDING_TAG: [u8; 8] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];
pub const BITCOIN_TAG: [u8; 8] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];
pub const LITECOIN_TAG: [u8; 8] = [0x06, 0x86, 0x9a, 0x0d, 0x73, 0xd7, 0x1b, 0x45];
pub const ETHEREUM_TAG: [u8; 8] = [0x30, 0xfe, 0x80, 0x87, 0xb5, 0xc7, 0xea, 0xd7];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attestation {
    /// A calendar has seen the commitment and will extend the proof later.
    Pending { uri: String },
    /// The commitment equals the merkle root of the Bitcoin block at `height`.
    Bitcoin { height: u64 },
    Litecoin { height: u64 },
    Ethereum { height: u64 },
    /// Preserved verbatim for forward compatibility; never verifiable.
    Unknown { tag: [u8; 8], payload: Vec<u8> },
}

impl Attestation {
    pub fn tag(&self) -> [u8; 8] {
        match self {
            Attestation::Pending { .. } => PENDING_TAG,
            Attestation::Bitcoin { .. } => BITCOIN_TAG,
            Attestation::Litecoin { .. } => LITECOIN_TAG,
            Attestation::Ethereum { .. } => ETHEREUM_TAG,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    /// Whether this attestation names a block header, making the proof
    /// complete.
    pub fn is_block_header(&self) -> bool {
        matches!(
            self,
            Attestation::Bitcoin { .. }
                | Attestation::Litecoin { .. }
                | Attestation::Ethereum { .. }
        )
    }

    pub fn serialize(&self, w: &mut Writer) {
        w.write_bytes(&self.tag());
        let mut payload = Writer::new();
        match self {
            Attestation::Pending { uri } => payload.write_varbytes(uri.as_bytes()),
            Attestation::Bitcoin { height }
            | Attestation::Litecoin { height }
            | Attestation::Ethereum { height } => payload.write_varuint(*height),
            Attestation::Unknown { payload: bytes, .. } => payload.write_bytes(bytes),
        }
        w.write_varbytes(&payload.into_bytes());
    }

    pub fn deserialize(r: &mut Reader<'_>) -> Result<Attestation> {
        let tag: [u8; 8] = r.read_array()?;
        let payload = r.read_varbytes(MAX_PAYLOAD_LENGTH, "attestation payload")?;
        let mut pr = Reader::new(payload);
        let attestation = match tag {
            PENDING_TAG => {
                let uri = pr.read_varbytes(MAX_URI_LENGTH, "calendar URI")?;
                Attestation::Pending {
                    uri: parse_uri(uri)?,
                }
            }
            BITCOIN_TAG => Attestation::Bitcoin {
                height: pr.read_varuint()?,
            },
            LITECOIN_TAG => Attestation::Litecoin {
                height: pr.read_varuint()?,
            },
            ETHEREUM_TAG => Attestation::Ethereum {
                height: pr.read_varuint()?,
            },
            other => {
                return Ok(Attestation::Unknown {
                    tag: other,
                    payload: payload.to_vec(),
                })
            }
        };
        // the framed length must match what the payload actually used
        pr.expect_eof()?;
        Ok(attestation)
    }
}

fn parse_uri(bytes: &[u8]) -> Result<String> {
    let uri = std::str::from_utf8(bytes).map_err(|_| Error::InvalidUri)?;
    if uri.is_empty() {
        return Err(Error::InvalidUri);
    }
    let ok = uri
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'/' | b':'));
    if !ok {
        return Err(Error::InvalidUri);
    }
    Ok(uri.to_owned())
}

// Attestations sort by tag, then by their payload fields, giving the
// serializer a canonical leaf order.
impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(&other.tag()).then_with(|| match (self, other) {
            (Attestation::Pending { uri: a }, Attestation::Pending { uri: b }) => a.cmp(b),
            (Attestation::Bitcoin { height: a }, Attestation::Bitcoin { height: b })
            | (Attestation::Litecoin { height: a }, Attestation::Litecoin { height: b })
            | (Attestation::Ethereum { height: a }, Attestation::Ethereum { height: b }) => {
                a.cmp(b)
            }
            (
                Attestation::Unknown { payload: a, .. },
                Attestation::Unknown { payload: b, .. },
            ) => a.cmp(b),
            _ => Ordering::Equal,
        })
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "PendingAttestation({uri})"),
            Attestation::Bitcoin { height } => {
                write!(f, "BitcoinBlockHeaderAttestation({height})")
            }
            Attestation::Litecoin { height } => {
                write!(f, "LitecoinBlockHeaderAttestation({height})")
            }
            Attestation::Ethereum { height } => {
                write!(f, "EthereumBlockHeaderAttestation({height})")
            }
            Attestation::Unknown { tag, payload } => {
                write!(
                    f,
                    "UnknownAttestation({}, {} payload bytes)",
                    hex::encode(tag),
                    payload.len()
                )
            }
        }
    }
}
