//! Armored timestamps embedded in signed git objects
//!
//! A git commit timestamp travels inside the GPG signature block as a
//! base64 body between PGP-style delimiters. The timestamp's root message
//! is derived from the commit text and the signature bytes preceding the
//! armor, so the proof covers both.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest as _, Sha256};

use ots_types::Timestamp;

use crate::{ClientError, Result};

pub const ARMOR_HEADER: &str = "-----BEGIN OPENTIMESTAMPS GIT TIMESTAMP-----\n\n";
pub const ARMOR_FOOTER: &str = "-----END OPENTIMESTAMPS GIT TIMESTAMP-----\n";

const ARMOR_MAJOR_VERSION: u8 = 1;
const ARMOR_LINE_WIDTH: usize = 64;

/// `SHA256(SHA256(commit) ‖ SHA256(sig))`, the message an armored
/// timestamp is rooted at.
pub fn hash_signed_commit(commit: &[u8], sig: &[u8]) -> Vec<u8> {
    let mut joined = Sha256::digest(commit).to_vec();
    joined.extend_from_slice(&Sha256::digest(sig));
    Sha256::digest(&joined).to_vec()
}

/// Render a timestamp as an armored block ready to append to a GPG
/// signature.
pub fn write_armored(stamp: &Timestamp, minor_version: u8) -> Result<String> {
    let mut body = vec![ARMOR_MAJOR_VERSION, minor_version];
    body.extend_from_slice(&stamp.to_bytes()?);
    let encoded = BASE64.encode(&body);

    let mut out = String::from(ARMOR_HEADER);
    for chunk in encoded.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        // base64 output is pure ASCII
        out.push_str(std::str::from_utf8(chunk).map_err(|err| {
            ClientError::Armor(err.to_string())
        })?);
        out.push('\n');
    }
    out.push_str(ARMOR_FOOTER);
    Ok(out)
}

/// Find and decode the armored timestamp inside a signature block.
/// Returns `None` when the signature carries no armor at all.
pub fn extract_armored(commit: &[u8], sig: &[u8]) -> Result<Option<(u8, Timestamp)>> {
    let Some(start) = find_subsequence(sig, ARMOR_HEADER.as_bytes()) else {
        return Ok(None);
    };
    let mut end_marker = b"\n".to_vec();
    end_marker.extend_from_slice(ARMOR_FOOTER.as_bytes());
    let Some(end) = find_subsequence(sig, &end_marker) else {
        return Ok(None);
    };
    if end < start {
        return Err(ClientError::Armor("footer precedes header".into()));
    }

    let encoded: Vec<u8> = sig[start + ARMOR_HEADER.len()..end]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let body = BASE64
        .decode(&encoded)
        .map_err(|err| ClientError::Armor(err.to_string()))?;
    if body.len() < 2 {
        return Err(ClientError::Armor("armored body too short".into()));
    }
    let (major, minor) = (body[0], body[1]);
    if major != ARMOR_MAJOR_VERSION {
        return Err(ClientError::Armor(format!(
            "unsupported armored timestamp version {major}"
        )));
    }

    // the root message covers the commit and the signature up to the armor
    let initial_msg = hash_signed_commit(commit, &sig[..start]);
    let stamp = Timestamp::from_bytes(&body[2..], initial_msg)?;
    Ok(Some((minor, stamp)))
}

/// Split a raw signed commit object into the unsigned commit text and the
/// GPG signature, if one is present.
pub fn split_signed_commit(raw: &[u8]) -> (Vec<u8>, Option<Vec<u8>>) {
    let mut unsigned: Vec<&[u8]> = Vec::new();
    let mut sig_lines: Vec<&[u8]> = Vec::new();
    let mut found_sig = false;
    let mut sig_done = false;

    for line in raw.split(|&b| b == b'\n') {
        if found_sig && sig_done {
            unsigned.push(line);
        } else if found_sig {
            if !line.is_empty() {
                // continuation lines are indented by one space
                sig_lines.push(&line[1..]);
            } else {
                unsigned.push(line);
                sig_done = true;
            }
        } else if let Some(rest) = line.strip_prefix(b"gpgsig ".as_slice()) {
            found_sig = true;
            sig_lines.push(rest);
        } else {
            unsigned.push(line);
        }
    }

    let unsigned = unsigned.join(&b"\n"[..]);
    let sig = found_sig.then(|| {
        let mut sig = sig_lines.join(&b"\n"[..]);
        sig.push(b'\n');
        sig
    });
    (unsigned, sig)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
