//! Persistent cache of timestamp fragments
//!
//! One file per commitment, named by its lowercase hex, holding raw
//! timestamp bytes rooted at that commitment. Writes go through a
//! temporary file and a rename. Re-inserting a fragment merges it with
//! whatever is already stored, so inserts are idempotent.

use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;

use tracing::{debug, warn};

use ots_types::Timestamp;

use crate::{ClientError, Result};

/// Commitments longer than this are not cached; they would make unwieldy
/// filenames and never occur in practice.
const MAX_KEY_LENGTH: usize = 64;

const CACHE_VERSION: &str = "1.0";

pub struct TimestampCache {
    path: PathBuf,
}

impl TimestampCache {
    /// Open a cache directory, creating it if needed. Refuses directories
    /// written by an incompatible cache version.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;

        let version_file = path.join("version");
        match fs::read_to_string(&version_file) {
            Ok(contents) => {
                let major = contents.trim().split('.').next().unwrap_or("");
                if major != "1" {
                    return Err(ClientError::Storage(format!(
                        "unknown timestamp cache version {:?}",
                        contents.trim()
                    )));
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::write(&version_file, format!("{CACHE_VERSION}\n"))?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Self { path })
    }

    fn entry_path(&self, commitment: &[u8]) -> PathBuf {
        self.path.join(hex::encode(commitment))
    }

    /// The fragment stored for a commitment, if any. A corrupt entry is
    /// treated as absent rather than fatal.
    pub fn get(&self, commitment: &[u8]) -> Result<Option<Timestamp>> {
        if commitment.is_empty() || commitment.len() > MAX_KEY_LENGTH {
            return Ok(None);
        }
        let bytes = match fs::read(self.entry_path(commitment)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match Timestamp::from_bytes(&bytes, commitment.to_vec()) {
            Ok(stamp) => Ok(Some(stamp)),
            Err(err) => {
                warn!(
                    commitment = %hex::encode(commitment),
                    error = %err,
                    "ignoring corrupt cache entry"
                );
                Ok(None)
            }
        }
    }

    /// Merge a fragment into the cache under its root message.
    pub fn merge(&self, fragment: &Timestamp) -> Result<()> {
        let commitment = fragment.msg();
        if commitment.is_empty() || commitment.len() > MAX_KEY_LENGTH {
            return Ok(());
        }
        if fragment.attestations.is_empty() && fragment.ops.is_empty() {
            return Ok(());
        }

        let mut merged = match self.get(commitment)? {
            Some(existing) => existing,
            None => Timestamp::new(commitment.to_vec())?,
        };
        merged.merge(fragment.clone())?;

        let bytes = merged.to_bytes()?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.path)?;
        tmp.write_all(&bytes)?;
        tmp.persist(self.entry_path(commitment))
            .map_err(|err| ClientError::Io(err.error))?;
        debug!(commitment = %hex::encode(commitment), "cached timestamp fragment");
        Ok(())
    }
}
