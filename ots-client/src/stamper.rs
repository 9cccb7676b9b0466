//! Creating new timestamps against remote calendars
//!
//! Every file gets a private nonce edge; the nonce commitments are
//! merkelized and only the shared tip is submitted, one task per calendar.
//! The join completes as soon as enough fragments are in or the deadline
//! passes, and the stragglers are cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use ots_core::{make_merkle_tree, nonce_commitment, NonceGenerator};
use ots_types::{DetachedTimestampFile, Op, Timestamp};

use crate::calendar::Calendar;
use crate::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct StampPolicy {
    /// Fragments required before the join completes (the m in m-of-n).
    pub min_responses: usize,
    /// Overall deadline for the calendar join.
    pub wait_timeout: Duration,
}

impl Default for StampPolicy {
    fn default() -> Self {
        Self {
            min_responses: 2,
            wait_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Stamper {
    calendars: Vec<Arc<dyn Calendar>>,
    policy: StampPolicy,
}

impl Stamper {
    pub fn new(calendars: Vec<Arc<dyn Calendar>>, policy: StampPolicy) -> Self {
        Self { calendars, policy }
    }

    /// Timestamp a batch of file digests, returning one detached timestamp
    /// per digest, in order.
    pub async fn stamp(
        &self,
        file_hash_op: Op,
        digests: Vec<Vec<u8>>,
    ) -> Result<Vec<DetachedTimestampFile>> {
        let mut nonce_gen = NonceGenerator::new();
        let mut files = Vec::with_capacity(digests.len());
        let mut tips = Vec::with_capacity(digests.len());

        for digest in digests {
            let mut detached = DetachedTimestampFile::from_digest(file_hash_op.clone(), digest)?;
            let nonce = nonce_gen.generate();
            let tip_msg = nonce_commitment(&mut detached.timestamp, &nonce)?
                .msg()
                .to_vec();
            tips.push(Timestamp::new(tip_msg)?);
            files.push(detached);
        }

        let commitment = make_merkle_tree(&mut tips)?;
        debug!(commitment = %hex::encode(&commitment), "submitting merkle tip");
        let fragment = self.submit_to_calendars(&commitment).await?;

        for (detached, tip) in files.iter_mut().zip(tips.iter_mut()) {
            tip.merge_at(&commitment, &fragment)?;
            let tip_msg = tip.msg().to_vec();
            detached.timestamp.merge_at(&tip_msg, tip)?;
        }
        Ok(files)
    }

    /// Submit one commitment to every calendar and merge the first
    /// `min_responses` fragments that arrive before the deadline.
    pub async fn submit_to_calendars(&self, commitment: &[u8]) -> Result<Timestamp> {
        let required = self
            .policy
            .min_responses
            .min(self.calendars.len())
            .max(1);

        let mut tasks = JoinSet::new();
        for calendar in &self.calendars {
            let calendar = Arc::clone(calendar);
            let commitment = commitment.to_vec();
            tasks.spawn(async move {
                let url = calendar.url().to_string();
                (url, calendar.submit(&commitment).await)
            });
        }

        let deadline = Instant::now() + self.policy.wait_timeout;
        let mut merged = Timestamp::new(commitment.to_vec())?;
        let mut received = 0usize;

        while received < required {
            match timeout_at(deadline, tasks.join_next()).await {
                Err(_) => {
                    warn!("calendar deadline elapsed");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Ok((url, Ok(fragment))))) => match merged.merge(fragment) {
                    Ok(()) => {
                        received += 1;
                        info!(calendar = %url, "commitment submitted");
                    }
                    Err(err) => {
                        warn!(calendar = %url, error = %err, "rejecting misrooted fragment");
                    }
                },
                Ok(Some(Ok((url, Err(err))))) => {
                    warn!(calendar = %url, error = %err, "submission failed");
                }
                Ok(Some(Err(err))) => {
                    warn!(error = %err, "calendar task failed");
                }
            }
        }
        // cancel outstanding submissions cooperatively
        tasks.abort_all();

        if received < required {
            return Err(ClientError::InsufficientCalendars { received, required });
        }
        Ok(merged)
    }
}
