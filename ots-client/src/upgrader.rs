//! Completing pending timestamps from calendars and the local cache
//!
//! The cache is consulted for every sub-timestamp before any network
//! traffic. Remote fetches only chase pending attestations, only against
//! whitelisted (or explicitly overridden) calendars, and run concurrently;
//! merge order doesn't matter because merging is commutative. Upgrading a
//! complete timestamp is a no-op.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ots_types::{Attestation, Timestamp};

use crate::cache::TimestampCache;
use crate::calendar::{Calendar, HttpCalendar};
use crate::config::default_whitelist;
use crate::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    /// When non-empty, these calendars are queried instead of the URI in
    /// each pending attestation.
    pub calendar_urls: Vec<String>,
    /// Calendars a pending attestation may be chased to. `None` disables
    /// remote fetches entirely.
    pub whitelist: Option<Vec<String>>,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            calendar_urls: Vec::new(),
            whitelist: Some(default_whitelist()),
        }
    }
}

pub type CalendarFactory = Box<dyn Fn(&str) -> Result<Arc<dyn Calendar>> + Send + Sync>;

pub struct Upgrader<'a> {
    options: UpgradeOptions,
    cache: Option<&'a TimestampCache>,
    factory: CalendarFactory,
}

impl<'a> Upgrader<'a> {
    pub fn new(options: UpgradeOptions, cache: Option<&'a TimestampCache>) -> Self {
        Self {
            options,
            cache,
            factory: Box::new(|url| Ok(Arc::new(HttpCalendar::new(url)?) as Arc<dyn Calendar>)),
        }
    }

    /// Replace how calendar URLs become clients. Used by tests to plug in
    /// stubs.
    pub fn with_factory(mut self, factory: CalendarFactory) -> Self {
        self.factory = factory;
        self
    }

    /// One upgrade round: cache first, then remote calendars. Returns
    /// whether the timestamp gained attestations.
    pub async fn upgrade(&self, stamp: &mut Timestamp) -> Result<bool> {
        let before = attestation_set(stamp);

        self.apply_cache(stamp)?;
        let after_cache = attestation_set(stamp);
        let cache_hits = after_cache.difference(&before).count();
        if cache_hits > 0 {
            info!(count = cache_hits, "got attestations from cache");
        }

        if !stamp.is_complete() {
            self.fetch_remote(stamp).await?;
        }

        Ok(attestation_set(stamp) != before)
    }

    fn apply_cache(&self, stamp: &mut Timestamp) -> Result<()> {
        let Some(cache) = self.cache else {
            return Ok(());
        };
        // the cache is local, so every single sub-timestamp is worth a try
        let messages: Vec<Vec<u8>> = stamp.nodes().map(|node| node.msg().to_vec()).collect();
        for msg in messages {
            if let Some(cached) = cache.get(&msg)? {
                debug!(commitment = %hex::encode(&msg), "cache hit");
                stamp.merge_at(&msg, &cached)?;
            }
        }
        Ok(())
    }

    async fn fetch_remote(&self, stamp: &mut Timestamp) -> Result<()> {
        let targets = self.collect_targets(stamp);
        if targets.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for (commitment, url) in targets {
            let calendar = match (self.factory)(&url) {
                Ok(calendar) => calendar,
                Err(err) => {
                    warn!(calendar = %url, error = %err, "can't reach calendar");
                    continue;
                }
            };
            tasks.spawn(async move {
                let result = calendar.get_timestamp(&commitment).await;
                (commitment, url, result)
            });
        }

        // fragments merge in arrival order; the result doesn't depend on it
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((commitment, url, Ok(fragment))) => {
                    info!(calendar = %url, "got timestamp fragment");
                    if let Some(cache) = self.cache {
                        if let Err(err) = cache.merge(&fragment) {
                            warn!(error = %err, "failed to cache fragment");
                        }
                    }
                    stamp.merge_at(&commitment, &fragment)?;
                }
                Ok((_, url, Err(ClientError::Pending { .. }))) => {
                    info!(calendar = %url, "commitment not yet confirmed");
                }
                Ok((_, url, Err(ClientError::NotFound { .. }))) => {
                    info!(calendar = %url, "commitment not found");
                }
                Ok((_, url, Err(err))) => {
                    warn!(calendar = %url, error = %err, "calendar fetch failed");
                }
                Err(err) => {
                    warn!(error = %err, "calendar task failed");
                }
            }
        }
        Ok(())
    }

    fn collect_targets(&self, stamp: &Timestamp) -> BTreeSet<(Vec<u8>, String)> {
        let mut targets = BTreeSet::new();
        for node in stamp.nodes() {
            for attestation in &node.attestations {
                let Attestation::Pending { uri } = attestation else {
                    continue;
                };
                if !self.options.calendar_urls.is_empty() {
                    debug!(%uri, "attestation URI overridden by user calendars");
                    for url in &self.options.calendar_urls {
                        targets.insert((node.msg().to_vec(), url.clone()));
                    }
                    continue;
                }
                match &self.options.whitelist {
                    None => {
                        info!(%uri, "remote calendars disabled; ignoring attestation");
                    }
                    Some(whitelist) if whitelist.iter().any(|entry| entry == uri) => {
                        targets.insert((node.msg().to_vec(), uri.clone()));
                    }
                    Some(_) => {
                        info!(%uri, "calendar not whitelisted; ignoring attestation");
                    }
                }
            }
        }
        targets
    }
}

fn attestation_set(stamp: &Timestamp) -> BTreeSet<Attestation> {
    stamp
        .all_attestations()
        .map(|(_, attestation)| attestation.clone())
        .collect()
}
