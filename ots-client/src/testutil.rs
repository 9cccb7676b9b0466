//! In-process stubs for exercising the client without a network

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use ots_core::{BlockHeader, Chain};
use ots_types::{Attestation, Op, Timestamp};

use crate::calendar::Calendar;
use crate::oracle::BlockHeaderOracle;
use crate::{ClientError, Result};

type Responder = Box<dyn Fn(&[u8]) -> Result<Timestamp> + Send + Sync>;

/// A calendar whose responses are programmed per test.
pub struct StubCalendar {
    url: String,
    delay: Option<Duration>,
    on_submit: Responder,
    on_get: Responder,
}

impl StubCalendar {
    /// A healthy aggregator: submissions return `append aa · sha256 ·
    /// pending(url)`, fetches report the commitment as not found.
    pub fn new(url: &str) -> Self {
        let submit_url = url.to_string();
        let get_url = url.to_string();
        Self {
            url: url.to_string(),
            delay: None,
            on_submit: Box::new(move |commitment| {
                pending_fragment(commitment, &submit_url)
            }),
            on_get: Box::new(move |_| {
                Err(ClientError::NotFound {
                    url: get_url.clone(),
                })
            }),
        }
    }

    /// A calendar whose every call fails with a transport error.
    pub fn failing(url: &str) -> Self {
        let submit_url = url.to_string();
        let get_url = url.to_string();
        Self {
            url: url.to_string(),
            delay: None,
            on_submit: Box::new(move |_| {
                Err(ClientError::Transport {
                    url: submit_url.clone(),
                    msg: "connection refused".into(),
                })
            }),
            on_get: Box::new(move |_| {
                Err(ClientError::Transport {
                    url: get_url.clone(),
                    msg: "connection refused".into(),
                })
            }),
        }
    }

    pub fn on_submit(
        mut self,
        responder: impl Fn(&[u8]) -> Result<Timestamp> + Send + Sync + 'static,
    ) -> Self {
        self.on_submit = Box::new(responder);
        self
    }

    pub fn on_get(
        mut self,
        responder: impl Fn(&[u8]) -> Result<Timestamp> + Send + Sync + 'static,
    ) -> Self {
        self.on_get = Box::new(responder);
        self
    }

    /// Sleep before answering, to exercise deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Calendar for StubCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, commitment: &[u8]) -> Result<Timestamp> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.on_submit)(commitment)
    }

    async fn get_timestamp(&self, commitment: &[u8]) -> Result<Timestamp> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.on_get)(commitment)
    }
}

/// `append aa · sha256 · pending(uri)`, the shape a real aggregator
/// returns right after submission.
pub fn pending_fragment(commitment: &[u8], uri: &str) -> Result<Timestamp> {
    let mut fragment = Timestamp::new(commitment.to_vec())?;
    fragment
        .add_op(Op::Append(vec![0xaa]))?
        .add_op(Op::Sha256)?
        .add_attestation(Attestation::Pending {
            uri: uri.to_string(),
        });
    Ok(fragment)
}

/// `prepend <prefix> · sha256 · bitcoin(height)`, the shape of a completed
/// proof fragment. The walked leaf digest is `sha256(prefix ‖ commitment)`.
pub fn bitcoin_fragment(commitment: &[u8], prefix: &[u8], height: u64) -> Result<Timestamp> {
    let mut fragment = Timestamp::new(commitment.to_vec())?;
    fragment
        .add_op(Op::Prepend(prefix.to_vec()))?
        .add_op(Op::Sha256)?
        .add_attestation(Attestation::Bitcoin { height });
    Ok(fragment)
}

/// The merkle root a [`bitcoin_fragment`] commits to.
pub fn bitcoin_fragment_root(commitment: &[u8], prefix: &[u8]) -> Result<[u8; 32]> {
    let digest = Op::Sha256.apply(&[prefix, commitment].concat())?;
    let mut root = [0u8; 32];
    root.copy_from_slice(&digest);
    Ok(root)
}

/// An oracle answering from a fixed header table.
#[derive(Default)]
pub struct StaticOracle {
    headers: HashMap<(Chain, u64), BlockHeader>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, chain: Chain, height: u64, header: BlockHeader) -> Self {
        self.headers.insert((chain, height), header);
        self
    }
}

#[async_trait]
impl BlockHeaderOracle for StaticOracle {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader> {
        self.headers
            .get(&(chain, height))
            .cloned()
            .ok_or_else(|| ClientError::Oracle(format!("no header for {chain} block {height}")))
    }
}
