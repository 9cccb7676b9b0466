//! Remote calendar endpoints
//!
//! The wire contract: a submission POSTs the raw commitment bytes to
//! `/digest` and receives raw timestamp bytes rooted at it; a completion
//! is fetched from `/timestamp/<hex>`. A 404 distinguishes "never seen"
//! from "seen but not yet confirmed" by its body text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use ots_types::ser::Reader;
use ots_types::Timestamp;

use crate::{ClientError, Result};

pub const OTS_MEDIA_TYPE: &str = "application/vnd.opentimestamps.v1";

/// Default bound on a single submit or fetch call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

const PENDING_BODY: &str = "Pending confirmation in Bitcoin blockchain";

#[async_trait]
pub trait Calendar: Send + Sync {
    fn url(&self) -> &str;

    /// Submit a commitment. The returned timestamp is rooted at it and
    /// ends in a pending leaf naming this calendar.
    async fn submit(&self, commitment: &[u8]) -> Result<Timestamp>;

    /// Fetch the completed timestamp for a previously submitted
    /// commitment.
    async fn get_timestamp(&self, commitment: &[u8]) -> Result<Timestamp>;
}

/// A calendar reached over HTTPS.
pub struct HttpCalendar {
    url: String,
    http: reqwest::Client,
}

impl HttpCalendar {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::Transport {
                url: url.to_string(),
                msg: err.to_string(),
            })?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn transport(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout {
                url: self.url.clone(),
            }
        } else {
            ClientError::Transport {
                url: self.url.clone(),
                msg: err.to_string(),
            }
        }
    }

    fn decode(&self, bytes: &[u8], commitment: &[u8]) -> Result<Timestamp> {
        let mut r = Reader::new(bytes);
        let stamp = Timestamp::deserialize(&mut r, commitment.to_vec())?;
        r.expect_eof()?;
        Ok(stamp)
    }
}

#[async_trait]
impl Calendar for HttpCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, commitment: &[u8]) -> Result<Timestamp> {
        let endpoint = format!("{}/digest", self.url);
        debug!(endpoint = %endpoint, commitment = %hex::encode(commitment), "submitting");
        let response = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, OTS_MEDIA_TYPE)
            .header(ACCEPT, OTS_MEDIA_TYPE)
            .body(commitment.to_vec())
            .send()
            .await
            .map_err(|err| self.transport(err))?;

        if !response.status().is_success() {
            return Err(ClientError::Transport {
                url: self.url.clone(),
                msg: format!("submission returned HTTP {}", response.status()),
            });
        }
        let bytes = response.bytes().await.map_err(|err| self.transport(err))?;
        self.decode(&bytes, commitment)
    }

    async fn get_timestamp(&self, commitment: &[u8]) -> Result<Timestamp> {
        let endpoint = format!("{}/timestamp/{}", self.url, hex::encode(commitment));
        debug!(endpoint = %endpoint, "fetching");
        let response = self
            .http
            .get(&endpoint)
            .header(ACCEPT, OTS_MEDIA_TYPE)
            .send()
            .await
            .map_err(|err| self.transport(err))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                let body = response.text().await.unwrap_or_default();
                if body.trim() == PENDING_BODY {
                    Err(ClientError::Pending {
                        url: self.url.clone(),
                    })
                } else {
                    Err(ClientError::NotFound {
                        url: self.url.clone(),
                    })
                }
            }
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(|err| self.transport(err))?;
                self.decode(&bytes, commitment)
            }
            status => Err(ClientError::Transport {
                url: self.url.clone(),
                msg: format!("fetch returned HTTP {status}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_stripped() {
        let calendar = HttpCalendar::new("https://cal.example/").unwrap();
        assert_eq!(calendar.url(), "https://cal.example");
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let calendar = HttpCalendar::new("https://cal.example").unwrap();
        let mut stamp = Timestamp::new(vec![7; 32]).unwrap();
        stamp.add_attestation(ots_types::Attestation::Pending {
            uri: "https://cal.example".into(),
        });
        let mut bytes = stamp.to_bytes().unwrap();
        assert!(calendar.decode(&bytes, &[7; 32]).is_ok());

        bytes.push(0xff);
        assert!(calendar.decode(&bytes, &[7; 32]).is_err());
    }
}
