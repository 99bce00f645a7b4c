use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::PaymentGatewayConfig;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Timestamps above this are milliseconds since the epoch.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("no webhook signing key configured")]
    NotConfigured,

    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("malformed webhook timestamp")]
    MalformedTimestamp,

    #[error("webhook timestamp outside tolerance")]
    Stale,

    #[error("webhook signature mismatch")]
    Mismatch,
}

/// Verifies `base64(HMAC-SHA256(key, timestamp || raw_body))`.
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Option<Vec<u8>>,
    tolerance: Duration,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.key.is_some())
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(key: Option<&str>, tolerance: Duration) -> Self {
        Self {
            key: key
                .filter(|k| !k.is_empty())
                .map(|k| k.as_bytes().to_vec()),
            tolerance,
        }
    }

    pub fn from_config(config: &PaymentGatewayConfig) -> Self {
        Self::new(config.webhook_signing_key(), config.webhook_tolerance())
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let key = self.key.as_deref().ok_or(SignatureError::NotConfigured)?;
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignatureError::NotConfigured)?;
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Ok(mac)
    }

    /// Signature the gateway would send for this delivery.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac(timestamp, body)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(headers, body, Utc::now())
    }

    pub fn verify_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        if self.key.is_none() {
            return Err(SignatureError::NotConfigured);
        }

        let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
        let signature = header_str(headers, SIGNATURE_HEADER)?;

        let sent_at = parse_timestamp(timestamp)?;
        let skew = (now.timestamp() - sent_at).unsigned_abs();
        if skew > self.tolerance.as_secs() {
            return Err(SignatureError::Stale);
        }

        let provided = STANDARD
            .decode(signature.trim())
            .map_err(|_| SignatureError::Mismatch)?;
        self.mac(timestamp, body)?
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(SignatureError::MissingHeader(name))
}

fn parse_timestamp(value: &str) -> Result<i64, SignatureError> {
    let raw: i64 = value
        .trim()
        .parse()
        .map_err(|_| SignatureError::MalformedTimestamp)?;
    Ok(if raw > MILLIS_THRESHOLD { raw / 1000 } else { raw })
}
