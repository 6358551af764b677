//! HMAC request authentication
//!
//! Requests carry a Unix timestamp `t` and a signature as their final query
//! parameter:
//!
//! ```text
//! /api/domains?domain=example.com&t=1700000000&hmac=<signature>
//! ```
//!
//! The signature is HMAC-SHA1 over everything before `&hmac=`, encoded as
//! base64 with `+` and `/` replaced by `-` and `_`, then percent-encoded.
//! Requests older than the configured age, or too far in the future, are
//! refused even when correctly signed.

use std::sync::Arc;
use std::time::Duration;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;
use tracing::{debug, info};

use certwarden_common::{Clock, SystemClock};
use certwarden_config::ApiConfig;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_PARAM: &str = "&hmac=";

/// URL-safe alphabet, padded on encode, padding optional on decode
const SIGNATURE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("request is not signed")]
    MissingSignature,

    #[error("request has no timestamp")]
    MissingTimestamp,

    #[error("request timestamp '{0}' is not a number")]
    InvalidTimestamp(String),

    /// Outside the accepted window
    #[error("request timestamp is {skew_secs}s from now")]
    Stale { skew_secs: i64 },

    #[error("signature mismatch")]
    BadSignature,

    #[error("signing key is unusable")]
    InvalidKey,
}

/// Verifies signed request paths.
#[derive(Clone)]
pub struct HmacVerifier {
    key: Vec<u8>,
    max_age: Duration,
    max_future: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HmacVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacVerifier")
            .field("max_age", &self.max_age)
            .field("max_future", &self.max_future)
            .finish_non_exhaustive()
    }
}

impl HmacVerifier {
    pub fn new(key: impl Into<Vec<u8>>, max_age: Duration, max_future: Duration) -> Self {
        Self {
            key: key.into(),
            max_age,
            max_future,
            clock: Arc::new(SystemClock),
        }
    }

    /// Verifier for the configured key; `None` when no key is set.
    pub fn from_config(config: &ApiConfig) -> Option<Self> {
        let key = config.hmac_key.as_deref()?;
        Some(Self::new(
            key,
            Duration::from_secs(config.max_age_secs),
            Duration::from_secs(config.max_future_secs),
        ))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Signature for an unsigned path and query.
    pub fn sign(&self, unsigned: &str) -> Result<String, AuthError> {
        let mut mac = self.mac()?;
        mac.update(unsigned.as_bytes());
        Ok(SIGNATURE_ENGINE.encode(mac.finalize().into_bytes()))
    }

    /// Append `&hmac=<signature>` to an unsigned path and query.
    pub fn signed_path(&self, unsigned: &str) -> Result<String, AuthError> {
        let signature = self.sign(unsigned)?;
        Ok(format!(
            "{}{}{}",
            unsigned,
            SIGNATURE_PARAM,
            urlencoding::encode(&signature)
        ))
    }

    /// Check the signature and timestamp of a request path and query.
    pub fn verify(&self, path_and_query: &str) -> Result<(), AuthError> {
        let result = self.check(path_and_query);
        if let Err(ref e) = result {
            info!(error = %e, "Request failed HMAC authentication");
        }
        result
    }

    fn check(&self, path_and_query: &str) -> Result<(), AuthError> {
        let (unsigned, signature) = path_and_query
            .split_once(SIGNATURE_PARAM)
            .ok_or(AuthError::MissingSignature)?;
        let signature = signature.split('&').next().unwrap_or(signature);
        let signature =
            urlencoding::decode(signature).map_err(|_| AuthError::BadSignature)?;
        let signature = SIGNATURE_ENGINE
            .decode(signature.as_bytes())
            .map_err(|_| AuthError::BadSignature)?;

        let mut mac = self.mac()?;
        mac.update(unsigned.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let t = query_param(unsigned, "t").ok_or(AuthError::MissingTimestamp)?;
        let t: i64 = t
            .parse()
            .map_err(|_| AuthError::InvalidTimestamp(t.to_string()))?;
        self.check_timestamp(t)?;

        debug!("Request passed HMAC authentication");
        Ok(())
    }

    fn check_timestamp(&self, t: i64) -> Result<(), AuthError> {
        let now = (self.clock.now_ms() / 1000) as i64;
        let age = now.saturating_sub(t);

        let max_age = self.max_age.as_secs() as i64;
        let max_future = self.max_future.as_secs() as i64;
        if age > max_age || age < -max_future {
            return Err(AuthError::Stale { skew_secs: age });
        }
        Ok(())
    }

    fn mac(&self) -> Result<HmacSha1, AuthError> {
        <HmacSha1 as Mac>::new_from_slice(&self.key).map_err(|_| AuthError::InvalidKey)
    }
}

/// First value of query parameter `name`.
fn query_param<'a>(path_and_query: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = path_and_query.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
