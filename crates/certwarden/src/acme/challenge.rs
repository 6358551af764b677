//! HTTP-01 challenge responder
//!
//! Serves `/.well-known/acme-challenge/<token>` for any managed host by asking
//! the CA client, through the orchestrator, for the key authorization.

use tracing::{debug, trace, warn};

use crate::orchestrator::CertificateOrchestrator;

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// What to send back for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeReply {
    /// Not a challenge path; route the request elsewhere
    NotChallenge,
    /// Respond 200 with this body
    Found(String),
    /// Respond 404
    NotFound,
}

/// Answers HTTP-01 challenge requests.
#[derive(Debug, Clone)]
pub struct ChallengeResponder {
    orchestrator: CertificateOrchestrator,
}

impl ChallengeResponder {
    pub fn new(orchestrator: CertificateOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Token from a challenge request path, if it is one.
    pub fn extract_token(path: &str) -> Option<&str> {
        let token = path.strip_prefix(ACME_CHALLENGE_PREFIX)?;
        let token = token.split(['?', '#']).next().unwrap_or(token);
        (!token.is_empty() && !token.contains('/')).then_some(token)
    }

    /// Resolve a request for `path` on `host` (which may carry a port).
    pub async fn respond(&self, host: &str, path: &str) -> ChallengeReply {
        let Some(token) = Self::extract_token(path) else {
            return ChallengeReply::NotChallenge;
        };
        let host = strip_port(host);
        debug!(host = %host, token = %token, "Serving ACME challenge");

        match self.orchestrator.get_challenge(host, token).await {
            Ok(Some(response)) => {
                trace!(host = %host, token = %token, "ACME challenge token found");
                ChallengeReply::Found(response.key_authorization)
            }
            Ok(None) => {
                trace!(host = %host, token = %token, "ACME challenge token not found");
                ChallengeReply::NotFound
            }
            Err(e) => {
                warn!(host = %host, token = %token, error = %e, "Failed to retrieve challenge");
                ChallengeReply::NotFound
            }
        }
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal; never a certificate subject
        return host;
    }
    host.rsplit_once(':')
        .filter(|(_, port)| port.parse::<u16>().is_ok())
        .map_or(host, |(name, _)| name)
}
