//! Type-safe identifiers for Certwarden.
//!
//! A [`Subject`] is the domain name a certificate job is keyed on. Parsing
//! normalizes it (trimmed, lower-cased, no trailing dot) so that
//! `Example.COM.` and `example.com` address the same job.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a fully-qualified domain name
const MAX_SUBJECT_LEN: usize = 253;

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

/// Reasons a raw string is not a usable certificate subject.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    /// Nothing left after trimming.
    #[error("no domain specified")]
    Empty,

    /// Longer than a DNS name may be.
    #[error("domain '{0}' exceeds {MAX_SUBJECT_LEN} characters")]
    TooLong(String),

    /// A label is empty, too long, or contains characters DNS does not allow.
    #[error("domain '{domain}' has an invalid label '{label}'")]
    InvalidLabel { domain: String, label: String },
}

/// Domain name a certificate is issued for.
///
/// At most one certificate job exists per subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Parse and normalize a domain name.
    pub fn parse(raw: &str) -> Result<Self, SubjectError> {
        let normalized = raw.trim().trim_end_matches('.').to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(SubjectError::Empty);
        }
        if normalized.len() > MAX_SUBJECT_LEN {
            return Err(SubjectError::TooLong(normalized));
        }

        for label in normalized.split('.') {
            let valid = !label.is_empty()
                && label.len() <= MAX_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-');
            if !valid {
                return Err(SubjectError::InvalidLabel {
                    label: label.to_string(),
                    domain: normalized.clone(),
                });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Subject {
    type Error = SubjectError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for Subject {
    type Error = SubjectError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.0
    }
}
