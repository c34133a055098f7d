use thiserror::Error;

use crate::constants::{RuleKind, constants};

/// Failures surfaced by the providers and the storage layer.
///
/// `Display` is the text shown to the user, so provider messages pass through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("{0}")]
  Network(String),
  #[error("Unexpected response: {0}")]
  MalformedResponse(String),
  #[error("{0}")]
  Provider(String),
  #[error("Your monthly API quota has been used up.")]
  QuotaExceeded,
  #[error("This video is too long to be processed.")]
  ContentTooLong,
  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() { Error::MalformedResponse(e.to_string()) } else { Error::Network(e.to_string()) }
  }
}

impl Error {
  /// Map a raw provider message through the rule table.
  ///
  /// Unmatched messages come back as [`Error::Provider`] unchanged.
  pub fn from_provider(message: &str) -> Self {
    let rule = constants().error_rules.iter().find(|r| message.contains(r.needle.as_str()));
    match rule.map(|r| r.kind) {
      Some(RuleKind::QuotaExceeded) => Error::QuotaExceeded,
      Some(RuleKind::ContentTooLong) => Error::ContentTooLong,
      None => Error::Provider(message.to_string()),
    }
  }

  /// Re-run normalization on an error whose text came from a provider.
  pub fn normalized(self) -> Self {
    match self {
      Error::Provider(msg) | Error::Network(msg) => Error::from_provider(&msg),
      other => other,
    }
  }
}
