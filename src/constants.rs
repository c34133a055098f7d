//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// What a matching provider message is rewritten to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RuleKind {
  QuotaExceeded,
  ContentTooLong,
}

/// One entry of the provider message lookup table.
#[derive(Debug, Deserialize)]
pub struct ErrorRule {
  pub needle: String,
  pub kind: RuleKind,
}

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub app_name: String,

  // Conversion jobs
  pub poll_interval_ms: u64,
  pub watch_url_prefix: String,

  // Providers
  pub search_host: String,
  pub download_host: String,
  pub provider_links: Vec<(String, String)>,

  pub error_rules: Vec<ErrorRule>,
  pub submit_fallback_message: String,
  pub failed_fallback_message: String,

  // UI
  pub history_limit: usize,
  pub skeleton_cards: usize,
  pub error_dismiss_secs: u64,
}

impl Constants {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.poll_interval(), Duration::from_secs(4));
    assert_eq!(c.history_limit, 50);
    assert_eq!(c.error_rules.len(), 2);
  }
}
