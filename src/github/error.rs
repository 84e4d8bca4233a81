//! Classification of GitHub API failures.

use color_eyre::Report;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
  #[error("GitHub API request failed: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Authentication failed: invalid or expired token")]
  Unauthorized,

  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("Rate limit exceeded, resets at {reset_at}")]
  RateLimited { reset_at: String },

  #[error("HTTP {status}: {body}")]
  Status { status: u16, body: String },

  #[error("Failed to parse response: {0}")]
  Decode(#[from] serde_json::Error),
}

impl UpstreamError {
  /// Whether retrying the same request may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      UpstreamError::Network(e) => !e.is_decode() && !e.is_builder(),
      UpstreamError::RateLimited { .. } => true,
      UpstreamError::Status { status, .. } => *status >= 500 || *status == 429,
      UpstreamError::Unauthorized | UpstreamError::NotFound(_) | UpstreamError::Decode(_) => false,
    }
  }
}

/// Retry predicate: upstream errors decide for themselves, anything else is retried.
pub fn is_retryable(report: &Report) -> bool {
  report
    .chain()
    .find_map(|cause| cause.downcast_ref::<UpstreamError>())
    .map_or(true, UpstreamError::is_transient)
}
