//! Cache key construction.
//!
//! A key is `tag:fingerprint:params`. The fingerprint and the params are
//! form-urlencoded, so neither can contain the `:` separator and two different
//! identities can never produce the same key.

use color_eyre::{eyre::eyre, Report};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

/// Hex characters kept from the token digest.
const FINGERPRINT_LEN: usize = 12;

/// Logical data sets served through the cache, each with its own TTL class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
  /// The authenticated user's profile
  Profile,
  /// Repositories visible to the user
  Repos,
  /// Pull requests for one filter
  PullRequests,
}

impl Dataset {
  pub const ALL: [Dataset; 3] = [Dataset::Profile, Dataset::Repos, Dataset::PullRequests];

  pub fn tag(self) -> &'static str {
    match self {
      Dataset::Profile => "profile",
      Dataset::Repos => "repos",
      Dataset::PullRequests => "prs",
    }
  }
}

impl FromStr for Dataset {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let tag = s.trim();
    Dataset::ALL
      .into_iter()
      .find(|d| d.tag().eq_ignore_ascii_case(tag))
      .ok_or_else(|| eyre!("Unknown dataset '{}', expected profile, repos or prs", tag))
  }
}

impl fmt::Display for Dataset {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

/// Short, non-reversible identifier of the active credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityFingerprint(String);

impl IdentityFingerprint {
  /// Use a fingerprint supplied by the auth collaborator as-is.
  pub fn new(raw: impl Into<String>) -> Self {
    Self(raw.into())
  }

  /// Derive a fingerprint from an access token.
  pub fn from_token(token: &str) -> Self {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    Self::new(hex)
  }

  /// Fingerprint used when no credential is present.
  pub fn anonymous() -> Self {
    Self::new("anon")
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for IdentityFingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Discriminating request parameters, kept sorted for determinism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParams(BTreeMap<String, String>);

impl KeyParams {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.0.insert(name.into(), value.to_string());
    self
  }

  /// Add a parameter only when it is present.
  pub fn with_opt(self, name: impl Into<String>, value: Option<impl ToString>) -> Self {
    match value {
      Some(v) => self.with(name, v),
      None => self,
    }
  }

  fn encode(&self) -> String {
    form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.0.iter())
      .finish()
  }
}

/// A fully built storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn encode_component(raw: &str) -> String {
  form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Prefix shared by every key of one dataset and identity.
pub fn dataset_prefix(dataset: Dataset, identity: &IdentityFingerprint) -> String {
  format!("{}:{}:", dataset.tag(), encode_component(identity.as_str()))
}

/// Whether `key` was built for `identity`, whatever the dataset.
pub fn belongs_to(key: &str, identity: &IdentityFingerprint) -> bool {
  let mut parts = key.splitn(3, ':');
  let _tag = parts.next();
  parts.next() == Some(encode_component(identity.as_str()).as_str())
}

/// Build the storage key for a logical request.
pub fn build_key(dataset: Dataset, params: &KeyParams, identity: &IdentityFingerprint) -> CacheKey {
  CacheKey(format!("{}{}", dataset_prefix(dataset, identity), params.encode()))
}
