use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Report};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: u64,
  pub login: String,
  pub name: Option<String>,
  pub avatar_url: Option<String>,
  pub html_url: String,
  #[serde(default)]
  pub public_repos: u32,
}

/// Repository summary for list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
  pub id: u64,
  pub full_name: String,
  pub private: bool,
  pub description: Option<String>,
  pub html_url: String,
  #[serde(default)]
  pub open_issues_count: u32,
  pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
  Open,
  Closed,
  Merged,
}

impl fmt::Display for PullRequestState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      PullRequestState::Open => "open",
      PullRequestState::Closed => "closed",
      PullRequestState::Merged => "merged",
    };
    f.write_str(s)
  }
}

/// Pull request summary for list views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
  pub id: u64,
  pub number: u64,
  pub title: String,
  pub state: PullRequestState,
  pub draft: bool,
  pub author: String,
  /// "owner/name" of the repository the pull request belongs to
  pub repository: String,
  pub html_url: String,
  pub updated_at: DateTime<Utc>,
}

/// "owner/name" reference to a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
  pub owner: String,
  pub name: String,
}

impl FromStr for RepoRef {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().split_once('/') {
      Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
        Ok(Self {
          owner: owner.to_string(),
          name: name.to_string(),
        })
      }
      _ => Err(eyre!("Invalid repository '{}', expected owner/name", s)),
    }
  }
}

impl fmt::Display for RepoRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.owner, self.name)
  }
}

/// Which pull requests to list by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StateFilter {
  #[default]
  Open,
  Closed,
  All,
}

impl StateFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      StateFilter::Open => "open",
      StateFilter::Closed => "closed",
      StateFilter::All => "all",
    }
  }
}

/// Selects one pull request list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestFilter {
  /// Restrict to one repository; `None` lists pull requests authored by the user
  pub repo: Option<RepoRef>,
  pub state: StateFilter,
}

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimit {
  pub limit: u64,
  pub remaining: u64,
  /// Reset time as a Unix timestamp
  pub reset: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_repo_refs() {
    let repo: RepoRef = "rust-lang/rust".parse().unwrap();
    assert_eq!(repo.owner, "rust-lang");
    assert_eq!(repo.name, "rust");
    assert_eq!(repo.to_string(), "rust-lang/rust");

    assert!("rust".parse::<RepoRef>().is_err());
    assert!("/rust".parse::<RepoRef>().is_err());
    assert!("a/b/c".parse::<RepoRef>().is_err());
  }

  #[test]
  fn pull_request_state_serializes_lowercase() {
    let json = serde_json::to_string(&PullRequestState::Merged).unwrap();
    assert_eq!(json, "\"merged\"");
  }
}
