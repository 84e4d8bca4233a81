//! Cache keys for GitHub API calls.

use crate::cache::{build_key, CacheKey, Dataset, IdentityFingerprint, KeyParams};

use super::types::PullRequestFilter;

/// Query key types for GitHub API calls.
#[derive(Clone, Debug)]
pub enum GitHubQuery {
  /// The authenticated user
  Profile,
  /// One page of the user's repositories
  Repos { page: u32, per_page: u32 },
  /// Pull requests matching a filter
  PullRequests(PullRequestFilter),
}

impl GitHubQuery {
  pub fn dataset(&self) -> Dataset {
    match self {
      Self::Profile => Dataset::Profile,
      Self::Repos { .. } => Dataset::Repos,
      Self::PullRequests(_) => Dataset::PullRequests,
    }
  }

  fn params(&self) -> KeyParams {
    match self {
      Self::Profile => KeyParams::new(),
      Self::Repos { page, per_page } => KeyParams::new()
        .with("page", page)
        .with("per_page", per_page),
      Self::PullRequests(filter) => KeyParams::new()
        .with_opt("repo", filter.repo.as_ref().map(|r| normalize_repo(&r.to_string())))
        .with("state", filter.state.as_str()),
    }
  }

  pub fn cache_key(&self, identity: &IdentityFingerprint) -> CacheKey {
    build_key(self.dataset(), &self.params(), identity)
  }

  pub fn description(&self) -> String {
    match self {
      Self::Profile => "profile".to_string(),
      Self::Repos { page, .. } => format!("repositories (page {})", page),
      Self::PullRequests(filter) => match &filter.repo {
        Some(repo) => format!("{} pull requests in {}", filter.state.as_str(), repo),
        None => format!("{} pull requests authored by you", filter.state.as_str()),
      },
    }
  }
}

/// GitHub names are case-insensitive, so `Octo/Repo` and `octo/repo` share a key.
fn normalize_repo(repo: &str) -> String {
  repo.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::github::types::StateFilter;

  fn prs(repo: Option<&str>, state: StateFilter) -> GitHubQuery {
    GitHubQuery::PullRequests(PullRequestFilter {
      repo: repo.map(|r| r.parse().unwrap()),
      state,
    })
  }

  #[test]
  fn repo_case_does_not_split_cache() {
    let fp = IdentityFingerprint::new("abc");
    assert_eq!(
      prs(Some("Octo/Repo"), StateFilter::Open).cache_key(&fp),
      prs(Some("octo/repo"), StateFilter::Open).cache_key(&fp)
    );
  }

  #[test]
  fn filters_get_distinct_keys() {
    let fp = IdentityFingerprint::new("abc");
    let keys = [
      prs(None, StateFilter::Open).cache_key(&fp),
      prs(None, StateFilter::Closed).cache_key(&fp),
      prs(Some("o/r"), StateFilter::Open).cache_key(&fp),
      GitHubQuery::Repos {
        page: 1,
        per_page: 30,
      }
      .cache_key(&fp),
      GitHubQuery::Repos {
        page: 2,
        per_page: 30,
      }
      .cache_key(&fp),
      GitHubQuery::Profile.cache_key(&fp),
    ];

    for (i, a) in keys.iter().enumerate() {
      for b in &keys[i + 1..] {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn descriptions() {
    assert_eq!(
      prs(Some("o/r"), StateFilter::All).description(),
      "all pull requests in o/r"
    );
    assert_eq!(GitHubQuery::Profile.description(), "profile");
  }
}
