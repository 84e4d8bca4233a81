//! Raw GitHub REST response shapes and their conversion into list types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{PullRequest, PullRequestState};

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiRepoName {
  pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiBranch {
  pub repo: ApiRepoName,
}

/// Item of `GET /repos/{owner}/{repo}/pulls`
#[derive(Debug, Deserialize)]
pub struct ApiPullRequest {
  pub id: u64,
  pub number: u64,
  pub title: String,
  pub state: String,
  #[serde(default)]
  pub draft: bool,
  pub merged_at: Option<DateTime<Utc>>,
  pub user: ApiUser,
  pub html_url: String,
  pub updated_at: DateTime<Utc>,
  pub base: ApiBranch,
}

impl From<ApiPullRequest> for PullRequest {
  fn from(pr: ApiPullRequest) -> Self {
    PullRequest {
      id: pr.id,
      number: pr.number,
      title: pr.title,
      state: pr_state(&pr.state, pr.merged_at.is_some()),
      draft: pr.draft,
      author: pr.user.login,
      repository: pr.base.repo.full_name,
      html_url: pr.html_url,
      updated_at: pr.updated_at,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiPullRequestMarker {
  pub merged_at: Option<DateTime<Utc>>,
}

/// Item of `GET /search/issues`
#[derive(Debug, Deserialize)]
pub struct ApiSearchItem {
  pub id: u64,
  pub number: u64,
  pub title: String,
  pub state: String,
  #[serde(default)]
  pub draft: bool,
  pub user: ApiUser,
  pub html_url: String,
  pub updated_at: DateTime<Utc>,
  /// e.g. `https://api.github.com/repos/octocat/hello-world`
  pub repository_url: String,
  #[serde(default)]
  pub pull_request: ApiPullRequestMarker,
}

impl From<ApiSearchItem> for PullRequest {
  fn from(item: ApiSearchItem) -> Self {
    let repository = repo_from_api_url(&item.repository_url);
    PullRequest {
      id: item.id,
      number: item.number,
      title: item.title,
      state: pr_state(&item.state, item.pull_request.merged_at.is_some()),
      draft: item.draft,
      author: item.user.login,
      repository,
      html_url: item.html_url,
      updated_at: item.updated_at,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  pub items: Vec<ApiSearchItem>,
}

fn pr_state(state: &str, merged: bool) -> PullRequestState {
  match (state, merged) {
    (_, true) => PullRequestState::Merged,
    ("open", false) => PullRequestState::Open,
    _ => PullRequestState::Closed,
  }
}

/// Turn `.../repos/{owner}/{name}` into `owner/name`.
fn repo_from_api_url(url: &str) -> String {
  let mut parts = url.trim_end_matches('/').rsplit('/');
  match (parts.next(), parts.next()) {
    (Some(name), Some(owner)) => format!("{}/{}", owner, name),
    _ => url.to_string(),
  }
}
