//! Built-in data served when no access token is configured.

use chrono::{DateTime, TimeZone, Utc};

use super::types::{
  PullRequest, PullRequestFilter, PullRequestState, Repository, StateFilter, UserProfile,
};

const DEMO_LOGIN: &str = "demo-user";

fn at(day: u32, hour: u32) -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(2024, 6, day, hour, 0, 0)
    .single()
    .unwrap_or_default()
}

pub fn profile() -> UserProfile {
  UserProfile {
    id: 1,
    login: DEMO_LOGIN.to_string(),
    name: Some("Demo User".to_string()),
    avatar_url: None,
    html_url: format!("https://github.com/{}", DEMO_LOGIN),
    public_repos: 2,
  }
}

pub fn repos() -> Vec<Repository> {
  vec![
    Repository {
      id: 101,
      full_name: format!("{}/review-bot", DEMO_LOGIN),
      private: false,
      description: Some("Automated pull request reviews".to_string()),
      html_url: format!("https://github.com/{}/review-bot", DEMO_LOGIN),
      open_issues_count: 4,
      updated_at: at(12, 9),
    },
    Repository {
      id: 102,
      full_name: format!("{}/dotfiles", DEMO_LOGIN),
      private: true,
      description: None,
      html_url: format!("https://github.com/{}/dotfiles", DEMO_LOGIN),
      open_issues_count: 0,
      updated_at: at(3, 17),
    },
  ]
}

fn all_pull_requests() -> Vec<PullRequest> {
  let pr = |number: u64, title: &str, state, draft, day| PullRequest {
    id: 1_000 + number,
    number,
    title: title.to_string(),
    state,
    draft,
    author: DEMO_LOGIN.to_string(),
    repository: format!("{}/review-bot", DEMO_LOGIN),
    html_url: format!("https://github.com/{}/review-bot/pull/{}", DEMO_LOGIN, number),
    updated_at: at(day, 10),
  };

  vec![
    pr(12, "Retry rate-limited review requests", PullRequestState::Open, false, 14),
    pr(11, "Cache repository list", PullRequestState::Open, true, 13),
    pr(9, "Summarize large diffs", PullRequestState::Merged, false, 8),
    pr(7, "Switch to streaming responses", PullRequestState::Closed, false, 2),
  ]
}

pub fn pull_requests(filter: &PullRequestFilter) -> Vec<PullRequest> {
  all_pull_requests()
    .into_iter()
    .filter(|pr| match &filter.repo {
      Some(repo) => pr.repository.eq_ignore_ascii_case(&repo.to_string()),
      None => true,
    })
    .filter(|pr| match filter.state {
      StateFilter::Open => pr.state == PullRequestState::Open,
      StateFilter::Closed => pr.state != PullRequestState::Open,
      StateFilter::All => true,
    })
    .collect()
}
