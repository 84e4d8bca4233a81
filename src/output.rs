//! Plain-text rendering of fetch results.
//!
//! Every line starts with the fetch signal so cached or failed data is never
//! mistaken for a fresh answer.

use crate::cache::{CacheSource, FetchOutcome};
use crate::github::{PullRequest, Repository, UserProfile};

pub fn outcome_lines<T>(
  label: &str,
  outcome: &FetchOutcome<T>,
  render: impl Fn(&T) -> Vec<String>,
) -> Vec<String> {
  let tag = format!("[{}]", outcome.signal());
  let mut lines = Vec::new();

  if let Some(result) = outcome.result() {
    let origin = match (result.source, result.cached_at) {
      (CacheSource::Network, _) => "from network".to_string(),
      (_, Some(at)) => format!("cached at {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
      (_, None) => "cached".to_string(),
    };
    lines.push(format!("{} {} ({})", tag, label, origin));
    lines.extend(render(&result.data).into_iter().map(|l| format!("{}   {}", tag, l)));
  }

  if let Some(err) = outcome.error() {
    lines.push(format!("{} {}: {}", tag, label, err));
  }

  lines
}

pub fn profile(profile: &UserProfile) -> Vec<String> {
  let name = profile.name.as_deref().unwrap_or("-");
  vec![
    format!("{} ({})", profile.login, name),
    format!("{} public repositories", profile.public_repos),
    profile.html_url.clone(),
  ]
}

pub fn repos(repos: &[Repository]) -> Vec<String> {
  if repos.is_empty() {
    return vec!["no repositories".to_string()];
  }
  repos
    .iter()
    .map(|r| {
      let visibility = if r.private { "private" } else { "public" };
      format!(
        "{:<40} {:<8} {:>4} issues  updated {}",
        r.full_name,
        visibility,
        r.open_issues_count,
        r.updated_at.format("%Y-%m-%d")
      )
    })
    .collect()
}

pub fn pull_requests(prs: &[PullRequest]) -> Vec<String> {
  if prs.is_empty() {
    return vec!["no pull requests".to_string()];
  }
  prs
    .iter()
    .map(|pr| {
      let draft = if pr.draft { " (draft)" } else { "" };
      format!(
        "{}#{:<6} {:<7} {}{}",
        pr.repository, pr.number, pr.state, pr.title, draft
      )
    })
    .collect()
}
