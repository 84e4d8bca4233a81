//! GitHub REST API client.
//! Handles authentication, rate limit tracking, and status code classification.

use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use reqwest::{
  header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
  Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tracing::debug;
use url::Url;

use super::api_types::{ApiPullRequest, ApiSearchResponse};
use super::error::UpstreamError;
use super::types::{PullRequest, PullRequestFilter, RateLimit, Repository, StateFilter, UserProfile};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub API client wrapper
#[derive(Clone)]
pub struct GitHubClient {
  client: Client,
  base_url: Url,
  rate_limit: Arc<Mutex<RateLimit>>,
}

impl GitHubClient {
  pub fn new(api_url: &str, token: &str) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid access token: {}", e))?,
    );
    headers.insert(
      ACCEPT,
      HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
      "X-GitHub-Api-Version",
      HeaderValue::from_static(GITHUB_API_VERSION),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static("ghcache"));

    let client = Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create GitHub client: {}", e))?;

    // Trailing slash so that joined paths stay below the base
    let base = format!("{}/", api_url.trim_end_matches('/'));
    let base_url = Url::parse(&base).map_err(|e| eyre!("Invalid API url {}: {}", api_url, e))?;

    Ok(Self {
      client,
      base_url,
      rate_limit: Arc::new(Mutex::new(RateLimit::default())),
    })
  }

  /// Rate limit as of the last response.
  pub fn rate_limit(&self) -> RateLimit {
    self
      .rate_limit
      .lock()
      .map(|r| *r)
      .unwrap_or_default()
  }

  /// Get the authenticated user
  pub async fn get_user(&self) -> Result<UserProfile> {
    self
      .get_json("user", &[])
      .await
      .wrap_err("Failed to get user profile")
  }

  /// Get repositories accessible to the authenticated user, most recently updated first
  pub async fn list_repos(&self, page: u32, per_page: u32) -> Result<Vec<Repository>> {
    let query = [
      ("sort", "updated".to_string()),
      ("direction", "desc".to_string()),
      ("page", page.to_string()),
      ("per_page", per_page.to_string()),
    ];
    self
      .get_json("user/repos", &query)
      .await
      .wrap_err("Failed to list repositories")
  }

  /// List pull requests for one repository, or those authored by the user
  pub async fn list_pull_requests(&self, filter: &PullRequestFilter) -> Result<Vec<PullRequest>> {
    match &filter.repo {
      Some(repo) => {
        let path = format!("repos/{}/{}/pulls", repo.owner, repo.name);
        let query = [
          ("state", filter.state.as_str().to_string()),
          ("sort", "updated".to_string()),
          ("direction", "desc".to_string()),
          ("per_page", "50".to_string()),
        ];
        let prs: Vec<ApiPullRequest> = self
          .get_json(&path, &query)
          .await
          .wrap_err_with(|| format!("Failed to list pull requests for {}", repo))?;
        Ok(prs.into_iter().map(PullRequest::from).collect())
      }
      None => {
        let query = [
          ("q", search_query(filter.state)),
          ("sort", "updated".to_string()),
          ("per_page", "50".to_string()),
        ];
        let response: ApiSearchResponse = self
          .get_json("search/issues", &query)
          .await
          .wrap_err("Failed to search pull requests")?;
        Ok(response.items.into_iter().map(PullRequest::from).collect())
      }
    }
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> std::result::Result<T, UpstreamError> {
    let url = self
      .base_url
      .join(path)
      .map_err(|e| UpstreamError::NotFound(format!("{}: {}", path, e)))?;

    debug!(%url, "GET");
    let response = self.client.get(url).query(query).send().await?;

    self.update_rate_limit(&response);
    let response = self.check_response(response).await?;

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  /// Update rate limit from response headers.
  fn update_rate_limit(&self, response: &Response) {
    let header = |name: &str| -> Option<u64> {
      response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
    };

    if let Ok(mut rate_limit) = self.rate_limit.lock() {
      if let Some(limit) = header("x-ratelimit-limit") {
        rate_limit.limit = limit;
      }
      if let Some(remaining) = header("x-ratelimit-remaining") {
        rate_limit.remaining = remaining;
      }
      if let Some(reset) = header("x-ratelimit-reset") {
        rate_limit.reset = reset;
      }
    }
  }

  /// Check response status and convert errors.
  async fn check_response(&self, response: Response) -> std::result::Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let rate_limit = self.rate_limit();
    match status {
      StatusCode::UNAUTHORIZED => Err(UpstreamError::Unauthorized),
      StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(response.url().to_string())),
      StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_limit.remaining == 0 => {
        let reset_at = chrono::DateTime::from_timestamp(rate_limit.reset as i64, 0)
          .map(|dt| dt.format("%H:%M:%S").to_string())
          .unwrap_or_else(|| "unknown".to_string());
        Err(UpstreamError::RateLimited { reset_at })
      }
      status => Err(UpstreamError::Status {
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
      }),
    }
  }
}

/// Search qualifiers for pull requests authored by the token owner.
fn search_query(state: StateFilter) -> String {
  match state {
    StateFilter::All => "is:pr author:@me".to_string(),
    state => format!("is:pr author:@me state:{}", state.as_str()),
  }
}
