//! Cached GitHub client that wraps GitHubClient with stale-while-revalidate caching.

use color_eyre::Result;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::FuturesUnordered;
use std::future::Future;
use tracing::{debug, info};

use crate::cache::{CacheLayer, Cacheable, Dataset, FetchOutcome, IdentityFingerprint};
use crate::config::{Config, TtlConfig};

use super::cache::GitHubQuery;
use super::client::GitHubClient;
use super::demo;
use super::error;
use super::types::{PullRequest, PullRequestFilter, RateLimit, Repository, UserProfile};

const REPOS_PER_PAGE: u32 = 50;

/// Where data comes from when the cache cannot answer.
#[derive(Clone)]
enum Source {
  Live(GitHubClient),
  Demo,
}

impl Source {
  async fn get_user(&self) -> Result<UserProfile> {
    match self {
      Self::Live(client) => client.get_user().await,
      Self::Demo => Ok(demo::profile()),
    }
  }

  async fn list_repos(&self, page: u32, per_page: u32) -> Result<Vec<Repository>> {
    match self {
      Self::Live(client) => client.list_repos(page, per_page).await,
      Self::Demo => Ok(demo::repos()),
    }
  }

  async fn list_pull_requests(&self, filter: &PullRequestFilter) -> Result<Vec<PullRequest>> {
    match self {
      Self::Live(client) => client.list_pull_requests(filter).await,
      Self::Demo => Ok(demo::pull_requests(filter)),
    }
  }
}

/// One dataset of the overview screen.
#[derive(Debug)]
pub enum DashboardSection {
  Profile(FetchOutcome<UserProfile>),
  Repos(FetchOutcome<Vec<Repository>>),
}

/// Dashboard datasets, yielded in the order they finish loading.
pub type DashboardSections<'a> = FuturesUnordered<BoxFuture<'a, DashboardSection>>;

/// GitHub client with transparent caching support.
///
/// Provides the same reads as [`GitHubClient`], but answers from the cache
/// when it can and reports how each answer was obtained.
#[derive(Clone)]
pub struct CachedGitHubClient {
  source: Source,
  cache: CacheLayer,
  identity: IdentityFingerprint,
  ttl: TtlConfig,
}

impl CachedGitHubClient {
  /// Build a client from configuration, falling back to demo mode without a token.
  pub fn from_config(config: &Config) -> Result<Self> {
    match Config::get_api_token() {
      Some(token) => Self::new(config, &token),
      None => {
        info!("no access token configured, using demo data");
        Ok(Self::demo())
      }
    }
  }

  /// Create a cached client for the owner of `token`.
  pub fn new(config: &Config, token: &str) -> Result<Self> {
    let inner = GitHubClient::new(&config.api_url, token)?;

    let cache = if config.cache.enabled {
      CacheLayer::in_memory()
        .with_stale_ratio(config.cache.stale_ratio)
        .with_last_known(config.cache.retain_last_known)
    } else {
      CacheLayer::disabled()
    }
    .with_retry_policy(config.retry.policy().with_retry_if(error::is_retryable));

    Ok(Self {
      source: Source::Live(inner),
      cache,
      identity: IdentityFingerprint::from_token(token),
      ttl: config.cache.ttl.clone(),
    })
  }

  /// Serve the built-in demo dataset. Nothing is cached.
  pub fn demo() -> Self {
    Self {
      source: Source::Demo,
      cache: CacheLayer::disabled(),
      identity: IdentityFingerprint::anonymous(),
      ttl: TtlConfig::default(),
    }
  }

  pub fn is_demo(&self) -> bool {
    matches!(self.source, Source::Demo)
  }

  /// Rate limit reported by the last API response, if talking to the API.
  pub fn rate_limit(&self) -> Option<RateLimit> {
    match &self.source {
      Source::Live(client) => Some(client.rate_limit()),
      Source::Demo => None,
    }
  }

  /// Get the authenticated user's profile.
  pub async fn profile(&self) -> FetchOutcome<UserProfile> {
    self.profile_with(false).await
  }

  /// Fetch the profile from the API, bypassing the cache.
  pub async fn refresh_profile(&self) -> FetchOutcome<UserProfile> {
    self.profile_with(true).await
  }

  async fn profile_with(&self, force: bool) -> FetchOutcome<UserProfile> {
    let source = self.source.clone();
    self
      .load(&GitHubQuery::Profile, force, move || {
        let source = source.clone();
        async move { source.get_user().await }
      })
      .await
  }

  /// Get the user's repositories, most recently updated first.
  pub async fn repos(&self) -> FetchOutcome<Vec<Repository>> {
    self.repos_with(false).await
  }

  pub async fn refresh_repos(&self) -> FetchOutcome<Vec<Repository>> {
    self.repos_with(true).await
  }

  async fn repos_with(&self, force: bool) -> FetchOutcome<Vec<Repository>> {
    let query = GitHubQuery::Repos {
      page: 1,
      per_page: REPOS_PER_PAGE,
    };
    let source = self.source.clone();
    self
      .load(&query, force, move || {
        let source = source.clone();
        async move { source.list_repos(1, REPOS_PER_PAGE).await }
      })
      .await
  }

  /// Get pull requests matching a filter.
  pub async fn pull_requests(&self, filter: &PullRequestFilter) -> FetchOutcome<Vec<PullRequest>> {
    self.pull_requests_with(filter, false).await
  }

  pub async fn refresh_pull_requests(
    &self,
    filter: &PullRequestFilter,
  ) -> FetchOutcome<Vec<PullRequest>> {
    self.pull_requests_with(filter, true).await
  }

  async fn pull_requests_with(
    &self,
    filter: &PullRequestFilter,
    force: bool,
  ) -> FetchOutcome<Vec<PullRequest>> {
    let query = GitHubQuery::PullRequests(filter.clone());
    let source = self.source.clone();
    let filter = filter.clone();
    self
      .load(&query, force, move || {
        let source = source.clone();
        let filter = filter.clone();
        async move { source.list_pull_requests(&filter).await }
      })
      .await
  }

  /// Load profile and repositories concurrently.
  ///
  /// Each dataset is served or fetched on its own and yielded as soon as it is
  /// known, so a cached profile never waits for the repositories to download.
  pub fn dashboard(&self) -> DashboardSections<'_> {
    self.dashboard_with(false)
  }

  /// Force-refresh both dashboard datasets.
  pub fn refresh_dashboard(&self) -> DashboardSections<'_> {
    self.dashboard_with(true)
  }

  fn dashboard_with(&self, force: bool) -> DashboardSections<'_> {
    let sections = FuturesUnordered::new();
    sections.push(
      self
        .profile_with(force)
        .map(DashboardSection::Profile)
        .boxed(),
    );
    sections.push(self.repos_with(force).map(DashboardSection::Repos).boxed());
    sections
  }

  /// Drop every cached variant of a dataset for the current user.
  pub fn invalidate(&self, dataset: Dataset) -> Result<usize> {
    self.cache.invalidate_dataset(dataset, &self.identity)
  }

  /// Number of entries currently cached.
  pub fn cached_entries(&self) -> Result<usize> {
    self.cache.cached_entries()
  }

  /// Forget everything cached for the current user.
  pub fn sign_out(&self) -> Result<usize> {
    let removed = self.cache.forget_identity(&self.identity)?;
    info!(removed, "cleared cached data for signed out user");
    Ok(removed)
  }

  async fn load<T, F, Fut>(&self, query: &GitHubQuery, force: bool, producer: F) -> FetchOutcome<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let key = query.cache_key(&self.identity);
    let ttl = self.ttl.for_dataset(query.dataset());
    debug!(key = %key, force, "loading {}", query.description());

    if force {
      self.cache.force_refresh(&key, ttl, producer).await
    } else {
      self.cache.fetch(&key, ttl, producer).await
    }
  }
}
