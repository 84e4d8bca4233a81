//! GitHub REST API access with caching and a demo fallback.

mod api_types;
mod cache;
mod cached_client;
mod client;
mod demo;
mod error;
mod types;

pub use cached_client::{CachedGitHubClient, DashboardSection};
pub use types::{PullRequest, PullRequestFilter, RepoRef, Repository, StateFilter, UserProfile};
