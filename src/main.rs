mod cache;
mod commands;
mod config;
mod github;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use cache::FetchSignal;
use commands::WatchCommand;
use github::{CachedGitHubClient, DashboardSection, PullRequestFilter, RepoRef, StateFilter};

#[derive(Parser, Debug)]
#[command(name = "ghcache")]
#[command(about = "Cached, retrying reads of your GitHub profile, repositories and pull requests")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ghcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Bypass cached data on the first read
  #[arg(short, long)]
  refresh: bool,

  /// Read again every SECS seconds; type `help` for commands while watching
  #[arg(short, long, value_name = "SECS")]
  watch: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
  /// Show the authenticated user
  Profile,
  /// List your repositories
  Repos,
  /// List pull requests
  Prs {
    /// Only this repository (owner/name); defaults to pull requests you authored
    #[arg(long)]
    repo: Option<RepoRef>,

    #[arg(long, value_enum, default_value_t = StateFilter::Open)]
    state: StateFilter,
  },
  /// Profile and repositories together
  Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  let config = config::Config::load(args.config.as_deref())?;
  let client = CachedGitHubClient::from_config(&config)?;
  if client.is_demo() {
    eprintln!("No GHCACHE_TOKEN or GITHUB_TOKEN set, showing demo data");
  }

  match args.watch {
    None => run(&client, &args.command, args.refresh).await,
    Some(0) => Err(eyre!("--watch interval must be at least 1 second")),
    Some(secs) => watch(&client, &args.command, args.refresh, Duration::from_secs(secs)).await,
  }
}

/// Re-run `command` on an interval, taking commands from stdin in between.
async fn watch(
  client: &CachedGitHubClient,
  command: &Command,
  refresh: bool,
  every: Duration,
) -> Result<()> {
  let mut ticker = tokio::time::interval(every);
  let mut input = BufReader::new(tokio::io::stdin()).lines();
  let mut stdin_open = true;
  let mut force = refresh;

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        report(run(client, command, force).await);
        force = false;
      }
      line = input.next_line(), if stdin_open => {
        let line = match line {
          Ok(Some(line)) => line,
          Ok(None) | Err(_) => {
            stdin_open = false;
            continue;
          }
        };
        match commands::parse(&line) {
          Ok(Some(WatchCommand::Quit)) => return Ok(()),
          Ok(Some(cmd)) => report(handle(client, command, cmd).await),
          Ok(None) => {}
          Err(e) => eprintln!("{}", e),
        }
      }
      _ = tokio::signal::ctrl_c() => {
        info!("interrupted, stopping watch");
        return Ok(());
      }
    }
  }
}

fn report(result: Result<()>) {
  if let Err(e) = result {
    eprintln!("{:#}", e);
  }
}

async fn handle(client: &CachedGitHubClient, command: &Command, cmd: WatchCommand) -> Result<()> {
  match cmd {
    WatchCommand::Refresh => run(client, command, true).await?,
    WatchCommand::Invalidate(dataset) => {
      let removed = client.invalidate(dataset)?;
      eprintln!("Dropped {} cached {} entries", removed, dataset);
    }
    WatchCommand::SignOut => {
      let removed = client.sign_out()?;
      eprintln!("Forgot {} cached entries for this token", removed);
    }
    WatchCommand::Status => {
      eprintln!("{} entries cached", client.cached_entries()?);
      if let Some(rate_limit) = client.rate_limit() {
        eprintln!(
          "{} of {} API requests left",
          rate_limit.remaining, rate_limit.limit
        );
      }
    }
    WatchCommand::Help => {
      for line in commands::help_lines() {
        eprintln!("{}", line);
      }
    }
    WatchCommand::Quit => {}
  }
  Ok(())
}

/// Run one read and print it. Fails only when nothing could be shown.
async fn run(client: &CachedGitHubClient, command: &Command, force: bool) -> Result<()> {
  let mut signals = Vec::new();

  match command {
    Command::Profile => {
      let outcome = if force {
        client.refresh_profile().await
      } else {
        client.profile().await
      };
      signals.push(outcome.signal());
      print_lines(&output::outcome_lines("profile", &outcome, output::profile))?;
    }
    Command::Repos => {
      let outcome = if force {
        client.refresh_repos().await
      } else {
        client.repos().await
      };
      signals.push(outcome.signal());
      print_lines(&output::outcome_lines("repositories", &outcome, |r| {
        output::repos(r)
      }))?;
    }
    Command::Prs { repo, state } => {
      let filter = PullRequestFilter {
        repo: repo.clone(),
        state: *state,
      };
      let outcome = if force {
        client.refresh_pull_requests(&filter).await
      } else {
        client.pull_requests(&filter).await
      };
      signals.push(outcome.signal());
      print_lines(&output::outcome_lines("pull requests", &outcome, |p| {
        output::pull_requests(p)
      }))?;
    }
    Command::Dashboard => {
      let mut sections = if force {
        client.refresh_dashboard()
      } else {
        client.dashboard()
      };
      // Print each dataset as soon as it is loaded
      while let Some(section) = sections.next().await {
        let lines = match &section {
          DashboardSection::Profile(outcome) => {
            signals.push(outcome.signal());
            output::outcome_lines("profile", outcome, output::profile)
          }
          DashboardSection::Repos(outcome) => {
            signals.push(outcome.signal());
            output::outcome_lines("repositories", outcome, |r| output::repos(r))
          }
        };
        print_lines(&lines)?;
      }
    }
  }

  if let Some(rate_limit) = client.rate_limit() {
    info!(
      remaining = rate_limit.remaining,
      limit = rate_limit.limit,
      "rate limit"
    );
  }

  if signals.iter().all(|s| *s == FetchSignal::HardFailureNoCache) {
    return Err(eyre!("Nothing could be loaded"));
  }
  Ok(())
}

fn print_lines(lines: &[String]) -> Result<()> {
  let mut stdout = std::io::stdout().lock();
  for line in lines {
    writeln!(stdout, "{}", line).map_err(|e| eyre!("Failed to write output: {}", e))?;
  }
  stdout
    .flush()
    .map_err(|e| eyre!("Failed to write output: {}", e))
}
