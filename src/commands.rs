//! Commands typed on stdin while `--watch` is running.

use color_eyre::{eyre::eyre, Result};

use crate::cache::Dataset;

#[derive(Debug, Clone)]
pub struct CommandInfo {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[CommandInfo] = &[
  CommandInfo {
    name: "refresh",
    aliases: &["r", "reload"],
    usage: "refresh",
    description: "Read again now, bypassing cached data",
  },
  CommandInfo {
    name: "invalidate",
    aliases: &["i", "drop"],
    usage: "invalidate <profile|repos|prs>",
    description: "Drop one dataset from the cache",
  },
  CommandInfo {
    name: "sign-out",
    aliases: &["logout", "clear"],
    usage: "sign-out",
    description: "Forget everything cached for the current token",
  },
  CommandInfo {
    name: "status",
    aliases: &["s", "stats"],
    usage: "status",
    description: "Show cache size and rate limit",
  },
  CommandInfo {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  CommandInfo {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Stop watching",
  },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
  Refresh,
  Invalidate(Dataset),
  SignOut,
  Status,
  Help,
  Quit,
}

/// Find a command by name or alias, then by a prefix matching exactly one name.
fn lookup(word: &str) -> Option<&'static CommandInfo> {
  let word = word.to_lowercase();

  if let Some(cmd) = COMMANDS
    .iter()
    .find(|c| c.name == word || c.aliases.contains(&word.as_str()))
  {
    return Some(cmd);
  }

  let mut prefixed = COMMANDS.iter().filter(|c| c.name.starts_with(&word));
  match (prefixed.next(), prefixed.next()) {
    (Some(cmd), None) => Some(cmd),
    _ => None,
  }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<WatchCommand>> {
  let mut words = line.split_whitespace();
  let Some(first) = words.next() else {
    return Ok(None);
  };
  let cmd = lookup(first).ok_or_else(|| eyre!("Unknown command '{}', try 'help'", first))?;
  let args: Vec<&str> = words.collect();

  let command = match (cmd.name, args.as_slice()) {
    ("invalidate", [dataset]) => WatchCommand::Invalidate(dataset.parse()?),
    ("invalidate", _) => return Err(eyre!("Usage: {}", cmd.usage)),
    (_, [_, ..]) => return Err(eyre!("'{}' takes no arguments", cmd.name)),
    ("refresh", []) => WatchCommand::Refresh,
    ("sign-out", []) => WatchCommand::SignOut,
    ("status", []) => WatchCommand::Status,
    ("help", []) => WatchCommand::Help,
    _ => WatchCommand::Quit,
  };
  Ok(Some(command))
}

pub fn help_lines() -> Vec<String> {
  COMMANDS
    .iter()
    .map(|c| format!("{:<32} {}", c.usage, c.description))
    .collect()
}
