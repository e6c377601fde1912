//! Console presentation: renders quotes, reports and notifications, and
//! parses commands typed during an interactive run.
//!
//! Conflicts are numbered from 1 on screen and converted to report indices
//! when parsed.

use quote_core::{ConflictReport, Quote, QuoteEvent, SyncOutcome, SyncSummary};
use std::fmt::Write;
use thiserror::Error;

/// One line of a quote: text, attribution and category.
pub fn render_quote(quote: &Quote) -> String {
    format!(
        "\"{}\"\n    - {} [{}]",
        quote.text,
        quote.author_or_unknown(),
        quote.category
    )
}

/// Numbered list with ids, for `list` output.
pub fn render_list(quotes: &[Quote]) -> String {
    if quotes.is_empty() {
        return "No quotes.".to_string();
    }

    let mut out = String::new();
    for quote in quotes {
        let remote = match quote.remote_id {
            Some(id) => format!("remote #{}", id),
            None => "local only".to_string(),
        };
        let _ = writeln!(out, "{} ({})", quote.local_id, remote);
        let _ = writeln!(out, "  {}", render_quote(quote));
    }
    out
}

pub fn render_categories(categories: &[String]) -> String {
    if categories.is_empty() {
        return "No categories.".to_string();
    }
    categories.join("\n")
}

pub fn render_summary(summary: &SyncSummary) -> String {
    format!(
        "Sync finished: {} conflict(s), {} added from remote, {} uploaded, {} upload(s) pending",
        summary.conflict_count,
        summary.added_from_remote_count,
        summary.uploaded_count,
        summary.failed_upload_count
    )
}

pub fn render_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Completed(summary) => render_summary(summary),
        SyncOutcome::Coalesced => "A sync is already running; it will run again.".to_string(),
        SyncOutcome::Failed(e) => format!("Sync failed, local quotes unchanged: {}", e),
    }
}

/// The conflict report with local and remote versions side by side.
pub fn render_conflicts(report: &ConflictReport) -> String {
    if report.is_empty() {
        return "No conflicts from the last sync.".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} conflict(s), {} unresolved. Remote versions were applied.",
        report.len(),
        report.unresolved_count()
    );
    for (index, record) in report.iter().enumerate() {
        let local = &record.snapshot_before_resolution;
        let remote = &record.remote_version;
        let state = if record.resolved { " (reverted)" } else { "" };
        let _ = writeln!(out, "[{}] {}{}", index + 1, record.local_id(), state);
        let _ = writeln!(out, "    local:  \"{}\" [{}]", local.text, local.category);
        let _ = writeln!(out, "    remote: \"{}\" [{}]", remote.text, remote.category);
    }
    out
}

/// One-line notification for events worth interrupting the user with.
pub fn describe_event(event: &QuoteEvent) -> Option<String> {
    match event {
        QuoteEvent::ConflictsDetected { count } => Some(format!(
            "{} conflict(s) resolved in favour of the server. Type 'conflicts' to review.",
            count
        )),
        QuoteEvent::SyncFailed { reason, .. } => Some(format!("Sync failed: {}", reason)),
        QuoteEvent::SyncCompleted { summary, .. }
            if summary.added_from_remote_count > 0 || summary.uploaded_count > 0 =>
        {
            Some(render_summary(summary))
        }
        QuoteEvent::ConflictReverted { index, local_id } => Some(format!(
            "Conflict {} reverted, local version of {} restored.",
            index + 1,
            local_id
        )),
        _ => None,
    }
}

/// A command typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Sync,
    List,
    Random,
    Categories,
    Conflicts,
    /// Report index, already zero-based.
    Revert(usize),
    Filter(String),
    Interval(u64),
    /// New remote endpoint URL, unvalidated.
    Server(String),
    /// `add text | category | author`, trailing parts optional.
    Add {
        text: String,
        category: Option<String>,
        author: Option<String>,
    },
    Remove(String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  sync                          reconcile with the server now
  list                          show quotes in the current filter
  random                        show a random quote from the current filter
  categories                    list known categories
  conflicts                     show the last conflict report
  revert <n>                    restore the local version of conflict n
  filter <category|All>         select a category filter
  interval <secs>               change the sync interval (min 5)
  server <url>                  change the server URL
  add <text> [| cat [| author]] add a quote
  remove <local-id>             delete a quote
  help                          show this help
  quit                          exit";

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "sync" => Self::Sync,
            "list" | "ls" => Self::List,
            "random" => Self::Random,
            "categories" => Self::Categories,
            "conflicts" => Self::Conflicts,
            "revert" => {
                let n: usize = rest.parse().map_err(|_| CommandError::Usage("revert <n>"))?;
                if n == 0 {
                    return Err(CommandError::Usage("revert <n>, counting from 1"));
                }
                Self::Revert(n - 1)
            }
            "filter" => {
                if rest.is_empty() {
                    return Err(CommandError::Usage("filter <category|All>"));
                }
                Self::Filter(rest.to_string())
            }
            "interval" => {
                let secs = rest
                    .parse()
                    .map_err(|_| CommandError::Usage("interval <secs>"))?;
                Self::Interval(secs)
            }
            "server" | "url" => {
                if rest.is_empty() || rest.contains(char::is_whitespace) {
                    return Err(CommandError::Usage("server <url>"));
                }
                Self::Server(rest.to_string())
            }
            "add" => {
                let mut parts = rest.split('|').map(str::trim);
                let text = parts.next().unwrap_or_default();
                if text.is_empty() {
                    return Err(CommandError::Usage("add <text> [| category [| author]]"));
                }
                let mut optional = || parts.next().filter(|p| !p.is_empty()).map(String::from);
                let category = optional();
                let author = optional();
                Self::Add {
                    text: text.to_string(),
                    category,
                    author,
                }
            }
            "remove" | "rm" => {
                if rest.is_empty() {
                    return Err(CommandError::Usage("remove <local-id>"));
                }
                Self::Remove(rest.to_string())
            }
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}
