//! quote-sync: local quote manager that reconciles with a remote list.
//!
//! One-shot subcommands manage the local collection; `run` keeps a session
//! open with periodic sync and an interactive prompt.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quote_core::{CategoryFilter, QuoteSession, SyncOutcome};
use quote_daemon::config::validate_server_url;
use quote_daemon::console::{self, ConsoleCommand};
use quote_daemon::{Config, ConfigInput, FileStore, HttpGateway, SyncInterval, SyncScheduler};

type Session = QuoteSession<FileStore, HttpGateway>;

#[derive(Parser, Debug)]
#[command(name = "quote-sync")]
#[command(about = "Local quote manager with remote-wins server sync")]
struct Args {
    /// Directory for stored quotes and settings
    #[arg(long, env = "QUOTE_SYNC_DATA_DIR", global = true)]
    data_dir: Option<String>,

    /// Remote list endpoint
    #[arg(long, env = "QUOTE_SYNC_SERVER_URL", global = true)]
    server_url: Option<String>,

    /// Seconds between scheduled syncs in `run` mode (minimum 5)
    #[arg(long, env = "QUOTE_SYNC_INTERVAL_SECS", global = true)]
    interval: Option<u64>,

    /// Endpoint field holding the remote id
    #[arg(long, env = "QUOTE_SYNC_ID_FIELD", global = true)]
    id_field: Option<String>,

    /// Endpoint field holding the quote text
    #[arg(long, env = "QUOTE_SYNC_TEXT_FIELD", global = true)]
    text_field: Option<String>,

    /// Endpoint field holding the category
    #[arg(long, env = "QUOTE_SYNC_CATEGORY_FIELD", global = true)]
    category_field: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "QUOTE_SYNC_TIMEOUT_SECS", global = true)]
    timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List quotes in the selected category (or all of them)
    List {
        /// Ignore the selected filter
        #[arg(long, conflicts_with = "category")]
        all: bool,
        /// List this category instead of the selected filter
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List known categories
    Categories,
    /// Show a random quote from the selected category
    Random {
        /// Draw from this category instead of the selected filter
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Add a quote
    Add {
        text: String,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        author: Option<String>,
    },
    /// Delete a quote by local id
    Remove { local_id: String },
    /// Write all quotes as JSON to a file, or stdout
    Export { path: Option<PathBuf> },
    /// Append quotes from a JSON file
    Import { path: PathBuf },
    /// Show or select the category filter ("All" clears it)
    Filter { category: Option<String> },
    /// Reconcile with the server once and print the conflict report
    Sync,
    /// Keep running with periodic sync and an interactive prompt (default)
    Run,
}

impl Args {
    fn config_input(&self) -> ConfigInput {
        ConfigInput {
            data_dir: self.data_dir.clone(),
            server_url: self.server_url.clone(),
            interval_secs: self.interval,
            id_field: self.id_field.clone(),
            text_field: self.text_field.clone(),
            category_field: self.category_field.clone(),
            timeout_secs: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so command output on stdout stays clean
    let default_filter = if args.verbose {
        "debug,quote_daemon=debug,quote_core=debug"
    } else {
        "info,quote_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(args.config_input()).context("Invalid configuration")?;
    info!("Data directory: {:?}", config.data_dir);

    let gateway = HttpGateway::new(
        config.server_url.clone(),
        config.fields.clone(),
        config.request_timeout,
    )
    .context("Failed to create HTTP gateway")?;
    let store = Arc::new(FileStore::new(config.data_dir.clone()));
    let session = Arc::new(QuoteSession::load(store, gateway));

    match args.command.unwrap_or(Command::Run) {
        Command::List { all, category } => {
            let quotes = match (all, category) {
                (true, _) => session.quotes(),
                (false, Some(category)) => session.quotes_in(&CategoryFilter::parse(&category)),
                (false, None) => session.visible_quotes(),
            };
            print!("{}", with_newline(console::render_list(&quotes)));
        }
        Command::Categories => println!("{}", console::render_categories(&session.categories())),
        Command::Random { category } => {
            let filter = category
                .map(|c| CategoryFilter::parse(&c))
                .unwrap_or_else(|| session.filter());
            print_random(&session, &filter);
        }
        Command::Add {
            text,
            category,
            author,
        } => add_quote(&session, &text, category.as_deref(), author.as_deref())?,
        Command::Remove { local_id } => match session.remove_quote(&local_id) {
            Some(removed) => println!("Removed {}", removed.local_id),
            None => anyhow::bail!("No quote with id {}", local_id),
        },
        Command::Export { path } => {
            let json = session.export_json().context("Failed to export quotes")?;
            match path {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Exported {} quote(s) to {:?}", session.quotes().len(), path);
                }
                None => println!("{}", json),
            }
        }
        Command::Import { path } => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let count = session
                .import_json(&json)
                .with_context(|| format!("Failed to import {:?}", path))?;
            println!("Imported {} quote(s)", count);
        }
        Command::Filter { category } => match category {
            Some(category) => select_filter(&session, &category),
            None => {
                println!("Current filter: {}", session.filter().as_str());
                println!("{}", console::render_categories(&session.categories()));
            }
        },
        Command::Sync => {
            let outcome = session.sync_now().await;
            println!("{}", console::render_outcome(&outcome));
            if let SyncOutcome::Completed(_) = outcome {
                print!("{}", with_newline(console::render_conflicts(&session.conflicts())));
            }
        }
        Command::Run => run(Arc::clone(&session), config.sync_interval).await,
    }

    session.shutdown();
    Ok(())
}

/// Interactive mode: periodic sync plus a command prompt until quit or Ctrl+C.
async fn run(session: Arc<Session>, interval: SyncInterval) {
    info!("Syncing with {} every {}s", session.gateway().url(), interval.period().as_secs());

    let _notifications = session.events().subscribe(|event| {
        if let Some(message) = console::describe_event(event) {
            println!("{}", message);
        }
    });

    let tick_session = Arc::clone(&session);
    let mut scheduler = SyncScheduler::new(move || {
        let session = Arc::clone(&tick_session);
        async move {
            if let SyncOutcome::Coalesced = session.sync_now().await {
                info!("Scheduled sync folded into the running pass");
            }
        }
    });

    // Initial pass, then keep the schedule
    scheduler.trigger();
    scheduler.start(interval);

    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if !handle_line(&session, &mut scheduler, &line).await {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Input closed, continuing with scheduled sync. Press Ctrl+C to stop.");
                    input_open = false;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    input_open = false;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    scheduler.stop();
    info!("Shutting down");
}

/// Handle one prompt line. Returns false when the user quits.
async fn handle_line<F, Fut>(session: &Session, scheduler: &mut SyncScheduler<F>, line: &str) -> bool
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let command = match ConsoleCommand::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    match command {
        ConsoleCommand::Sync => {
            // Failures and changes are already announced by the notifications
            let outcome = session.sync_now().await;
            if !matches!(outcome, SyncOutcome::Failed(_)) {
                println!("{}", console::render_outcome(&outcome));
            }
        }
        ConsoleCommand::List => print!("{}", with_newline(console::render_list(&session.visible_quotes()))),
        ConsoleCommand::Random => print_random(session, &session.filter()),
        ConsoleCommand::Categories => println!("{}", console::render_categories(&session.categories())),
        ConsoleCommand::Conflicts => print!("{}", with_newline(console::render_conflicts(&session.conflicts()))),
        ConsoleCommand::Revert(index) => match session.revert_conflict(index) {
            Ok(_) => {}
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Filter(category) => select_filter(session, &category),
        ConsoleCommand::Interval(secs) => match SyncInterval::from_secs(secs) {
            Ok(interval) => {
                scheduler.start(interval);
                println!("Sync interval set to {}s", secs);
            }
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Server(url) => match validate_server_url(&url) {
            Ok(()) => {
                session.gateway().set_url(url.as_str());
                println!("Server set to {}", url);
            }
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Add {
            text,
            category,
            author,
        } => {
            if let Err(e) = add_quote(session, &text, category.as_deref(), author.as_deref()) {
                println!("{}", e);
            }
        }
        ConsoleCommand::Remove(local_id) => match session.remove_quote(&local_id) {
            Some(removed) => println!("Removed {}", removed.local_id),
            None => println!("No quote with id {}", local_id),
        },
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Quit => return false,
    }
    true
}

fn add_quote(session: &Session, text: &str, category: Option<&str>, author: Option<&str>) -> Result<()> {
    let quote = session
        .add_quote(text, category, author)
        .context("Quote not added")?;
    println!("Added {}\n  {}", quote.local_id, console::render_quote(&quote));
    Ok(())
}

fn print_random(session: &Session, filter: &CategoryFilter) {
    match session.random_quote_in(filter) {
        Some(quote) => println!("{}", console::render_quote(&quote)),
        None => println!("No quotes in category {}.", filter.as_str()),
    }
}

fn select_filter(session: &Session, category: &str) {
    let filter = CategoryFilter::parse(category);
    if let CategoryFilter::Category(name) = &filter {
        if !session.categories().contains(name) {
            warn!("No quotes in category {} yet", name);
        }
    }
    session.set_filter(filter);
    println!("Filter: {}", session.filter().as_str());
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
