//! Canary-RS command line
//!
//! Runs one search or ask against the configured providers.

use anyhow::{bail, Context, Result};
use canary_rs::{
    config, network::HttpClient, AskState, DispatchStatus, ProviderLoader, Reference, Settings,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

enum Command {
    Search(String),
    Ask(String),
    Help,
    Version,
}

struct Args {
    config: Option<PathBuf>,
    json: bool,
    command: Command,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut config = None;
        let mut json = false;
        let mut words = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Self::with(Command::Help)),
                "-V" | "--version" => return Ok(Self::with(Command::Version)),
                "-c" | "--config" => {
                    let path = args.next().context("--config needs a file")?;
                    config = Some(PathBuf::from(path));
                }
                "--json" => json = true,
                _ => words.push(arg),
            }
        }

        let mut words = words.into_iter();
        let mode = words.next();
        let query = words.collect::<Vec<_>>().join(" ");

        let command = match mode.as_deref() {
            Some("search") => Command::Search(query),
            Some("ask") => Command::Ask(query),
            Some(other) => bail!("unknown command: {}", other),
            None => Command::Help,
        };

        Ok(Self {
            config,
            json,
            command,
        })
    }

    fn with(command: Command) -> Self {
        Self {
            config: None,
            json: false,
            command,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    match args.command {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Version => {
            println!("canary-rs {}", canary_rs::VERSION);
            return Ok(());
        }
        _ => {}
    }

    // Load configuration
    let settings = config::load(args.config.as_deref())?;

    // Initialize logging; stdout is reserved for results
    let default_level = if settings.general.debug { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting {} v{}", settings.general.instance_name, canary_rs::VERSION);

    match args.command {
        Command::Search(query) => search(&settings, &query, args.json).await,
        Command::Ask(query) => ask(&settings, &query, args.json).await,
        Command::Help | Command::Version => Ok(()),
    }
}

async fn search(settings: &Settings, query: &str, json: bool) -> Result<()> {
    let client = HttpClient::with_settings(&settings.outgoing)?;
    let registry = ProviderLoader::load(settings, &client).await?;
    let controller = registry.search_controller()?;

    let Some(call) = controller.submit(query) else {
        bail!("empty query");
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            return Ok(());
        }
        _ = call.join() => {}
    }

    let state = controller.state();
    if state.status == DispatchStatus::Error {
        let message = state.error.map(|e| e.message).unwrap_or_default();
        bail!("search failed: {}", message);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&state.results)?);
    } else if state.results.is_empty() {
        println!("No results for '{}'", query);
    } else {
        print_references(&state.results);
    }
    Ok(())
}

async fn ask(settings: &Settings, query: &str, json: bool) -> Result<()> {
    let client = HttpClient::with_settings(&settings.outgoing)?;
    let registry = ProviderLoader::load(settings, &client).await?;
    let controller = registry.ask_controller()?;

    let mut updates = controller.subscribe();
    if controller.submit(query).is_none() {
        bail!("empty query");
    }

    let mut printed = 0;
    let state: AskState = loop {
        {
            let state = updates.borrow_and_update();
            if !json && state.response.len() > printed {
                print!("{}", &state.response[printed..]);
                std::io::stdout().flush()?;
                printed = state.response.len();
            }
            if !state.is_pending() {
                break state.clone();
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, cancelling ask");
                controller.cancel();
                break controller.state();
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break controller.state();
                }
            }
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    println!();

    if state.status == DispatchStatus::Error {
        let message = state.error.map(|e| e.message).unwrap_or_default();
        bail!("ask failed: {}", message);
    }
    if !state.references.is_empty() {
        println!();
        print_references(&state.references);
    }
    Ok(())
}

fn print_references(references: &[Reference]) {
    for (i, reference) in references.iter().enumerate() {
        if reference.titles.is_empty() {
            println!("{:>2}. {}", i + 1, reference.title);
        } else {
            println!(
                "{:>2}. {} > {}",
                i + 1,
                reference.titles.join(" > "),
                reference.title
            );
        }
        println!("    {}", reference.url);
    }
}

/// Print usage information
fn print_usage() {
    println!(
        r#"
Canary-RS v{}
Search and ask over your documentation

USAGE:
    canary-rs [OPTIONS] search <QUERY>...
    canary-rs [OPTIONS] ask <QUERY>...

OPTIONS:
    -c, --config <FILE>    Path to configuration file
        --json             Print results as JSON
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    CANARY_SETTINGS_PATH   Path to canary.yml
    CANARY_DEBUG           Enable debug logging (true/false)
    CANARY_REQUEST_TIMEOUT Request timeout in seconds
    CANARY_BASE_URL        Hosted API root for cloud providers
    CANARY_API_KEY         Hosted API key for cloud providers
    RUST_LOG               Log filter, overrides CANARY_DEBUG
"#,
        canary_rs::VERSION
    );
}
