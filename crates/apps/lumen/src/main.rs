//! Lumen - A terminal viewer for code-analysis history
//!
//! This is the main entry point for the Lumen application.

use anyhow::{Context, Result};
use clap::Parser;
use history::{
    ActionHandler, AnalysisGateway, FileFlagStore, FileSessionStore, FlagStore, HistoryEvents,
    HistoryGateway, HistorySync, HttpAnalysisGateway, HttpHistoryGateway, InMemoryAnalysisGateway,
    InMemoryFlagStore, InMemoryHistoryGateway, InMemorySessionStore, Session, SessionStore,
    Settings, Triggers,
};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod app;
mod commands;

use app::{Flow, LumenApp};

/// Keep your code-analysis history in view
#[derive(Debug, Parser)]
#[command(name = "lumen", version)]
struct Args {
    /// Sign in as this user instead of the remembered one
    #[arg(long)]
    user: Option<String>,

    /// API root of the analysis service (overrides LUMEN_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Keep history in memory instead of talking to the service
    #[arg(long)]
    offline: bool,
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let args = Args::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args)) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut settings = Settings::load().unwrap_or_else(|e| {
        warn!("Using default settings: {:#}", e);
        let mut settings = Settings::default();
        settings.apply_env();
        settings
    });
    if let Some(url) = args.api_url {
        settings.api_base_url = url;
    }

    let (gateway, analyzer): (Arc<dyn HistoryGateway>, Arc<dyn AnalysisGateway>) = if args.offline {
        info!("Offline mode: history is kept in memory");
        (
            Arc::new(InMemoryHistoryGateway::new()),
            Arc::new(InMemoryAnalysisGateway::new()),
        )
    } else {
        info!("Using history service at {}", settings.api_base_url);
        (
            Arc::new(
                HttpHistoryGateway::new(&settings.api_base_url, settings.request_timeout())
                    .context("Failed to create history client")?,
            ),
            Arc::new(
                HttpAnalysisGateway::new(&settings.api_base_url, settings.analysis_timeout())
                    .context("Failed to create analysis client")?,
            ),
        )
    };

    let (sessions, flags) = open_stores(args.offline);
    let session = match args.user {
        Some(name) => {
            let session = Session::new(&name).context("Username cannot be blank")?;
            if let Err(e) = sessions.set(&session) {
                warn!("Failed to remember session: {:#}", e);
            }
            Some(session)
        }
        None => sessions.current().unwrap_or_else(|e| {
            warn!("Failed to read remembered session: {:#}", e);
            None
        }),
    };

    let events = HistoryEvents::new();
    let sync = HistorySync::activate(gateway.clone(), settings, session)?;
    let triggers = Triggers::new().broadcast(&events).flag_store(flags.clone()).spawn(&sync);
    info!("Lumen started with {} refresh trigger(s)", triggers);

    let actions = ActionHandler::new(gateway, flags, events);
    let mut app = LumenApp::new(sync.clone(), actions, analyzer, sessions);
    app.spawn_printer();

    println!("Type 'help' for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        match commands::parse(&line) {
            Ok(Some(command)) => {
                if app.handle(command).await == Flow::Quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => println!("{}", message),
        }
    }

    sync.dispose();
    info!("Lumen exited");
    Ok(())
}

/// File-backed stores, or in-memory ones when offline so nothing on disk
/// is touched
fn open_stores(offline: bool) -> (Arc<dyn SessionStore>, Arc<dyn FlagStore>) {
    if offline {
        return (
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryFlagStore::new()),
        );
    }

    let sessions: Arc<dyn SessionStore> = match FileSessionStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Session will not be remembered: {:#}", e);
            Arc::new(InMemorySessionStore::new())
        }
    };
    let flags: Arc<dyn FlagStore> = match FileFlagStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Refresh flag is not shared with other instances: {:#}", e);
            Arc::new(InMemoryFlagStore::new())
        }
    };
    (sessions, flags)
}
