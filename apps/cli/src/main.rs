mod board;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client_core::{
    create_request, project, Endpoints, HttpRequestStore, RequestCollection, RequestStore,
    SessionEvent, SyncError, ViewSession, WebSocketEventSource,
};
use shared::domain::{RequestKind, TableId, WaiterId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::board::{parse_board_input, render_board, BoardInput, HELP};

#[derive(Parser, Debug)]
#[command(name = "bonatrack", about = "Table service requests for waiters and tables")]
struct Args {
    /// Overrides `server_url` from bonatrack.toml and the environment.
    #[arg(long, global = true)]
    server_url: Option<String>,
    #[arg(long, global = true)]
    api_prefix: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live board: snapshot plus realtime events, commands on stdin.
    Board {
        #[arg(long)]
        waiter_id: Option<i64>,
    },
    /// Print the current requests once, grouped by status.
    List,
    /// Raise a request from a table.
    Request {
        #[arg(long)]
        table: i64,
        #[arg(long = "type")]
        kind: RequestKind,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(api_prefix) = args.api_prefix {
        settings.api_prefix = api_prefix;
    }
    let endpoints = Endpoints::new(&settings.server_url, &settings.api_prefix, &settings.ws_path)?;

    match args.command {
        Command::Board { waiter_id } => {
            run_board(endpoints, WaiterId(waiter_id.unwrap_or(settings.waiter_id))).await
        }
        Command::List => run_list(endpoints).await,
        Command::Request { table, kind, notes } => {
            run_request(endpoints, TableId(table), kind, notes).await
        }
    }
}

async fn run_list(endpoints: Endpoints) -> Result<()> {
    let store = HttpRequestStore::new(endpoints);
    let records = store
        .list_requests()
        .await
        .context("could not load requests")?;
    let collection = RequestCollection::from_snapshot(records);
    print!("{}", render_board(&project(&collection), Utc::now()));
    Ok(())
}

async fn run_request(
    endpoints: Endpoints,
    table: TableId,
    kind: RequestKind,
    notes: Option<String>,
) -> Result<()> {
    let store = HttpRequestStore::new(endpoints);
    let record = create_request(&store, table, kind, notes).await?;
    println!("request #{} ({}) sent for table {}", record.id, record.kind, record.table_id);
    Ok(())
}

async fn run_board(endpoints: Endpoints, waiter: WaiterId) -> Result<()> {
    let store = Arc::new(HttpRequestStore::new(endpoints.clone()));
    let source = Arc::new(WebSocketEventSource::new(endpoints.events()));
    let session = ViewSession::new(store, source);
    let mut events = session.subscribe_events();

    session
        .activate()
        .await
        .with_context(|| format!("could not open {}", endpoints.events()))?;
    info!(waiter = waiter.0, "board: active");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::BoardUpdated(board)) => {
                    print!("{}", render_board(&board, Utc::now()));
                }
                Ok(SessionEvent::SnapshotFailed { message, .. }) => {
                    eprintln!("could not load requests: {message} (type `reload` to retry)");
                }
                Ok(SessionEvent::CommandFailed { id, target, message }) => {
                    eprintln!("request #{id} could not move to {target}: {message}");
                }
                Ok(SessionEvent::StreamClosed { .. }) => {
                    eprintln!("realtime connection closed");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "board: redrawing after lagged events");
                    print!("{}", render_board(&session.board().await, Utc::now()));
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_board_input(&line) {
                    Ok(None) => {}
                    Ok(Some(BoardInput::Transition(id, target))) => {
                        let session = Arc::clone(&session);
                        tokio::spawn(async move {
                            match session.transition(id, target, waiter).await {
                                Ok(_) => {}
                                // reported through SessionEvent::CommandFailed
                                Err(SyncError::Command { .. }) => {}
                                Err(err) => eprintln!("{err}"),
                            }
                        });
                    }
                    Ok(Some(BoardInput::Reload)) => session.reload_snapshot().await?,
                    Ok(Some(BoardInput::Show)) => {
                        print!("{}", render_board(&session.board().await, Utc::now()));
                    }
                    Ok(Some(BoardInput::Help)) => println!("{HELP}"),
                    Ok(Some(BoardInput::Quit)) => break,
                    Err(message) => eprintln!("{message}"),
                }
            }
        }
    }

    session.deactivate().await;
    Ok(())
}
