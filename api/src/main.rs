mod config;
mod db;
mod error;
mod nested;
mod pagination;
mod routes;
mod types;

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::ServerConfig;
use crate::db::ParameterStore;
use crate::pagination::PaginationSettings;
use crate::types::ParentKind;

#[derive(Parser)]
#[command(name = "paramd", about = "Nested parameters API for hosts, hostgroups, domains and operating systems")]
struct Cli {
    /// Load config from a specific .env file
    #[arg(long)]
    config_file: Option<String>,

    /// Override the listening port
    #[arg(long)]
    port: Option<u16>,

    /// Override the SQLite database path
    #[arg(long)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Register a host, hostgroup, domain or operatingsystem and print its id
    AddParent {
        /// host, hostgroup, domain or operatingsystem
        kind: ParentKind,
        name: String,
    },
}

/// Shared application state passed to all route handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: ParameterStore,
    pub pagination: PaginationSettings,
}

/// Socket address from BIND_ADDR and PORT. Accepts IPv4 and bare IPv6 (`::`).
fn listen_addr(config: &ServerConfig) -> Result<SocketAddr> {
    let ip: IpAddr = config
        .bind_addr
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .with_context(|| format!("BIND_ADDR must be an IP address: {}", config.bind_addr))?;
    Ok(SocketAddr::new(ip, config.port))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration, CLI flags win over the environment
    let mut config = ServerConfig::from_env_file(cli.config_file.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(db_path) = cli.db_path {
        config.database_path = db_path;
    }
    info!(
        "Configuration loaded (port={}, db={})",
        config.port, config.database_path
    );

    let store = ParameterStore::open(&config.database_path)?;

    if let Some(Command::AddParent { kind, name }) = cli.command {
        let parent = store.insert_parent(kind, &name)?;
        info!("Registered {} '{}' with id {}", kind, parent.name, parent.id);
        println!("{}", parent.id);
        return Ok(());
    }

    let state = AppState {
        store,
        pagination: PaginationSettings {
            default_per_page: config.default_per_page,
            max_per_page: config.max_per_page,
        },
    };

    let app = routes::router(state);

    // Start server
    let addr = listen_addr(&config)?;
    info!("Nested parameters API v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    info!("Routes:");
    info!("  GET    /api/health");
    for kind in ParentKind::ALL {
        info!(
            "  GET|POST|DELETE  /api/{}/:{}_id/parameters",
            kind.path_segment(),
            kind.singular()
        );
        info!(
            "  GET|PUT|DELETE   /api/{}/:{}_id/parameters/:id",
            kind.path_segment(),
            kind.singular()
        );
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
