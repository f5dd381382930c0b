//! Pagesrv Daemon - static file and directory index HTTP server

mod config;
mod handler;
mod http;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use pagecache::ResponseCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::config::{ServerConfig, DEFAULT_MAX_RESPONSE_BYTES};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:3490")]
    bind: String,

    /// Document root
    #[arg(short, long, default_value = "./serverroot")]
    root: String,

    /// System files directory (must contain 404.html)
    #[arg(short, long, default_value = "./serverfiles")]
    files: String,

    /// Cache capacity (number of responses)
    #[arg(short, long, default_value_t = 10)]
    capacity: usize,

    /// Seconds before a cached response is regenerated
    #[arg(long, default_value_t = 60)]
    staleness_secs: u64,

    /// Connections served at once; extra connections get 503
    #[arg(long, default_value_t = 256)]
    max_connections: usize,

    /// Largest response frame (headers + body) in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_RESPONSE_BYTES)]
    max_response_bytes: usize,

    /// Seconds a client may stay silent before its request is abandoned
    #[arg(long, default_value_t = 30)]
    read_timeout_secs: u64,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig::new(&self.root, &self.files);
        config.capacity = self.capacity;
        config.staleness = Duration::from_secs(self.staleness_secs);
        config.max_connections = self.max_connections;
        config.max_response_bytes = self.max_response_bytes;
        config.read_timeout = Duration::from_secs(self.read_timeout_secs);
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    // Health check
    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    let bind = args.bind.clone();
    let config = args.into_config();
    config.validate().context("Invalid configuration")?;

    info!("Starting Pagesrv v{}", env!("CARGO_PKG_VERSION"));
    info!("Document root: {:?}", config.root);
    info!("System files: {:?}", config.files);
    info!(
        "Cache capacity: {} entries, staleness window: {:?}",
        config.capacity, config.staleness
    );
    if !config.not_found_page().is_file() {
        tracing::warn!(
            "{:?} is missing; not-found requests will get 500",
            config.not_found_page()
        );
    }

    let cache = Arc::new(ResponseCache::new(config.capacity)?);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Server listening on {}", bind);

    println!("\n  pagesrv ready on http://{}/", bind);
    println!("    curl -D - http://{}/", bind);
    println!("    curl -D - http://{}/d20", bind);
    println!(
        "    curl -D - -X POST -H 'Content-Type: text/plain' -d 'Hello!' http://{}/save/hello.txt",
        bind
    );
    println!("\n  Press Ctrl+C to stop\n");

    tokio::select! {
        result = server::run(listener, Arc::new(config), cache) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
