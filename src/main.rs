//! ChronoKV server entry point.
//!
//! Binds the RESP listener and the HTTP façade, starts the background
//! expirer, and coordinates graceful shutdown: Ctrl-C flips a watch
//! channel, the acceptors stop, and the process waits up to 30 seconds
//! for the server tasks to drain before exiting.

use anyhow::Context;
use chronokv::commands::CommandDispatcher;
use chronokv::connection::{handle_connection, ConnectionStats};
use chronokv::http;
use chronokv::storage::{start_expirer, VersionedStore, SHARD_COUNT};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// How long shutdown waits for the server tasks to finish.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

struct Config {
    host: String,
    tcp_port: u16,
    http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: chronokv::DEFAULT_HOST.to_string(),
            tcp_port: chronokv::DEFAULT_TCP_PORT,
            http_port: chronokv::DEFAULT_HTTP_PORT,
        }
    }
}

impl Config {
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = take_value(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" => {
                    config.tcp_port = parse_port(&take_value(&args, i, "--port"));
                    i += 2;
                }
                "--http-port" => {
                    config.http_port = parse_port(&take_value(&args, i, "--http-port"));
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("chronokv {}", chronokv::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn tcp_address(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    fn http_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn parse_port(raw: &str) -> u16 {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid port number '{}'", raw);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"ChronoKV - in-memory key-value store with version history

USAGE:
    chronokv [OPTIONS]

OPTIONS:
    -h, --host <HOST>         Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>         RESP port to listen on (default: 6380)
        --http-port <PORT>    HTTP facade port (default: 8080)
    -v, --version             Print version information
        --help                Print this help message

CONNECTING:
    Any Redis client speaks the wire format:
    $ redis-cli -p 6380
    127.0.0.1:6380> SET name alice
    OK
    127.0.0.1:6380> HIST name
    1) (integer) 1712345678901
    2) "alice"
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let store = Arc::new(VersionedStore::new());
    info!(shards = SHARD_COUNT, "store initialized");

    let expirer = start_expirer(Arc::clone(&store));
    let stats = Arc::new(ConnectionStats::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = TcpListener::bind(config.tcp_address())
        .await
        .with_context(|| format!("failed to bind RESP listener on {}", config.tcp_address()))?;
    info!(addr = %config.tcp_address(), "listening for RESP connections");

    let http_addr: SocketAddr = config
        .http_address()
        .parse()
        .with_context(|| format!("invalid HTTP address {}", config.http_address()))?;
    let http_store = Arc::clone(&store);
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http::serve(http_store, http_addr, http_shutdown).await {
            error!(error = %e, "HTTP facade error");
        }
    });

    let accept_task = tokio::spawn(accept_loop(
        listener,
        Arc::clone(&store),
        Arc::clone(&stats),
        shutdown_rx,
    ));

    signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;
    info!("shutdown signal received, stopping server");

    let _ = shutdown_tx.send(true);
    expirer.stop();

    let drain = async {
        let _ = accept_task.await;
        let _ = http_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("shutdown drain timeout exceeded");
    }

    info!("server shutdown complete");
    Ok(())
}

/// Accepts connections until the shutdown signal flips, spawning one
/// handler task per client.
async fn accept_loop(
    listener: TcpListener,
    store: Arc<VersionedStore>,
    stats: Arc<ConnectionStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let dispatcher = CommandDispatcher::new(Arc::clone(&store));
                    let stats = Arc::clone(&stats);
                    tokio::spawn(handle_connection(stream, addr, dispatcher, stats));
                }
                Err(e) => error!(error = %e, "failed to accept connection"),
            },
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("acceptor stopped");
                    return;
                }
            }
        }
    }
}
