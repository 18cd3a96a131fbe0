//! # relink CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Run a local echo peer
//! relink echo -b 127.0.0.1:7000
//!
//! # Connect and type messages; each reply is printed
//! relink connect localhost -p 7000
//!
//! # Keep a connection alive with an empty message every 10 seconds
//! relink connect localhost -p 7000 --heartbeat 10 --read-timeout 5
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level), so
//! stdout only carries echoed messages.

use anyhow::Result;
use argh::FromArgs;
use relink_cli::console::{print_echo, ConsoleSource};
use relink_client::{Client, Heartbeat, Termination};
use relink_common::transport::EchoServer;
use relink_common::ClientConfig;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(FromArgs)]
/// relink - resilient multi-endpoint TCP echo client
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Connect(ConnectArgs),
    Echo(EchoArgs),
}

/// Arguments for connecting to a server.
///
/// Every address the host resolves to is tried in order until one
/// accepts. Settings given on the command line override the config file.
#[derive(FromArgs)]
#[argh(subcommand, name = "connect")]
/// connect to a server and exchange messages
struct ConnectArgs {
    /// host name or IP address of the server
    #[argh(positional)]
    host: String,

    /// server port
    #[argh(option, short = 'p', default = "7000")]
    port: u16,

    /// per-address connect timeout in seconds (default 60)
    #[argh(option, long = "connect-timeout")]
    connect_timeout_secs: Option<u64>,

    /// timeout in seconds for each reply (default: wait indefinitely)
    #[argh(option, long = "read-timeout")]
    read_timeout_secs: Option<u64>,

    /// timeout in seconds for each send (default: wait indefinitely)
    #[argh(option, long = "write-timeout")]
    write_timeout_secs: Option<u64>,

    /// send an empty heartbeat message every N seconds instead of reading stdin
    #[argh(option, long = "heartbeat")]
    heartbeat_secs: Option<u64>,

    /// do not send the newline probe after connecting
    #[argh(switch, long = "no-handshake")]
    no_handshake: bool,

    /// JSON file with client settings
    #[argh(option, short = 'c', long = "config")]
    config: Option<String>,
}

/// Arguments for the echo peer.
#[derive(FromArgs)]
#[argh(subcommand, name = "echo")]
/// run a framed echo server for local testing
struct EchoArgs {
    /// address to bind the echo server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:7000\".into()")]
    bind: String,
}

impl ConnectArgs {
    /// Builds the client config: file (or defaults), then flag overrides
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };

        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.read_timeout_secs {
            config = config.with_read_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.write_timeout_secs {
            config = config.with_write_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.heartbeat_secs {
            config = config.with_heartbeat_interval(Duration::from_secs(secs));
        }
        if self.no_handshake {
            config = config.with_handshake(false);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level is INFO; RUST_LOG overrides it
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Connect(args) => {
            let code = run_connect(args).await?;
            // The console source may still be blocked on stdin; do not wait for it
            std::process::exit(code);
        }
        Commands::Echo(args) => run_echo(args).await,
    }
}

/// Executes the `connect` subcommand and returns the process exit code.
async fn run_connect(args: ConnectArgs) -> Result<i32> {
    let config = args.client_config()?;
    let endpoints = relink_common::resolve(&args.host, args.port).await?;
    tracing::info!("Resolved {} to {}", args.host, endpoints);

    let client = if config.heartbeat_interval.is_some() {
        Client::new(config, Heartbeat, print_echo)?
    } else {
        let source = ConsoleSource::stdin(config.max_message_len);
        Client::new(config, source, print_echo)?
    };

    let handle = client.start(endpoints);
    let stopper = handle.stopper();

    let termination = tokio::select! {
        termination = handle.join() => termination,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping client");
            stopper.stop();
            Termination::Requested
        }
    };

    if termination.is_error() {
        tracing::error!("Session ended: {}", termination);
        Ok(1)
    } else {
        tracing::info!("Session ended: {}", termination);
        Ok(0)
    }
}

/// Executes the `echo` subcommand until Ctrl-C.
async fn run_echo(args: EchoArgs) -> Result<()> {
    let server = EchoServer::new(&args.bind).await?;
    tracing::info!("Echo server listening on {}", server.local_addr()?);

    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down echo server");
    shutdown.cancel();
    server_task.await??;

    Ok(())
}
