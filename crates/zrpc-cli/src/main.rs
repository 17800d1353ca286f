//! # zRPC CLI Entry Point
//!
//! Main binary for the zRPC runtime. Provides a command-line interface for
//! running a registry and making ad-hoc RPC calls.
//!
//! ## Usage
//!
//! ```bash
//! # Start a registry
//! zrpc registry -b 0.0.0.0:9090
//!
//! # Start a registry with a 30 second service expiry on a custom path
//! zrpc registry -b 0.0.0.0:9090 --timeout-secs 30 --path /registry
//!
//! # Make an RPC call (outputs raw JSON)
//! zrpc call tcp@127.0.0.1:9999 Arith.Mul '{"a": 2, "b": 3}'
//!
//! # The http protocol tunnels through an HTTP CONNECT endpoint
//! zrpc call http@127.0.0.1:9999 Arith.Mul '{"a": 2, "b": 3}'
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio::net::TcpListener;

use zrpc_client::x_dial;
use zrpc_common::protocol::DEFAULT_REGISTRY_PATH;
use zrpc_registry::{Registry, DEFAULT_TIMEOUT};

/// zRPC runtime utilities
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Registry(RegistryCmd),
    Call(CallCmd),
}

/// run a service registry
#[derive(FromArgs)]
#[argh(subcommand, name = "registry")]
struct RegistryCmd {
    /// address to bind to (default 0.0.0.0:9090)
    #[argh(option, short = 'b', default = "String::from(\"0.0.0.0:9090\")")]
    bind: String,

    /// seconds without a heartbeat before a server expires (default 300)
    #[argh(option)]
    timeout_secs: Option<u64>,

    /// path to mount the registry on (default /_zrpc_/registry)
    #[argh(option)]
    path: Option<String>,
}

/// make a single RPC call and print the raw JSON reply
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
struct CallCmd {
    /// server address as protocol@host:port, e.g. tcp@127.0.0.1:9999
    #[argh(positional)]
    addr: String,

    /// method to invoke, e.g. Arith.Mul
    #[argh(positional)]
    service_method: String,

    /// JSON argument value (default null)
    #[argh(positional)]
    args: Option<String>,

    /// per-call deadline in milliseconds
    #[argh(option)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli: Cli = argh::from_env();
    match cli.command {
        Commands::Registry(cmd) => run_registry(cmd).await,
        Commands::Call(cmd) => run_call(cmd).await,
    }
}

async fn run_registry(cmd: RegistryCmd) -> Result<()> {
    let timeout = cmd
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);
    let path = cmd.path.as_deref().unwrap_or(DEFAULT_REGISTRY_PATH);

    let registry = Arc::new(Registry::new(timeout));
    let listener = TcpListener::bind(&cmd.bind)
        .await
        .with_context(|| format!("failed to bind to {}", cmd.bind))?;

    zrpc_registry::registry::serve_at(registry, listener, path)
        .await
        .context("registry server failed")?;
    Ok(())
}

async fn run_call(cmd: CallCmd) -> Result<()> {
    let args: serde_json::Value = match &cmd.args {
        Some(raw) => serde_json::from_str(raw).context("invalid JSON argument")?,
        None => serde_json::Value::Null,
    };

    let client = x_dial(&cmd.addr, None)
        .await
        .with_context(|| format!("failed to dial {}", cmd.addr))?;

    let reply: serde_json::Value = match cmd.timeout_ms {
        Some(ms) => {
            client
                .call_timeout(&cmd.service_method, &args, Duration::from_millis(ms))
                .await?
        }
        None => client.call(&cmd.service_method, &args).await?,
    };

    println!("{reply}");
    let _ = client.close().await;
    Ok(())
}
