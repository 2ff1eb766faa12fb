// Copyright 2025 MeshRPC Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # MeshRPC CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Export the echo service
//! meshrpc serve -b 127.0.0.1:20880
//!
//! # Export with a service configuration file
//! meshrpc serve --config service.json
//!
//! # Make an RPC call (outputs raw JSON)
//! meshrpc call 127.0.0.1:20880 add -a '[1, 2]'
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use meshrpc_cli::echo::{echo_provider, ECHO_INTERFACE};
use meshrpc_cluster::config::{load_json, ReferenceConfig, RegistryConfig, ServiceConfig};
use meshrpc_cluster::{Bootstrap, Extensions};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;

/// MeshRPC - cluster-aware RPC over TCP
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Exports the built-in echo service until interrupted.
///
/// Without `--config` the service is exported on `--bind` with a local
/// registry. With `--config`, the JSON file is a service configuration;
/// `--bind`, if given, overrides the address of every protocol in it.
///
/// # Example
///
/// ```bash
/// meshrpc serve -b 0.0.0.0:20880 --group blue
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// export the echo service
struct ServeArgs {
    /// address to bind to (default 127.0.0.1:20880)
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// path to a JSON service configuration
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// service group
    #[argh(option, short = 'g')]
    group: Option<String>,

    /// service version
    #[argh(option)]
    version: Option<String>,
}

/// Makes one call and prints the raw JSON result to stdout.
///
/// The provider at `address` is reached through a `direct` registry, so no
/// discovery backend is needed. Errors go to stderr with a non-zero exit
/// code.
///
/// # Examples
///
/// ```bash
/// meshrpc call 127.0.0.1:20880 echo -a '"hello"'
/// meshrpc call 127.0.0.1:20880 add -a '[1, 2, 3]' | jq .
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method on a provider
struct CallArgs {
    /// provider address (host:port)
    #[argh(positional)]
    address: String,

    /// name of the method to call
    #[argh(positional)]
    method: String,

    /// arguments as JSON: an array is passed as the argument list, any
    /// other value as the single argument (default `[]`)
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// interface to call (default the echo service)
    #[argh(option, short = 'i', default = "ECHO_INTERFACE.into()")]
    interface: String,

    /// call timeout in milliseconds
    #[argh(option, short = 't', default = "3000")]
    timeout: u64,

    /// path to a JSON reference configuration
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// service group
    #[argh(option, short = 'g')]
    group: Option<String>,

    /// service version
    #[argh(option)]
    version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps stdout clean for piping
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

fn parse_address(address: &str) -> Result<SocketAddr> {
    address
        .parse()
        .with_context(|| format!("Invalid address {}: expected host:port", address))
}

fn service_config(args: &ServeArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => load_json::<ServiceConfig>(Path::new(path))?,
        None => ServiceConfig::new(ECHO_INTERFACE),
    };
    if config.interface.is_empty() {
        config.interface = ECHO_INTERFACE.to_string();
    }
    if let Some(bind) = &args.bind {
        let addr = parse_address(bind)?;
        for protocol in &mut config.protocols {
            protocol.host = addr.ip().to_string();
            protocol.port = addr.port();
        }
    }
    if args.group.is_some() {
        config.group = args.group.clone();
    }
    if args.version.is_some() {
        config.version = args.version.clone();
    }
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = service_config(&args)?;
    let bootstrap = Bootstrap::new(Extensions::with_defaults());
    let exported = bootstrap.export(&echo_provider(), &config).await?;
    for url in exported.urls() {
        tracing::info!("Serving {} on {}", config.interface, url.host_port_string());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    bootstrap.unexport(exported).await;
    bootstrap.shutdown().await;
    Ok(())
}

fn reference_config(args: &CallArgs) -> Result<ReferenceConfig> {
    let mut config = match &args.config {
        Some(path) => load_json::<ReferenceConfig>(Path::new(path))?,
        None => ReferenceConfig::new(&args.interface),
    };
    if config.interface.is_empty() {
        config.interface = args.interface.clone();
    }
    parse_address(&args.address)?;
    config.registries = vec![RegistryConfig::direct(&args.address)];
    if config.timeout.is_none() {
        config.timeout = Some(args.timeout);
    }
    if args.group.is_some() {
        config.group = args.group.clone();
    }
    if args.version.is_some() {
        config.version = args.version.clone();
    }
    Ok(config)
}

fn call_arguments(raw: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(raw).with_context(|| format!("Invalid JSON in args: {}", raw))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Executes the `call` subcommand. No logging is installed for it.
async fn run_call(args: CallArgs) -> Result<()> {
    let arguments = call_arguments(&args.args)?;
    let config = reference_config(&args)?;

    let bootstrap = Bootstrap::new(Extensions::with_defaults());
    let stub = bootstrap.refer(&config).await?;
    let result = stub.call(&args.method, arguments).await;
    stub.destroy().await;

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}
