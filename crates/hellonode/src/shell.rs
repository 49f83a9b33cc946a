//! # Process Shell
//!
//! Everything around the handlers: argument checking, configuration, logging,
//! starting and stopping the network service, and the console loop.
//!
//! ## Exit behaviour
//!
//! - Missing argument or missing file: `First argument must be a node config`, exit 1.
//! - Unparseable configuration: `Invalid node config file: <reason>`, exit 1.
//! - Normal shutdown (Ctrl-C): services stop, `Exiting...` is printed, exit 0.

use std::ffi::OsString;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use hellorpc::DispatchError;
use hellorpc::Node;
use hellorpc::Rpc;
use hellorpc::transport::tcp;

use crate::DATA_PREFIX;
use crate::SERVICE_PREFIX;
use crate::config::ConfigError;
use crate::config::NodeConfig;
use crate::console;
use crate::destinations::DestinationList;
use crate::echo::EchoHandler;
use crate::forward::ForwardingHandler;
use crate::reflected::HelloReflect;

pub const USAGE_MESSAGE: &str = "First argument must be a node config";

/// Which of the illustrative programs to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// `HwRpc.*` answered directly with the first argument.
    Echo,
    /// `HwRpc.*` forwarded to operator-entered destinations; `HW.*` echoed.
    Forward,
    /// `HwRpc.*` resolved by method name on a reflected object.
    Reflect,
}

#[derive(Debug, Parser)]
#[command(about = "Runs an overlay node that answers HwRpc calls")]
pub struct NodeArgs {
    /// Path to the node configuration file.
    pub config: Option<PathBuf>,
}

/// Why the process could not start.
#[derive(Debug)]
pub enum StartupError {
    /// No usable configuration path was given.
    Usage,
    /// The configuration could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage => write!(f, "{}", USAGE_MESSAGE),
            Self::Config(e) => write!(f, "Invalid node config file: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Missing(_) => Self::Usage,
            other => Self::Config(other),
        }
    }
}

/// Resolves the configuration from command-line arguments (program name first).
pub fn load_config<I, T>(args: I) -> Result<NodeConfig, StartupError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = NodeArgs::try_parse_from(args).map_err(|_| StartupError::Usage)?;
    let path = args.config.ok_or(StartupError::Usage)?;
    Ok(NodeConfig::load(path)?)
}

/// Installs `RUST_LOG`-filtered logging, `info` by default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second install (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Registers the handlers for `variant`.
///
/// Returns the destination list when the variant forwards.
pub fn install_handlers(rpc: &Rpc, variant: Variant) -> Result<Option<DestinationList>, DispatchError> {
    match variant {
        Variant::Echo => {
            rpc.add_handler(SERVICE_PREFIX, Arc::new(EchoHandler))?;
            Ok(None)
        }
        Variant::Forward => {
            let destinations = DestinationList::new();
            rpc.add_handler(SERVICE_PREFIX, Arc::new(ForwardingHandler::new(destinations.clone())))?;
            rpc.add_handler(DATA_PREFIX, Arc::new(EchoHandler))?;
            Ok(Some(destinations))
        }
        Variant::Reflect => {
            rpc.add_object(SERVICE_PREFIX, Arc::new(HelloReflect::new()))?;
            Ok(None)
        }
    }
}

/// A node wired to the TCP transport, plus its listener task.
pub struct Shell {
    config: NodeConfig,
    node: Arc<Node>,
    server: Option<JoinHandle<()>>,
}

impl Shell {
    /// Builds the node described by `config`. Nothing touches the network yet.
    pub fn create(config: NodeConfig) -> Self {
        let address = config.address_or_random();

        let transport = config.tcp_transport(address);
        let rpc = Arc::new(Rpc::with_timeout(address, Arc::new(transport), config.rpc_timeout()));
        let node = Arc::new(Node::new(rpc));

        Self { config, node, server: None }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Binds the listen address and starts answering calls.
    pub async fn start_services(&mut self) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("cannot listen on {}", self.config.listen))?;
        let local = listener.local_addr()?;

        let rpc = self.node.rpc().clone();
        self.server = Some(tokio::spawn(async move {
            if let Err(e) = tcp::serve(listener, rpc).await {
                tracing::error!(error = %e, "listener stopped");
            }
        }));

        tracing::info!(listen = %local, "services started");
        Ok(local)
    }

    pub fn stop_services(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
            tracing::info!("services stopped");
        }
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        self.stop_services();
    }
}

/// Runs `variant` until the node disconnects.
pub async fn run(variant: Variant, config: NodeConfig) -> anyhow::Result<()> {
    let mut shell = Shell::create(config);
    shell.start_services().await?;

    let node = shell.node().clone();
    let destinations = install_handlers(node.rpc(), variant)?;

    node.connect();
    println!("Your address is: {}\n", node.address());

    let on_interrupt = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.disconnect();
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    match destinations {
        Some(destinations) => {
            console::prompt_destinations(stdin, tokio::io::stdout(), node.rpc(), &destinations, node.subscribe()).await?
        }
        None => console::idle_until_disconnected(stdin, node.subscribe()).await?,
    }

    shell.stop_services();
    Ok(())
}

/// Process entry point shared by the node binaries.
pub async fn main(variant: Variant) -> ExitCode {
    let config = match load_config(std::env::args_os()) {
        Ok(config) => config,
        Err(e) => {
            println!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging();

    if let Err(e) = run(variant, config).await {
        tracing::error!(error = %e, "node failed");
        println!("{:#}", e);
        return ExitCode::FAILURE;
    }

    println!("Exiting...");
    ExitCode::SUCCESS
}
