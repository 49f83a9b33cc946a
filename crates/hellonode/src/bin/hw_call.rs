//! Sends one `HwRpc` call and prints the reply.
//!
//! ```text
//! hw-call node.json node:<hex> "hello"
//! hw-call node.json node:<hex> "hello" --method HW.Test
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use hellonode::client;
use hellonode::config::NodeConfig;
use hellonode::shell;
use hellorpc::Address;

#[derive(Debug, Parser)]
#[command(about = "Sends one call to an overlay node and prints the reply")]
struct Args {
    /// Node config whose peers are used as routes.
    config: PathBuf,

    /// Destination node, `node:<hex>`.
    dest: Address,

    /// Payload sent as the single byte argument.
    payload: String,

    /// Fully qualified method name.
    #[arg(long, default_value = "HwRpc.Test")]
    method: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match NodeConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            println!("Invalid node config file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    shell::init_logging();

    let rpc = client::outbound_rpc(&config);
    match client::call_once(&rpc, args.dest, &args.method, args.payload.as_bytes()).await {
        Ok(value) => {
            println!("{}", client::render(&value));
            ExitCode::SUCCESS
        }
        Err(reason) => {
            println!("call failed: {}", reason);
            ExitCode::FAILURE
        }
    }
}
