//! Operator console loops.
//!
//! Both loops end when the node reaches `Disconnected`. End of input does not
//! stop the node; the loop then just waits for disconnection.

use std::io;

use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use hellorpc::Address;
use hellorpc::ConnectionState;
use hellorpc::Rpc;

use crate::destinations::DestinationList;

pub const PROMPT: &str = "Send message to: ";
pub const INVALID_ADDRESS: &str = "Invalid address!";

fn is_disconnected(state: &ConnectionState) -> bool {
    *state == ConnectionState::Disconnected
}

async fn wait_disconnected(state: &mut watch::Receiver<ConnectionState>) {
    // a closed channel means the node is gone, which counts as disconnected
    let _ = state.wait_for(is_disconnected).await;
}

/// Reads one peer address per line and appends it to `destinations`.
///
/// Leading and trailing spaces and tabs are ignored. Unparseable lines print
/// `Invalid address!` and the prompt is shown again. An address `rpc` has no
/// route to is still added, with a warning.
pub async fn prompt_destinations<R, W>(
    input: R,
    mut output: W,
    rpc: &Rpc,
    destinations: &DestinationList,
    mut state: watch::Receiver<ConnectionState>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while !is_disconnected(&state.borrow()) {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = wait_disconnected(&mut state) => break,
        };

        let Some(line) = line else {
            wait_disconnected(&mut state).await;
            break;
        };

        match line.trim_matches([' ', '\t']).parse::<Address>() {
            Ok(address) => {
                if !rpc.has_route(&address) {
                    tracing::warn!(%address, "no route to destination, forwarding to it will fail");
                }
                destinations.push(address);
                tracing::info!(%address, total = destinations.len(), "destination added");
            }
            Err(e) => {
                tracing::debug!(input = %line, error = %e, "rejected destination");
                output.write_all(format!("{}\n\n", INVALID_ADDRESS).as_bytes()).await?;
            }
        }
    }

    Ok(())
}

/// Consumes input lines without acting on them until disconnection.
pub async fn idle_until_disconnected<R>(input: R, mut state: watch::Receiver<ConnectionState>) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while !is_disconnected(&state.borrow()) {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = wait_disconnected(&mut state) => break,
        };

        if line.is_none() {
            wait_disconnected(&mut state).await;
            break;
        }
    }

    Ok(())
}
