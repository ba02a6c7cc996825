use std::time::Duration;

use fleetota_protocol::UPDATE_AVAILABLE;
use fleetota_protocol::wire::write_control;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::NotifyError;

/// Result of notifying one node.
#[derive(Debug)]
pub struct NotifyOutcome {
    pub target: String,
    pub result: Result<(), NotifyError>,
}

async fn notify_one(target: &str, timeout: Duration) -> Result<(), NotifyError> {
    let send = async {
        let mut stream = TcpStream::connect(target).await?;
        write_control(&mut stream, UPDATE_AVAILABLE).await?;
        stream.shutdown().await?;
        Ok::<(), NotifyError>(())
    };
    tokio::time::timeout(timeout, send)
        .await
        .map_err(|_| NotifyError::Timeout)?
}

/// Tells every target that a new image is available.
///
/// Targets are contacted concurrently, each bounded by `timeout`. There is
/// no retry: a failed target is logged and reported, and does not affect
/// the others.
pub async fn notify_nodes(targets: &[String], timeout: Duration) -> Vec<NotifyOutcome> {
    let mut tasks = JoinSet::new();
    for target in targets {
        let target = target.clone();
        tasks.spawn(async move {
            let result = notify_one(&target, timeout).await;
            NotifyOutcome { target, result }
        });
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                match &outcome.result {
                    Ok(()) => info!(target = %outcome.target, "node notified"),
                    Err(e) => warn!(target = %outcome.target, "failed to notify node: {e}"),
                }
                outcomes.push(outcome);
            }
            Err(e) => warn!("notify task failed: {e}"),
        }
    }
    outcomes
}
