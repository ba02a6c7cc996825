//! Node orchestrator: wires the notification listener to the updater and
//! serves the local image to peers.

use std::sync::Arc;

use fleetota_data_channel::{ServePolicy, TransferSource};
use fleetota_notifier::NotificationListener;
use fleetota_transfer::{ImageFile, ImageStatus};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::updater::Updater;

/// Runs the node until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let peer_listener = TransferSource::bind(config.peer_port).await?;
    let notify_listener = NotificationListener::bind(config.notify_port).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, shutting down");
        }
        shutdown.cancel();
    });

    serve_node(
        &config,
        Arc::new(ImageStatus::new()),
        peer_listener,
        notify_listener,
        cancel,
    )
    .await
}

/// Runs the peer Source and the notification loop on already-bound
/// listeners until `cancel` fires.
///
/// Each notification spawns one update round; `status` is shared between
/// those rounds and the peer Source's serve policy.
pub async fn serve_node(
    config: &Config,
    status: Arc<ImageStatus>,
    peer_listener: TcpListener,
    notify_listener: TcpListener,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let updater = Arc::new(Updater::from_config(config, Arc::clone(&status)));

    // -- Peer source --
    let policy = if config.serve_unverified {
        ServePolicy::Always
    } else {
        ServePolicy::VerifiedOnly(Arc::clone(&status))
    };
    let source = TransferSource::new(
        ImageFile::new(&config.image_path),
        policy,
        config.session_config(),
        cancel.child_token(),
    );
    tokio::spawn(async move {
        if let Err(e) = source.run(peer_listener).await {
            tracing::error!("peer source error: {e}");
        }
    });

    // -- Notifications --
    let (notify_tx, mut notify_rx) = mpsc::channel(8);
    let listener = NotificationListener::new(cancel.child_token());
    tokio::spawn(async move {
        if let Err(e) = listener.run(notify_listener, notify_tx).await {
            tracing::error!("notification listener error: {e}");
        }
    });

    tracing::info!(name = %config.name, "node ready");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notified = notify_rx.recv() => {
                let Some(from) = notified else { break };
                tracing::info!(%from, "update available, downloading");
                let updater = Arc::clone(&updater);
                tokio::spawn(async move {
                    if let Err(e) = updater.update().await {
                        tracing::warn!("update failed: {e}");
                    }
                });
            }
        }
    }

    cancel.cancel();
    Ok(())
}

/// Runs a single update round without waiting for a notification.
pub async fn pull(config: Config) -> anyhow::Result<()> {
    let updater = Updater::from_config(&config, Arc::new(ImageStatus::new()));
    let report = updater.update().await?;
    tracing::info!(
        digest = %report.digest,
        resumed_from = report.resume_offset,
        bytes = report.bytes_transferred,
        "image up to date"
    );
    Ok(())
}
