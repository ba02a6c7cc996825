use std::sync::Arc;

use fleetota_data_channel::{ServePolicy, TransferSource};
use fleetota_notifier::notify_nodes;
use fleetota_transfer::ImageFile;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Publishes the configured image: serves it on `listen_port`, notifies
/// every configured node, then runs until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let image = ImageFile::new(&config.image_path);
    if !image.exists().await? {
        anyhow::bail!(
            "firmware image {} not found (create one with `generate`)",
            config.image_path.display()
        );
    }
    let metadata = image.describe().await?;
    tracing::info!(
        path = %config.image_path.display(),
        digest = %metadata.digest,
        size = metadata.size,
        "publishing firmware image"
    );

    let source = TransferSource::new(
        image,
        ServePolicy::Always,
        config.session_config(),
        CancellationToken::new(),
    );
    let listener = TransferSource::bind(config.listen_port).await?;
    let source_run = Arc::clone(&source);
    let server = tokio::spawn(async move { source_run.run(listener).await });

    notify(&config).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, shutting down");
    source.shutdown();
    server.await??;
    Ok(())
}

/// Sends `UPDATE_AVAILABLE` to every configured node.
///
/// Returns the number of nodes that were reached.
pub async fn notify(config: &Config) -> usize {
    if config.nodes.is_empty() {
        tracing::info!("no nodes configured, skipping notification");
        return 0;
    }
    let outcomes = notify_nodes(&config.nodes, config.notify_timeout()).await;
    let reached = outcomes.iter().filter(|o| o.result.is_ok()).count();
    tracing::info!(reached, total = outcomes.len(), "notification round finished");
    reached
}
