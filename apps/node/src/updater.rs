//! Drives update sessions against the distributor and peers.

use std::sync::Arc;

use fleetota_data_channel::{
    DataChannelError, Initiator, ResumeMode, SourceKind, TransferReport,
};
use fleetota_transfer::{ImageFile, ImageStatus};

/// Tries each known Source in turn until one yields a verified image.
pub struct Updater {
    initiator: Initiator,
    status: Arc<ImageStatus>,
    sources: Vec<(String, SourceKind)>,
}

impl Updater {
    pub fn new(
        initiator: Initiator,
        status: Arc<ImageStatus>,
        distributor: &str,
        peers: &[String],
    ) -> Self {
        let sources = std::iter::once((distributor.to_string(), SourceKind::Distributor))
            .chain(peers.iter().map(|p| (p.clone(), SourceKind::Peer)))
            .collect();
        Self {
            initiator,
            status,
            sources,
        }
    }

    pub fn from_config(config: &crate::config::Config, status: Arc<ImageStatus>) -> Self {
        let initiator = Initiator::new(
            ImageFile::new(&config.image_path),
            config.session_config(),
        );
        Self::new(initiator, status, &config.distributor, &config.peers)
    }

    /// Runs one update round.
    ///
    /// The image is marked unverified for the duration and verified again
    /// only by a successful session, or by re-checking it against the
    /// previous digest if every Source failed. A busy destination ends the
    /// round at once; any other failure moves on to the next Source.
    pub async fn update(&self) -> Result<TransferReport, DataChannelError> {
        let previous = self.status.verified_digest();
        self.status.mark_unverified();

        let mut last_err = None;
        for (addr, kind) in &self.sources {
            match self.fetch_from(addr, *kind).await {
                Ok(report) => {
                    self.status.mark_verified(report.digest);
                    tracing::info!(
                        source = %addr,
                        digest = %report.digest,
                        size = report.image_size,
                        "firmware update successful"
                    );
                    return Ok(report);
                }
                Err(e @ DataChannelError::FileBusy(_)) => {
                    tracing::info!("update already in progress, skipping");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(source = %addr, ?kind, "update from source failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        if let Some(previous) = previous {
            if self.initiator.image().verify(&previous).await.is_ok() {
                tracing::info!(digest = %previous, "keeping previously verified image");
                self.status.mark_verified(previous);
            }
        }

        Err(last_err.unwrap_or(DataChannelError::SourceUnavailable))
    }

    /// One Source: resume first; if a resumed image fails verification the
    /// local prefix is suspect, so fetch it again from scratch.
    async fn fetch_from(
        &self,
        addr: &str,
        kind: SourceKind,
    ) -> Result<TransferReport, DataChannelError> {
        let held = self.initiator.image().size().await?;
        match self.initiator.fetch(addr, kind, ResumeMode::Continue).await {
            Err(DataChannelError::ChecksumMismatch { .. }) if held > 0 => {
                tracing::warn!(
                    source = %addr,
                    held,
                    "resumed image failed verification, restarting from zero"
                );
                self.initiator.fetch(addr, kind, ResumeMode::Restart).await
            }
            other => other,
        }
    }
}
