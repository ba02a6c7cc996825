//! Transfer Source (distributor and peer side).
//!
//! Accepts connections, announces the local image's digest and size, and
//! streams whatever the Initiator is missing. One task per connection;
//! sessions share nothing but the read-only image path.

use std::net::SocketAddr;
use std::sync::Arc;

use fleetota_protocol::{ACK_METADATA, Hello, MetadataReply, REQUEST_UPDATE};
use fleetota_transfer::{ImageFile, ImageStatus, send_from};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::{DataChannelError, SessionConfig};

/// Whether a Source may hand out its local image.
#[derive(Debug, Clone)]
pub enum ServePolicy {
    /// Serve whatever is on disk (the distributor's published image).
    Always,
    /// Serve only an image whose current digest matches the last verified one.
    VerifiedOnly(Arc<ImageStatus>),
}

impl ServePolicy {
    fn permits(&self, current: &fleetota_protocol::ImageDigest) -> bool {
        match self {
            ServePolicy::Always => true,
            ServePolicy::VerifiedOnly(status) => status.verified_digest().as_ref() == Some(current),
        }
    }
}

/// Outcome of one served session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeReport {
    pub resume_offset: u64,
    pub bytes_sent: u64,
    pub image_size: u64,
    pub peer_variant: bool,
}

/// Serves the local image to any number of concurrent Initiators.
pub struct TransferSource {
    image: ImageFile,
    policy: ServePolicy,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl TransferSource {
    pub fn new(
        image: ImageFile,
        policy: ServePolicy,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            image,
            policy,
            config,
            cancel,
        })
    }

    /// Binds `0.0.0.0:port` (0 = OS-assigned).
    pub async fn bind(port: u16) -> Result<TcpListener, DataChannelError> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "transfer source listener bound");
        Ok(listener)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Accepts connections until cancelled, spawning one task per session.
    pub async fn run(self: &Arc<Self>, listener: TcpListener) -> Result<(), DataChannelError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("transfer source shutting down");
                    return Ok(());
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!(%peer_addr, "transfer connection accepted");
                            let source = Arc::clone(self);
                            tokio::spawn(async move {
                                tokio::select! {
                                    _ = source.cancel.cancelled() => {
                                        debug!(%peer_addr, "session dropped on shutdown");
                                    }
                                    result = source.serve(stream) => match result {
                                        Ok(report) => info!(
                                            %peer_addr,
                                            resume_offset = report.resume_offset,
                                            bytes_sent = report.bytes_sent,
                                            "image served"
                                        ),
                                        Err(e) => warn!(%peer_addr, "session failed: {e}"),
                                    }
                                }
                            });
                        }
                        Err(e) => warn!("accept error: {e}"),
                    }
                }
            }
        }
    }

    /// Runs the Source half of one session over `stream`.
    pub async fn serve<S>(&self, stream: S) -> Result<ServeReport, DataChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let opts = self.config.stream;
        let mut conn = Connection::new(stream, opts.io_timeout);

        let hello = conn.recv_hello().await?;
        let resume_offset = hello.resume_offset();
        if let Hello::Peer { digest, received } = hello {
            debug!(%digest, received, "peer hello");
        } else {
            debug!(resume_offset, "resume hello");
        }

        let meta = self.image.describe().await?;
        if !self.policy.permits(&meta.digest) {
            info!(digest = %meta.digest, "refusing to serve unverified image");
            conn.send_metadata(&MetadataReply::Unavailable).await?;
            conn.finish().await?;
            return Err(DataChannelError::SourceUnavailable);
        }
        conn.send_metadata(&MetadataReply::Available(meta)).await?;

        conn.expect_token(ACK_METADATA).await?;
        if hello.is_peer() {
            conn.expect_token(REQUEST_UPDATE).await?;
        }

        // Cap at the announced size so a file still growing on disk never
        // sends more than the Initiator was told about.
        let file = self.image.open_at(resume_offset).await?;
        let mut body = file.take(meta.size.saturating_sub(resume_offset));
        let bytes_sent = send_from(&mut body, conn.stream_mut(), &opts).await?;
        conn.finish().await?;

        Ok(ServeReport {
            resume_offset,
            bytes_sent,
            image_size: meta.size,
            peer_variant: hello.is_peer(),
        })
    }
}
