//! Transfer Initiator (receiving node side).
//!
//! Derives the resume offset from the local file, negotiates with a
//! Source, appends the missing bytes and verifies the result.

use fleetota_protocol::{ACK_METADATA, Hello, ImageDigest, MetadataReply, REQUEST_UPDATE};
use fleetota_transfer::{ImageFile, TransferSession, WriterRegistry, digest_bytes, receive_into};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::{DataChannelError, SessionConfig};

/// Which hello form to open the session with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Bare offset hello.
    Distributor,
    /// `digest:received` hello followed by `REQUEST_UPDATE`.
    Peer,
}

/// How to treat bytes already present locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeMode {
    /// Resume from the current local file size.
    #[default]
    Continue,
    /// Ask for everything and overwrite the local file.
    Restart,
}

/// Outcome of a verified transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub resume_offset: u64,
    pub bytes_transferred: u64,
    pub image_size: u64,
    pub digest: ImageDigest,
}

/// Pulls the image into a local file from Sources.
pub struct Initiator {
    image: ImageFile,
    config: SessionConfig,
    writers: WriterRegistry,
}

impl Initiator {
    pub fn new(image: ImageFile, config: SessionConfig) -> Self {
        Self {
            image,
            config,
            writers: WriterRegistry::new(),
        }
    }

    /// Shares a writer registry with other Initiators in the process.
    pub fn with_writers(mut self, writers: WriterRegistry) -> Self {
        self.writers = writers;
        self
    }

    pub fn image(&self) -> &ImageFile {
        &self.image
    }

    /// Connects to `addr` and runs one session.
    pub async fn fetch(
        &self,
        addr: &str,
        kind: SourceKind,
        mode: ResumeMode,
    ) -> Result<TransferReport, DataChannelError> {
        let stream =
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(s)) => {
                    info!(%addr, ?kind, "connected to transfer source");
                    s
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(DataChannelError::Timeout),
            };
        self.run(stream, kind, mode).await
    }

    /// Runs the Initiator half of one session over `stream`.
    ///
    /// On `ChecksumMismatch` the local file is left in place, unverified.
    pub async fn run<S>(
        &self,
        stream: S,
        kind: SourceKind,
        mode: ResumeMode,
    ) -> Result<TransferReport, DataChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let _writer = self
            .writers
            .try_acquire(self.image.path())
            .ok_or_else(|| DataChannelError::FileBusy(self.image.path().to_path_buf()))?;

        let resume_offset = match mode {
            ResumeMode::Continue => self.image.size().await?,
            ResumeMode::Restart => 0,
        };

        let hello = match kind {
            SourceKind::Distributor => Hello::Resume {
                offset: resume_offset,
            },
            SourceKind::Peer => Hello::Peer {
                digest: self.local_digest(resume_offset).await?,
                received: resume_offset,
            },
        };

        let opts = self.config.stream;
        let mut conn = Connection::new(stream, opts.io_timeout);
        conn.send_hello(&hello).await?;

        let meta = match conn.recv_metadata().await? {
            MetadataReply::Available(meta) => meta,
            MetadataReply::Unavailable => return Err(DataChannelError::SourceUnavailable),
        };
        info!(
            digest = %meta.digest,
            size = meta.size,
            resume_offset,
            "image metadata received"
        );

        conn.send_control(ACK_METADATA).await?;
        if kind == SourceKind::Peer {
            conn.send_control(REQUEST_UPDATE).await?;
        }

        let mut session = TransferSession::new(resume_offset, meta);
        if session.needs_write() {
            let mut file = self.image.open_for_receive(resume_offset).await?;
            if let Err(e) = receive_into(conn.stream_mut(), &mut file, &mut session, &opts).await {
                warn!(
                    retained = session.local_size(),
                    "transfer aborted, partial image kept: {e}"
                );
                return Err(e.into());
            }
        } else {
            debug!(resume_offset, "local copy already holds the declared size");
        }

        if !session.is_complete() {
            warn!(
                received = session.local_size(),
                declared = session.declared_size(),
                "source closed before the declared size"
            );
        }

        let digest = match self.image.verify(session.declared_digest()).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!("image left unverified: {e}");
                return Err(e.into());
            }
        };

        info!(
            %digest,
            bytes = session.bytes_transferred(),
            "image verified"
        );

        Ok(TransferReport {
            resume_offset,
            bytes_transferred: session.bytes_transferred(),
            image_size: session.declared_size(),
            digest,
        })
    }

    async fn local_digest(&self, resume_offset: u64) -> Result<ImageDigest, DataChannelError> {
        if resume_offset == 0 {
            return Ok(digest_bytes(b""));
        }
        Ok(self.image.digest().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;

    use fleetota_protocol::Metadata;
    use fleetota_protocol::wire::{read_control, read_hello, write_metadata_reply};
    use fleetota_transfer::ImageStatus;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    use crate::server::{ServePolicy, TransferSource};

    const IMAGE_SIZE: usize = 500_000;

    fn firmware(size: usize, seed: u32) -> Vec<u8> {
        (0..size as u32)
            .map(|i| (i.wrapping_mul(2_654_435_761).wrapping_add(seed) >> 13) as u8)
            .collect()
    }

    fn initiator(path: &Path) -> Initiator {
        Initiator::new(ImageFile::new(path), SessionConfig::default())
    }

    /// Spawns a real Source on loopback serving `data`.
    async fn start_source(
        dir: &Path,
        data: &[u8],
        policy: ServePolicy,
    ) -> (String, CancellationToken) {
        let path = dir.join("source.bin");
        std::fs::write(&path, data).unwrap();

        let cancel = CancellationToken::new();
        let source = TransferSource::new(
            ImageFile::new(path),
            policy,
            SessionConfig::default(),
            cancel.clone(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move { source.run(listener).await });
        (addr, cancel)
    }

    /// A Source that announces the full image but hangs up after `cut` bytes.
    async fn start_truncating_source(data: Vec<u8>, cut: usize) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let offset = read_hello(&mut stream).await.unwrap().resume_offset() as usize;
            let meta = Metadata {
                digest: digest_bytes(&data),
                size: data.len() as u64,
            };
            write_metadata_reply(&mut stream, &MetadataReply::Available(meta))
                .await
                .unwrap();
            assert_eq!(read_control(&mut stream).await.unwrap(), ACK_METADATA);
            let end = cut.max(offset).min(data.len());
            stream.write_all(&data[offset..end]).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fresh_download() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(IMAGE_SIZE, 1);
        let (addr, cancel) = start_source(src_dir.path(), &data, ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        let report = initiator(&local)
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await
            .unwrap();

        assert_eq!(report.resume_offset, 0);
        assert_eq!(report.bytes_transferred, IMAGE_SIZE as u64);
        assert_eq!(report.image_size, IMAGE_SIZE as u64);
        assert_eq!(report.digest, digest_bytes(&data));
        assert_eq!(std::fs::read(&local).unwrap(), data);
        cancel.cancel();
    }

    #[tokio::test]
    async fn resume_from_matching_prefix() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(IMAGE_SIZE, 2);
        let (addr, cancel) = start_source(src_dir.path(), &data, ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        std::fs::write(&local, &data[..200_000]).unwrap();

        let report = initiator(&local)
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await
            .unwrap();

        assert_eq!(report.resume_offset, 200_000);
        assert_eq!(report.bytes_transferred, 300_000);
        assert_eq!(std::fs::read(&local).unwrap(), data);
        cancel.cancel();
    }

    #[tokio::test]
    async fn interrupted_then_resumed_at_any_split() {
        let data = firmware(100_000, 3);

        for cut in [0, 1, 4_095, 65_536, 99_999, 100_000] {
            let src_dir = TempDir::new().unwrap();
            let dst_dir = TempDir::new().unwrap();
            let local = dst_dir.path().join("car_firmware.bin");
            let init = initiator(&local);

            let flaky = start_truncating_source(data.clone(), cut).await;
            let first = init
                .fetch(
                    &flaky.to_string(),
                    SourceKind::Distributor,
                    ResumeMode::Continue,
                )
                .await;
            if cut < data.len() {
                assert!(
                    matches!(first, Err(DataChannelError::ChecksumMismatch { .. })),
                    "cut {cut}: {first:?}"
                );
            } else {
                first.unwrap();
            }
            assert_eq!(std::fs::read(&local).unwrap(), &data[..cut]);

            let (addr, cancel) = start_source(src_dir.path(), &data, ServePolicy::Always).await;
            let second = init
                .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
                .await
                .unwrap();
            assert_eq!(second.resume_offset, cut as u64);
            assert_eq!(second.bytes_transferred, (data.len() - cut) as u64);
            assert_eq!(std::fs::read(&local).unwrap(), data);
            cancel.cancel();
        }
    }

    #[tokio::test]
    async fn already_complete_streams_nothing() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(10_000, 4);
        let (addr, cancel) = start_source(src_dir.path(), &data, ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        std::fs::write(&local, &data).unwrap();

        let init = initiator(&local);
        for _ in 0..2 {
            let report = init
                .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
                .await
                .unwrap();
            assert_eq!(report.bytes_transferred, 0);
            assert_eq!(report.digest, digest_bytes(&data));
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn offset_beyond_size_leaves_file_untouched() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(10_000, 5);
        let (addr, cancel) = start_source(src_dir.path(), &data, ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        let mut oversized = data.clone();
        oversized.extend_from_slice(b"trailing junk");
        std::fs::write(&local, &oversized).unwrap();

        let result = initiator(&local)
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await;
        assert!(matches!(
            result,
            Err(DataChannelError::ChecksumMismatch { .. })
        ));
        assert_eq!(std::fs::read(&local).unwrap(), oversized);
        cancel.cancel();
    }

    #[tokio::test]
    async fn restart_overwrites_stale_image() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let old = firmware(IMAGE_SIZE, 6);
        let new = firmware(300_000, 7);
        let (addr, cancel) = start_source(src_dir.path(), &new, ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        std::fs::write(&local, &old).unwrap();
        let init = initiator(&local);

        let resumed = init
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await;
        assert!(matches!(
            resumed,
            Err(DataChannelError::ChecksumMismatch { .. })
        ));

        let report = init
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Restart)
            .await
            .unwrap();
        assert_eq!(report.resume_offset, 0);
        assert_eq!(std::fs::read(&local).unwrap(), new);
        cancel.cancel();
    }

    #[tokio::test]
    async fn fresh_empty_image_creates_file() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let (addr, cancel) = start_source(src_dir.path(), &[], ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        let report = initiator(&local)
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await
            .unwrap();

        assert_eq!(report.image_size, 0);
        assert_eq!(report.bytes_transferred, 0);
        assert_eq!(report.digest, digest_bytes(&[]));
        assert_eq!(std::fs::read(&local).unwrap(), b"");
        cancel.cancel();
    }

    #[tokio::test]
    async fn restart_to_empty_image_truncates_stale_bytes() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let (addr, cancel) = start_source(src_dir.path(), &[], ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        std::fs::write(&local, b"stale").unwrap();

        let report = initiator(&local)
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Restart)
            .await
            .unwrap();

        assert_eq!(report.resume_offset, 0);
        assert_eq!(report.digest, digest_bytes(&[]));
        assert_eq!(std::fs::read(&local).unwrap(), b"");
        cancel.cancel();
    }

    #[tokio::test]
    async fn corrupted_prefix_is_detected() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(IMAGE_SIZE, 8);
        let (addr, cancel) = start_source(src_dir.path(), &data, ServePolicy::Always).await;

        let local = dst_dir.path().join("car_firmware.bin");
        let mut prefix = data[..200_000].to_vec();
        prefix[123_456] ^= 0x80;
        std::fs::write(&local, &prefix).unwrap();

        let result = initiator(&local)
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await;
        match result {
            Err(DataChannelError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, digest_bytes(&data));
                assert_ne!(actual, expected);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
        // Kept for inspection, not deleted.
        assert_eq!(std::fs::metadata(&local).unwrap().len(), IMAGE_SIZE as u64);
        cancel.cancel();
    }

    #[tokio::test]
    async fn peer_transfer_from_verified_node() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(IMAGE_SIZE, 9);

        let status = Arc::new(ImageStatus::new());
        status.mark_verified(digest_bytes(&data));
        let (addr, cancel) = start_source(
            src_dir.path(),
            &data,
            ServePolicy::VerifiedOnly(Arc::clone(&status)),
        )
        .await;

        let local = dst_dir.path().join("car_firmware.bin");
        std::fs::write(&local, &data[..1_000]).unwrap();

        let report = initiator(&local)
            .fetch(&addr, SourceKind::Peer, ResumeMode::Continue)
            .await
            .unwrap();
        assert_eq!(report.resume_offset, 1_000);
        assert_eq!(std::fs::read(&local).unwrap(), data);
        cancel.cancel();
    }

    #[tokio::test]
    async fn unverified_peer_is_unavailable() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let data = firmware(1_000, 10);
        let (addr, cancel) = start_source(
            src_dir.path(),
            &data,
            ServePolicy::VerifiedOnly(Arc::new(ImageStatus::new())),
        )
        .await;

        let local = dst_dir.path().join("car_firmware.bin");
        let result = initiator(&local)
            .fetch(&addr, SourceKind::Peer, ResumeMode::Continue)
            .await;
        assert!(matches!(result, Err(DataChannelError::SourceUnavailable)));
        assert!(!local.exists());
        cancel.cancel();
    }

    #[tokio::test]
    async fn concurrent_writer_is_rejected() {
        let dst_dir = TempDir::new().unwrap();
        let local = dst_dir.path().join("car_firmware.bin");
        let writers = WriterRegistry::new();
        let _held = writers.try_acquire(&local).unwrap();

        let init = initiator(&local).with_writers(writers.clone());
        let (client, _server) = tokio::io::duplex(1024);
        let result = init
            .run(client, SourceKind::Distributor, ResumeMode::Continue)
            .await;
        assert!(matches!(result, Err(DataChannelError::FileBusy(_))));
    }

    #[tokio::test]
    async fn unreachable_source_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let dst_dir = TempDir::new().unwrap();
        let result = initiator(&dst_dir.path().join("fw.bin"))
            .fetch(&addr, SourceKind::Distributor, ResumeMode::Continue)
            .await;
        assert!(matches!(result, Err(DataChannelError::Connection(_))));
    }
}
