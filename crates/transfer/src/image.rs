use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use fleetota_protocol::{ImageDigest, Metadata};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncSeekExt;

use crate::TransferError;

/// The single local image file a node or distributor works on.
///
/// Partial downloads live at the same path; the file's current length is
/// the resume offset for the next session.
#[derive(Debug, Clone)]
pub struct ImageFile {
    path: PathBuf,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool, TransferError> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }

    /// Current length in bytes, or 0 if the file does not exist.
    pub async fn size(&self) -> Result<u64, TransferError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens the file as a receive target.
    ///
    /// A non-zero `resume_offset` appends to what is already there; zero
    /// truncates any stale content and starts fresh.
    pub async fn open_for_receive(&self, resume_offset: u64) -> Result<File, TransferError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut options = OpenOptions::new();
        if resume_offset > 0 {
            options.create(true).append(true);
        } else {
            options.create(true).write(true).truncate(true);
        }
        Ok(options.open(&self.path).await?)
    }

    /// Opens the file for reading, positioned at `offset`.
    ///
    /// An offset past the end is allowed; reads then return EOF immediately.
    pub async fn open_at(&self, offset: u64) -> Result<File, TransferError> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(file)
    }

    pub async fn digest(&self) -> Result<ImageDigest, TransferError> {
        crate::digest_file(&self.path).await
    }

    /// Digest and size, as announced to Initiators.
    pub async fn describe(&self) -> Result<Metadata, TransferError> {
        crate::describe_file(&self.path).await
    }

    pub async fn verify(&self, expected: &ImageDigest) -> Result<ImageDigest, TransferError> {
        crate::verify_file(&self.path, expected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn missing_file_has_zero_size() {
        let dir = TempDir::new().unwrap();
        let image = ImageFile::new(dir.path().join("firmware.bin"));
        assert!(!image.exists().await.unwrap());
        assert_eq!(image.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resume_appends() {
        let dir = TempDir::new().unwrap();
        let image = ImageFile::new(dir.path().join("firmware.bin"));
        std::fs::write(image.path(), b"HEAD").unwrap();

        let mut file = image.open_for_receive(4).await.unwrap();
        file.write_all(b"TAIL").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(image.path()).unwrap(), b"HEADTAIL");
        assert_eq!(image.size().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn zero_offset_truncates_stale_content() {
        let dir = TempDir::new().unwrap();
        let image = ImageFile::new(dir.path().join("firmware.bin"));
        std::fs::write(image.path(), b"stale firmware bytes").unwrap();

        let mut file = image.open_for_receive(0).await.unwrap();
        file.write_all(b"new").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(image.path()).unwrap(), b"new");
    }

    #[tokio::test]
    async fn receive_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let image = ImageFile::new(dir.path().join("ota/slot_a/firmware.bin"));
        drop(image.open_for_receive(0).await.unwrap());
        assert!(image.exists().await.unwrap());
    }

    #[tokio::test]
    async fn open_at_reads_from_offset() {
        let dir = TempDir::new().unwrap();
        let image = ImageFile::new(dir.path().join("firmware.bin"));
        std::fs::write(image.path(), b"0123456789").unwrap();

        let mut tail = Vec::new();
        image
            .open_at(6)
            .await
            .unwrap()
            .read_to_end(&mut tail)
            .await
            .unwrap();
        assert_eq!(tail, b"6789");

        let mut past_end = Vec::new();
        image
            .open_at(50)
            .await
            .unwrap()
            .read_to_end(&mut past_end)
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn describe_reports_digest_and_size() {
        let dir = TempDir::new().unwrap();
        let image = ImageFile::new(dir.path().join("firmware.bin"));
        std::fs::write(image.path(), b"firmware").unwrap();

        let meta = image.describe().await.unwrap();
        assert_eq!(meta.size, 8);
        assert_eq!(meta.digest, crate::digest_bytes(b"firmware"));
        assert_eq!(image.verify(&meta.digest).await.unwrap(), meta.digest);
    }
}
