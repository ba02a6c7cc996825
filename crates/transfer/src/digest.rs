use std::io::Read;
use std::path::{Path, PathBuf};

use fleetota_protocol::{DIGEST_LEN, ImageDigest, Metadata};
use sha2::{Digest, Sha256};

use crate::TransferError;

/// Read size used while hashing. Does not affect the result.
pub const DIGEST_BUF_SIZE: usize = 8192;

fn finish(hasher: Sha256) -> ImageDigest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    ImageDigest::from_bytes(out)
}

/// Computes SHA-256 of `data`.
pub fn digest_bytes(data: &[u8]) -> ImageDigest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finish(hasher)
}

/// Hashes a reader to EOF, returning the digest and the number of bytes consumed.
fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<(ImageDigest, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; DIGEST_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((finish(hasher), total))
}

/// Computes SHA-256 over everything `reader` yields.
///
/// Consumes the reader. On a read error no digest is returned.
pub fn digest_reader<R: Read>(reader: R) -> std::io::Result<ImageDigest> {
    hash_reader(reader).map(|(digest, _)| digest)
}

async fn hash_path(path: &Path) -> Result<(ImageDigest, u64), TransferError> {
    let path: PathBuf = path.to_path_buf();
    let (digest, len) = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        hash_reader(file)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok((digest, len))
}

/// Computes SHA-256 of an entire file on the blocking pool.
pub async fn digest_file(path: &Path) -> Result<ImageDigest, TransferError> {
    hash_path(path).await.map(|(digest, _)| digest)
}

/// Digest and size of a file, measured in a single pass.
pub async fn describe_file(path: &Path) -> Result<Metadata, TransferError> {
    let (digest, size) = hash_path(path).await?;
    Ok(Metadata { digest, size })
}

/// Recomputes the digest of `path` and compares it to `expected`.
pub async fn verify_file(
    path: &Path,
    expected: &ImageDigest,
) -> Result<ImageDigest, TransferError> {
    let actual = digest_file(path).await?;
    if actual != *expected {
        return Err(TransferError::ChecksumMismatch {
            expected: *expected,
            actual,
        });
    }
    Ok(actual)
}
