use std::path::Path;

use fleetota_protocol::ImageDigest;
use fleetota_transfer::digest_bytes;
use rand::RngCore;

/// Size of a generated sample image (500 KiB).
pub const SAMPLE_IMAGE_SIZE: usize = 1024 * 500;

/// Writes `size` random bytes to `path` and returns their digest.
pub fn write_sample_image(path: &Path, size: usize) -> anyhow::Result<ImageDigest> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &data)?;

    let digest = digest_bytes(&data);
    tracing::info!(path = %path.display(), size, %digest, "sample image written");
    Ok(digest)
}
