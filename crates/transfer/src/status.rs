use std::sync::{PoisonError, RwLock};

use fleetota_protocol::ImageDigest;

/// Remembers whether the local image has been verified, and against what.
///
/// A partially received or mismatching file is unverified and must not be
/// handed out as a valid image.
#[derive(Debug, Default)]
pub struct ImageStatus {
    verified: RwLock<Option<ImageDigest>>,
}

impl ImageStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_verified(&self, digest: ImageDigest) {
        *self.verified.write().unwrap_or_else(PoisonError::into_inner) = Some(digest);
    }

    pub fn mark_unverified(&self) {
        *self.verified.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Digest the image was last verified against, if any.
    pub fn verified_digest(&self) -> Option<ImageDigest> {
        *self.verified.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_verified(&self) -> bool {
        self.verified_digest().is_some()
    }
}
