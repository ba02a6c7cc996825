use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// Length of an image digest in bytes (SHA-256).
pub const DIGEST_LEN: usize = 32;

/// Content digest identifying a firmware image.
///
/// Two images with equal digests are interchangeable. Rendered on the wire
/// as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDigest([u8; DIGEST_LEN]);

impl ImageDigest {
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageDigest({})", self.to_hex())
    }
}

impl FromStr for ImageDigest {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(ProtocolError::Malformed(format!(
                "digest must be {} hex chars, got {}",
                DIGEST_LEN * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ProtocolError::Malformed(format!("invalid digest hex: {e}")))?;
        Ok(Self(bytes))
    }
}
