use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

pub const DEFAULT_MEDIA_TYPE: &str = "image/png";

/// One immutable image payload plus its declared media type.
///
/// The bytes are shared behind an `Arc`, so cloning an artifact into the
/// history log or a pending request never copies the payload. There is no
/// way to mutate an artifact after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    payload: Arc<[u8]>,
    media_type: String,
}

impl ImageArtifact {
    pub fn new(payload: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        let media_type = media_type.into();
        let media_type = if media_type.trim().is_empty() {
            DEFAULT_MEDIA_TYPE.to_string()
        } else {
            media_type.trim().to_string()
        };
        Self {
            payload: Arc::from(payload.into()),
            media_type,
        }
    }

    /// Loads an uploaded file, inferring the media type from its extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let media_type = mime_for_path(path).unwrap_or(DEFAULT_MEDIA_TYPE);
        Ok(Self::new(bytes, media_type))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn media_type(&self) -> &str {
        self.media_type.as_str()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Short content fingerprint used in logs and the event journal.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.media_type.as_bytes());
        hasher.update(&self.payload);
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    pub fn extension(&self) -> &'static str {
        extension_for_media_type(&self.media_type)
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.payload)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

impl fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("media_type", &self.media_type)
            .field("len", &self.payload.len())
            .field("digest", &self.digest())
            .finish()
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub fn extension_for_media_type(media_type: &str) -> &'static str {
    match media_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}
