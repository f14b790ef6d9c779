use std::fmt;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Immutable image bytes plus the MIME type they were accepted with.
///
/// Handles are never mutated, only replaced. Cloning shares the underlying
/// allocation, so several snapshots can point at the same image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle {
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
}

impl ImageHandle {
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        let mime_type = mime_type.into();
        let mime_type = if mime_type.trim().is_empty() {
            DEFAULT_IMAGE_MIME.to_string()
        } else {
            mime_type.trim().to_ascii_lowercase()
        };
        Self {
            bytes: bytes.into(),
            mime_type,
            file_name: file_name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    pub fn short_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        let digest = hasher.finalize();
        hex::encode(&digest[..4])
    }

    /// Same pixels source: shared allocation, or equal bytes and MIME type.
    /// The display name is ignored.
    pub fn same_image(&self, other: &ImageHandle) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
            || (self.mime_type == other.mime_type && self.bytes == other.bytes)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    if lowered.contains("bmp") {
        return "bmp";
    }
    if lowered.contains("tiff") {
        return "tiff";
    }
    "png"
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|value| value.to_str())
        .and_then(mime_for_extension)
}
