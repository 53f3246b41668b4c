use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempPath;
use url::Url;

/// Where the user can look at the image while it is being classified.
#[derive(Debug, Clone)]
enum Preview {
    /// The uploaded file itself; not ours to delete.
    File(PathBuf),
    /// A capture spilled to disk; removed once the last clone is dropped.
    Temp(Arc<TempPath>),
    None,
}

/// An in-memory image selected for classification.
///
/// Cloning is cheap: the bytes and any temporary preview are shared.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    bytes: Arc<[u8]>,
    media_type: String,
    file_name: String,
    preview: Preview,
}

impl ImageAsset {
    pub fn from_bytes(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            file_name: file_name.into(),
            preview: Preview::None,
        }
    }

    /// Asset backed by a file the user picked or dropped.
    pub fn from_file(path: &Path, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        Self {
            preview: Preview::File(absolute),
            ..Self::from_bytes(file_name, media_type, bytes)
        }
    }

    /// Asset for a JPEG camera frame. The frame is also written to a
    /// temporary file so it can be previewed; failing that is not fatal.
    pub fn from_capture(jpeg: Vec<u8>) -> Self {
        let mut asset = Self::from_bytes("camera-capture.jpg", "image/jpeg", jpeg);

        match spill_preview(&asset.bytes) {
            Ok(path) => asset.preview = Preview::Temp(Arc::new(path)),
            Err(e) => tracing::warn!("Could not write capture preview: {}", e),
        }

        asset
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn display_url(&self) -> Option<Url> {
        let path: &Path = match &self.preview {
            Preview::File(path) => path,
            Preview::Temp(path) => path,
            Preview::None => return None,
        };
        Url::from_file_path(path).ok()
    }
}

fn spill_preview(bytes: &[u8]) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("sampah-capture-")
        .suffix(".jpg")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_preview_is_removed_with_last_clone() {
        let asset = ImageAsset::from_capture(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let url = asset.display_url().expect("capture should have a preview");
        let path = url.to_file_path().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);

        let clone = asset.clone();
        drop(asset);
        assert!(path.exists());

        drop(clone);
        assert!(!path.exists());
    }

    #[test]
    fn file_asset_points_at_source_and_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bottle.png");
        std::fs::write(&path, b"png").unwrap();

        let asset = ImageAsset::from_file(&path, "image/png", b"png".to_vec());
        assert_eq!(asset.file_name(), "bottle.png");
        assert_eq!(asset.media_type(), "image/png");
        assert!(asset.display_url().unwrap().as_str().starts_with("file://"));

        drop(asset);
        assert!(path.exists());
    }

    #[test]
    fn bare_asset_has_no_preview() {
        let asset = ImageAsset::from_bytes("x.jpg", "image/jpeg", vec![1u8, 2, 3]);
        assert_eq!(asset.len(), 3);
        assert!(asset.display_url().is_none());
    }
}
