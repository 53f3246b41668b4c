use std::path::{Path, PathBuf};

use url::Url;

use crate::asset::ImageAsset;
use crate::error::{DetectError, MAX_UPLOAD_BYTES};

/// How a file reached the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSource {
    /// Named explicitly (argument or `upload <path>`)
    Picker,
    /// Dragged onto the terminal, which pastes its path
    Drop,
}

/// What we know about a file before reading it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadCandidate {
    pub path: PathBuf,
    pub media_type: String,
    pub size: u64,
}

/// Type is checked before size, and nothing here touches the network.
pub fn validate(media_type: &str, size: u64) -> Result<(), DetectError> {
    if !media_type.to_ascii_lowercase().starts_with("image/") {
        return Err(DetectError::InvalidFileType {
            media_type: media_type.to_string(),
        });
    }

    if size > MAX_UPLOAD_BYTES {
        return Err(DetectError::FileTooLarge { size });
    }

    Ok(())
}

/// Declared media type comes from the extension, as a browser would do it.
pub fn inspect(path: &Path) -> Result<UploadCandidate, DetectError> {
    let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    if !metadata.is_file() {
        return Err(DetectError::Io {
            path: path.display().to_string(),
            reason: "not a regular file".to_string(),
        });
    }

    let media_type = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();

    Ok(UploadCandidate {
        path: path.to_path_buf(),
        media_type,
        size: metadata.len(),
    })
}

/// Validate a file and load it into an asset ready for submission.
pub fn accept(path: &Path, source: UploadSource) -> Result<ImageAsset, DetectError> {
    let candidate = inspect(path)?;
    tracing::debug!(
        "{:?} upload {} ({}, {} bytes)",
        source,
        candidate.path.display(),
        candidate.media_type,
        candidate.size
    );

    if let Err(e) = validate(&candidate.media_type, candidate.size) {
        tracing::info!("Rejected {}: {}", candidate.path.display(), e);
        return Err(e);
    }

    let bytes = std::fs::read(&candidate.path).map_err(|e| io_error(&candidate.path, e))?;
    Ok(ImageAsset::from_file(&candidate.path, candidate.media_type, bytes))
}

/// Turn text pasted by a drag-and-drop into a path.
///
/// Terminals differ: some quote the path, some escape spaces with `\`,
/// some paste a `file://` URL.
pub fn parse_dropped_path(text: &str) -> Option<PathBuf> {
    let mut text = text.trim();
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = &text[1..text.len() - 1];
            break;
        }
    }

    if text.is_empty() {
        return None;
    }

    if text.starts_with("file://") {
        return Url::parse(text).ok()?.to_file_path().ok();
    }

    // Backslash is a separator there, not an escape.
    if cfg!(windows) {
        return Some(PathBuf::from(text));
    }

    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                unescaped.push(next);
                continue;
            }
        }
        unescaped.push(c);
    }

    Some(PathBuf::from(unescaped))
}

fn io_error(path: &Path, e: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
