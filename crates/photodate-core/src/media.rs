use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Image extensions (lowercase, without dot)
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "bmp", "tiff", "tif", "webp", "raw", "arw", "cr2", "nef", "gif",
];

/// Video extensions (lowercase, without dot)
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mov", "mp4", "avi", "mkv", "wmv", "flv", "webm", "m4v", "3gp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by extension. Returns None for anything outside the allowlist.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Output filename prefix
    pub fn prefix(self) -> &'static str {
        match self {
            MediaKind::Video => "VID",
            MediaKind::Image => "IMG",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Media {
    /// Full path of the source file
    pub path: PathBuf,
    /// Just the filename
    pub filename: String,
    /// Original extension, lowercased (may be empty)
    pub extension: String,
    pub kind: MediaKind,
}

impl Media {
    /// Build from a path; None if the extension is not a known media type.
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let kind = MediaKind::from_path(&path)?;
        let filename = path.file_name()?.to_string_lossy().into_owned();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        Some(Self {
            path,
            filename,
            extension,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(MediaKind::from_extension("JPG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension("heic"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension("3gp"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("MOV"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_extension("json"), None);
        assert_eq!(MediaKind::from_extension(""), None);
    }

    #[test]
    fn test_media_from_path() {
        let m = Media::from_path(PathBuf::from("/a/Photos from 2020/VID_1.MP4")).unwrap();
        assert_eq!(m.kind, MediaKind::Video);
        assert_eq!(m.extension, "mp4");
        assert_eq!(m.filename, "VID_1.MP4");
        assert!(Media::from_path(PathBuf::from("/a/notes.txt")).is_none());
    }
}
