use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::date::{self, DateSource, TimeBasis};
use crate::folder_classify::is_photos_folder;
use crate::media::Media;
use crate::ThrottledProgress;

pub struct ScanResult {
    /// Directories whose name contains "Photos from"
    pub photo_dirs: Vec<PathBuf>,
    /// Media files inside them, oldest creation time first
    pub media: Vec<Media>,
}

/// Find "Photos from" directories under `root` and collect the media files
/// inside them. Anything under `exclude` (typically the output root) is
/// skipped so republished copies are never picked up again.
pub fn scan_media(
    root: &Path,
    exclude: Option<&Path>,
    progress: &ThrottledProgress,
) -> anyhow::Result<ScanResult> {
    // An output root equal to the search root cannot be excluded.
    let root_canonical = root.canonicalize().ok();
    let exclude = exclude
        .and_then(|p| p.canonicalize().ok())
        .filter(|ex| Some(ex) != root_canonical.as_ref());
    let is_excluded = |path: &Path| {
        exclude.as_ref().is_some_and(|ex| {
            path.canonicalize()
                .map(|p| p.starts_with(ex))
                .unwrap_or(false)
        })
    };

    let mut photo_dirs = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if is_excluded(entry.path()) {
            walker.skip_current_dir();
            continue;
        }
        if is_photos_folder(&entry.file_name().to_string_lossy()) {
            debug!(dir = %entry.path().display(), "found photos directory");
            photo_dirs.push(entry.path().to_path_buf());
            // everything below is enumerated as part of this directory
            walker.skip_current_dir();
        }
    }

    let mut media = Vec::new();
    for dir in &photo_dirs {
        let mut walker = WalkDir::new(dir).into_iter();
        while let Some(entry) = walker.next() {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() {
                if entry.depth() > 0 && is_excluded(entry.path()) {
                    walker.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(m) = Media::from_path(entry.into_path()) {
                progress.report("scan", media.len() as u64, 0, &m.filename);
                media.push(m);
            }
        }
    }

    // Stable order between runs: current creation time, then path.
    let mut keyed: Vec<_> = media
        .into_iter()
        .map(|m| {
            let created = date::read_fs_times(&m.path, TimeBasis::Utc)
                .ok()
                .and_then(|d| d.get(DateSource::FilesystemCreation));
            (created, m)
        })
        .collect();
    keyed.sort_by(|(a, ma), (b, mb)| a.cmp(b).then_with(|| ma.path.cmp(&mb.path)));

    Ok(ScanResult {
        photo_dirs,
        media: keyed.into_iter().map(|(_, m)| m).collect(),
    })
}
