use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{Datelike, NaiveDateTime};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::date::exif::{EmbeddedMetadata, MetadataLookup};
use crate::date::resolve::{self, ResolvedTarget};
use crate::date::{self, DateSource, FileDateSet, TimeBasis};
use crate::error::PublishError;
use crate::folder_classify::year_folder_name;
use crate::media::Media;
use crate::naming::output_filename;

/// Per-run state shared by every file of the run: the output counter and
/// the set of year folders already ensured. Safe to share across workers.
#[derive(Debug)]
pub struct PublishState {
    next_counter: AtomicU32,
    ensured_years: Mutex<HashSet<i32>>,
}

impl Default for PublishState {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishState {
    pub fn new() -> Self {
        Self {
            next_counter: AtomicU32::new(1),
            ensured_years: Mutex::new(HashSet::new()),
        }
    }

    /// Take the next counter value. Never hands out the same value twice.
    pub fn claim_counter(&self) -> u32 {
        self.next_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Give back a claimed value whose file failed. Only succeeds if nobody
    /// claimed after it; otherwise the value stays unused.
    pub fn release_counter(&self, value: u32) -> bool {
        self.next_counter
            .compare_exchange(value + 1, value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Create `<output>/Photos from <year>` unless already done in this run.
    /// A folder that already exists, including one created concurrently by
    /// another worker, counts as success.
    pub fn ensure_year_folder(&self, output: &Path, year: i32) -> Result<PathBuf, PublishError> {
        let dir = output.join(year_folder_name(year));
        let mut ensured = self
            .ensured_years
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if ensured.contains(&year) {
            return Ok(dir);
        }
        match fs::create_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(source) => return Err(PublishError::FolderCreate { path: dir, source }),
        }
        debug!(folder = %dir.display(), "year folder ready");
        ensured.insert(year);
        Ok(dir)
    }

    /// Year folder names used so far, sorted.
    pub fn year_folders(&self) -> Vec<String> {
        let ensured = self
            .ensured_years
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut years: Vec<i32> = ensured.iter().copied().collect();
        years.sort_unstable();
        years.into_iter().map(year_folder_name).collect()
    }
}

/// Outcome of applying the target timestamp to the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DestTimes {
    Applied,
    AppliedOnRetry,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Timestamps of the copy that ended up more than a minute off target
    pub mismatches: Vec<DateSource>,
}

impl Verification {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// A file that made it into the output tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Published {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub counter: u32,
    pub target: ResolvedTarget,
    pub dates: FileDateSet,
    pub source_corrected: bool,
    pub dest_times: DestTimes,
    /// None when verification is disabled
    pub verification: Option<Verification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EmbeddedMetadata>,
}

impl Published {
    /// True when the copy's timestamps are known to be wrong.
    pub fn has_timestamp_problem(&self) -> bool {
        matches!(self.dest_times, DestTimes::Failed(_))
            || self.verification.as_ref().is_some_and(|v| !v.passed())
    }
}

/// Runs the per-file pipeline against an output root.
pub struct Publisher<'a> {
    pub output: &'a Path,
    pub basis: TimeBasis,
    pub verify: bool,
    pub lookup: &'a dyn MetadataLookup,
    pub state: &'a PublishState,
}

impl Publisher<'_> {
    /// Resolve, correct, copy and stamp one file.
    ///
    /// Errors leave the source untouched (no timestamp written) or, for a
    /// failed copy, leave no file behind in the output tree. A failure to
    /// stamp the copy is reported in [`Published::dest_times`] instead.
    pub fn publish(&self, media: &Media) -> Result<Published, PublishError> {
        let source = media.path.as_path();

        // Start -> DatesRead
        let (dates, metadata) = date::read_file_dates(source, self.basis, self.lookup)
            .map_err(|e| PublishError::Stat {
                path: source.to_path_buf(),
                source: e,
            })?;
        if let Some(m) = &metadata {
            debug!(make = ?m.make, model = ?m.model, gps = ?m.gps, taken = ?m.taken, "embedded metadata");
        }
        self.publish_dated(media, dates, metadata)
    }

    /// Everything after the dates were read.
    fn publish_dated(
        &self,
        media: &Media,
        dates: FileDateSet,
        metadata: Option<EmbeddedMetadata>,
    ) -> Result<Published, PublishError> {
        let source = media.path.as_path();

        // DatesRead -> TargetResolved
        let target = match resolve::resolve(&dates) {
            Some(target) => target,
            None => {
                warn!(file = %source.display(), "no usable timestamp, using current time");
                ResolvedTarget::fallback(self.now())
            }
        };
        debug!(file = %media.filename, resolved = %target.timestamp, from = ?target.source, "target resolved");

        // TargetResolved -> SourceCorrected | SourceUnchanged
        let source_corrected = resolve::needs_correction(&dates, target.timestamp);
        if source_corrected {
            write_timestamps(source, self.basis.file_time(target.timestamp)).map_err(|e| {
                PublishError::TimestampWrite {
                    path: source.to_path_buf(),
                    source: e,
                }
            })?;
            debug!(file = %media.filename, "source timestamps corrected");
        }

        // -> FolderEnsured
        let folder = self
            .state
            .ensure_year_folder(self.output, target.timestamp.year())?;

        // -> Copied
        let counter = self.state.claim_counter();
        let dest = folder.join(output_filename(
            media.kind,
            target.timestamp,
            counter,
            &media.extension,
        ));
        if let Err(e) = copy_with_fallback(source, &dest) {
            if !self.state.release_counter(counter) {
                debug!(counter, "counter value left unused");
            }
            return Err(PublishError::Copy {
                path: dest,
                source: e,
            });
        }

        // -> DestDatesSet
        let dest_times = self.stamp_copy(&dest, target.timestamp);

        // -> Verified
        let verification = self
            .verify
            .then(|| verify_timestamps(&dest, target.timestamp, self.basis));
        if let Some(v) = verification.as_ref().filter(|v| !v.passed()) {
            warn!(file = %dest.display(), mismatches = ?v.mismatches, "copy timestamps differ from target");
        }

        info!(
            source = %media.filename,
            dest = %dest.display(),
            resolved = %target.timestamp,
            corrected = source_corrected,
            "published"
        );

        Ok(Published {
            source: source.to_path_buf(),
            dest,
            counter,
            target,
            dates,
            source_corrected,
            dest_times,
            verification,
            metadata,
        })
    }

    fn now(&self) -> NaiveDateTime {
        let now = chrono::Utc::now();
        self.basis
            .naive(now.timestamp())
            .unwrap_or_else(|| now.naive_utc())
    }

    fn stamp_copy(&self, dest: &Path, target: NaiveDateTime) -> DestTimes {
        let ft = self.basis.file_time(target);
        let Err(first) = write_timestamps(dest, ft) else {
            return DestTimes::Applied;
        };
        warn!(file = %dest.display(), error = %first, "setting copy timestamps failed, retrying");
        match write_timestamps_via_handle(dest, ft) {
            Ok(()) => DestTimes::AppliedOnRetry,
            Err(e) => {
                warn!(file = %dest.display(), error = %e, "copy keeps its own timestamps");
                DestTimes::Failed(e.to_string())
            }
        }
    }
}

/// Set access and modification time in a single call. Creation time is
/// also set where the platform allows it, best effort.
pub fn write_timestamps(path: &Path, ft: FileTime) -> io::Result<()> {
    filetime::set_file_times(path, ft, ft)?;
    if let Err(e) = set_creation_time(path, ft) {
        debug!(file = %path.display(), error = %e, "creation time not updated");
    }
    Ok(())
}

/// Same as [`write_timestamps`], through an open file descriptor.
fn write_timestamps_via_handle(path: &Path, ft: FileTime) -> io::Result<()> {
    let file = File::open(path)?;
    filetime::set_file_handle_times(&file, Some(ft), Some(ft))
}

#[cfg(windows)]
fn set_creation_time(path: &Path, ft: FileTime) -> io::Result<()> {
    use std::fs::{FileTimes, OpenOptions};
    use std::os::windows::fs::{FileTimesExt, OpenOptionsExt};
    use std::time::{Duration, SystemTime};

    const FILE_WRITE_ATTRIBUTES: u32 = 0x100;

    let secs = ft.unix_seconds();
    let created = if secs >= 0 {
        SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(secs as u64))
    } else {
        SystemTime::UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
    }
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "timestamp out of range"))?;

    let file = OpenOptions::new()
        .access_mode(FILE_WRITE_ATTRIBUTES)
        .open(path)?;
    file.set_times(FileTimes::new().set_created(created))
}

/// Birth time cannot be changed on unix filesystems.
#[cfg(not(windows))]
fn set_creation_time(_path: &Path, _ft: FileTime) -> io::Result<()> {
    Ok(())
}

/// Copy bytes plus whatever the platform copy carries (permissions, extended
/// attributes). Falls back once to a plain streamed copy.
fn copy_with_fallback(source: &Path, dest: &Path) -> io::Result<()> {
    copy_or_plain(source, dest, |s, d| fs::copy(s, d).map(drop))
}

fn copy_or_plain(
    source: &Path,
    dest: &Path,
    primary: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> io::Result<()> {
    match primary(source, dest) {
        Ok(_) => Ok(()),
        Err(first) => {
            warn!(file = %source.display(), error = %first, "copy failed, retrying as plain byte copy");
            copy_plain(source, dest).inspect_err(|_| {
                let _ = fs::remove_file(dest);
            })
        }
    }
}

fn copy_plain(source: &Path, dest: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mut output = io::BufWriter::new(File::create(dest)?);
    io::copy(&mut input, &mut output)?;
    output.flush()
}

/// Re-read the copy's timestamps and compare them with the target.
fn verify_timestamps(dest: &Path, target: NaiveDateTime, basis: TimeBasis) -> Verification {
    let checked: &[DateSource] = if cfg!(windows) {
        &[
            DateSource::FilesystemCreation,
            DateSource::FilesystemModification,
            DateSource::FilesystemAccess,
        ]
    } else {
        &[DateSource::FilesystemModification, DateSource::FilesystemAccess]
    };

    let mismatches = match date::read_fs_times(dest, basis) {
        Ok(actual) => checked
            .iter()
            .copied()
            .filter(|&src| {
                !actual
                    .get(src)
                    .is_some_and(|ts| resolve::within_tolerance(ts, target))
            })
            .collect(),
        Err(e) => {
            warn!(file = %dest.display(), error = %e, "cannot re-read copy timestamps");
            checked.to_vec()
        }
    };
    Verification { mismatches }
}
