pub mod control;
pub mod date;
pub mod error;
pub mod folder_classify;
pub mod media;
pub mod naming;
pub mod publish;
pub mod scan;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::date::exif::{MetadataLookup, NoMetadata};
use crate::date::TimeBasis;
use crate::error::PublishError;
use crate::media::Media;
use crate::publish::{Published, PublishState, Publisher};

pub use control::{CancellationToken, CancelledError};

fn default_verify() -> bool {
    true
}

fn default_jobs() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOptions {
    /// Root searched for "Photos from" directories
    pub search_path: PathBuf,
    /// Root of the year-bucketed output tree
    pub output: PathBuf,
    /// Worker threads; 1 processes files strictly one after another
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Re-read the copy's timestamps after stamping it
    #[serde(default = "default_verify")]
    pub verify: bool,
    /// Look up embedded EXIF metadata (informational only)
    #[serde(default)]
    pub exif: bool,
    #[serde(default)]
    pub time_basis: TimeBasis,
}

impl PublishOptions {
    pub fn new(search_path: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            search_path: search_path.into(),
            output: output.into(),
            jobs: default_jobs(),
            verify: default_verify(),
            exif: false,
            time_basis: TimeBasis::default(),
        }
    }
}

/// A file that could not be published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: String,
    pub message: String,
}

impl FileFailure {
    fn new(path: &Path, err: &PublishError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub total_media: u64,
    pub files_published: u64,
    pub files_failed: u64,
    pub sources_corrected: u64,
    /// Copies whose timestamps could not be set or did not verify
    pub timestamp_problems: u64,
    pub year_folders: Vec<String>,
    pub published: Vec<Published>,
    pub failures: Vec<FileFailure>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Stopped early on request; files not yet started were skipped
    #[serde(default)]
    pub cancelled: bool,
}

impl ProcessResult {
    /// Count one file's outcome. `None` means it was skipped by cancellation.
    fn record(
        &mut self,
        path: &Path,
        outcome: Option<Result<Published, PublishError>>,
        warnings: &mut Vec<String>,
    ) {
        match outcome {
            Some(Ok(published)) => {
                self.files_published += 1;
                if published.source_corrected {
                    self.sources_corrected += 1;
                }
                if published.has_timestamp_problem() {
                    self.timestamp_problems += 1;
                    warnings.push(format!(
                        "timestamps of {} do not match {}",
                        published.dest.display(),
                        published.target.timestamp
                    ));
                }
                self.published.push(published);
            }
            Some(Err(e)) => {
                self.files_failed += 1;
                self.failures.push(FileFailure::new(path, &e));
            }
            None => self.cancelled = true,
        }
    }
}

/// Control options for process execution (cancellation).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Cancellation token checked between files.
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    /// Create a new ProcessControl with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create ProcessControl with a cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|t| t.check().is_err())
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    /// `total` of 0 means unknown; such reports are always throttled.
    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total > 0 && current + 1 >= total;
        if !is_done {
            let mut last = self
                .last_emit
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

fn metadata_lookup(
    enabled: bool,
    #[cfg_attr(feature = "exif", allow(unused_variables))] warnings: &mut Vec<String>,
) -> Box<dyn MetadataLookup> {
    if !enabled {
        return Box::new(NoMetadata);
    }
    #[cfg(feature = "exif")]
    {
        Box::new(date::exif::ExifLookup)
    }
    #[cfg(not(feature = "exif"))]
    {
        let msg = "EXIF lookup requested but built without the `exif` feature".to_string();
        warn!("{}", msg);
        warnings.push(msg);
        Box::new(NoMetadata)
    }
}

/// Run the full pipeline with progress reporting.
pub fn process(
    options: &PublishOptions,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    process_with_control(options, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline with progress reporting and control options.
///
/// Per-file failures are collected in the result; only problems with the
/// run as a whole (missing search path, unwritable output root) are errors.
pub fn process_with_control(
    options: &PublishOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);

    if !options.search_path.exists() {
        anyhow::bail!("search path {} does not exist", options.search_path.display());
    }
    std::fs::create_dir_all(&options.output).with_context(|| {
        format!("cannot create output directory {}", options.output.display())
    })?;

    // Stage 1: discover media
    let scan = scan::scan_media(&options.search_path, Some(options.output.as_path()), &tp)?;
    info!(
        directories = scan.photo_dirs.len(),
        files = scan.media.len(),
        "scan complete"
    );
    let media_list = scan.media;
    if media_list.is_empty() {
        return Ok(ProcessResult::default());
    }

    // Stage 2: publish each file
    let mut warnings = Vec::new();
    let lookup = metadata_lookup(options.exif, &mut warnings);
    let state = PublishState::new();
    let publisher = Publisher {
        output: &options.output,
        basis: options.time_basis,
        verify: options.verify,
        lookup: lookup.as_ref(),
        state: &state,
    };

    let total = media_list.len() as u64;
    let done = AtomicU64::new(0);
    let run_one = |m: &Media| -> Option<Result<Published, PublishError>> {
        if control.is_cancelled() {
            return None;
        }
        let result = publisher.publish(m);
        if let Err(e) = &result {
            error!(file = %m.path.display(), kind = e.kind(), "{}", e);
        }
        let current = done.fetch_add(1, Ordering::Relaxed);
        tp.report("publish", current, total, &m.filename);
        Some(result)
    };

    let outcomes: Vec<Option<Result<Published, PublishError>>> = if options.jobs <= 1 {
        media_list.iter().map(run_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()
            .context("cannot start worker pool")?;
        pool.install(|| media_list.par_iter().map(run_one).collect())
    };

    // Stage 3: tally
    let mut result = ProcessResult {
        total_media: total,
        ..ProcessResult::default()
    };
    for (m, outcome) in media_list.iter().zip(outcomes) {
        result.record(&m.path, outcome, &mut warnings);
    }
    if result.cancelled {
        warn!("run cancelled, remaining files skipped");
    }
    result.published.sort_by_key(|p| p.counter);
    result.year_folders = state.year_folders();
    result.warnings = warnings;

    info!(
        published = result.files_published,
        total = result.total_media,
        failed = result.files_failed,
        "run finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::resolve::{ResolvedTarget, TargetSource};
    use crate::date::{DateSource, FileDateSet};
    use crate::publish::DestTimes;
    use chrono::NaiveDate;

    fn published(dest_times: DestTimes) -> Published {
        let timestamp = NaiveDate::from_ymd_opt(2023, 7, 10)
            .unwrap()
            .and_hms_opt(16, 23, 52)
            .unwrap();
        Published {
            source: PathBuf::from("in/IMG20230710162352.jpg"),
            dest: PathBuf::from("out/Photos from 2023/IMG_20230710_162352_0001.jpg"),
            counter: 1,
            target: ResolvedTarget {
                timestamp,
                source: TargetSource::Date(DateSource::FilenameEncoded),
            },
            dates: FileDateSet::new(),
            source_corrected: true,
            dest_times,
            verification: None,
            metadata: None,
        }
    }

    #[test]
    fn test_unstamped_copy_counts_as_published() {
        let mut result = ProcessResult::default();
        let mut warnings = Vec::new();
        let path = Path::new("in/IMG20230710162352.jpg");
        result.record(
            path,
            Some(Ok(published(DestTimes::Failed("denied".into())))),
            &mut warnings,
        );
        assert_eq!(result.files_published, 1);
        assert_eq!(result.files_failed, 0);
        assert_eq!(result.sources_corrected, 1);
        assert_eq!(result.timestamp_problems, 1);
        assert_eq!(warnings.len(), 1);

        result.record(path, Some(Ok(published(DestTimes::AppliedOnRetry))), &mut warnings);
        assert_eq!(result.files_published, 2);
        assert_eq!(result.timestamp_problems, 1);
    }

    #[test]
    fn test_failures_and_skips_tallied() {
        let mut result = ProcessResult::default();
        let mut warnings = Vec::new();
        let err = PublishError::TimestampWrite {
            path: PathBuf::from("in/a.jpg"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        result.record(Path::new("in/a.jpg"), Some(Err(err)), &mut warnings);
        result.record(Path::new("in/b.jpg"), None, &mut warnings);
        assert_eq!(result.files_failed, 1);
        assert_eq!(result.failures[0].kind, "timestamp_write");
        assert_eq!(result.files_published, 0);
        assert!(result.cancelled);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_throttle_skips_unknown_totals() {
        let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&calls);
        let cb = move |stage: &str, current: u64, _: u64, _: &str| {
            sink.lock().unwrap().push((stage.to_string(), current));
        };
        let tp = ThrottledProgress::new(&cb);
        tp.report("scan", 0, 0, "a");
        tp.report("scan", 1, 0, "b");
        tp.report("publish", 9, 10, "last");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.first(), Some(&("scan".to_string(), 0)));
        assert_eq!(calls.last(), Some(&("publish".to_string(), 9)));
        assert_eq!(calls.len(), 2);
    }
}
