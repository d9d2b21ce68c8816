pub mod exif;
pub mod filename;
pub mod resolve;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone};
use filetime::FileTime;
use serde::{Deserialize, Serialize};

use self::exif::{EmbeddedMetadata, MetadataLookup};

/// Where a timestamp was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    FilesystemCreation,
    FilesystemModification,
    FilesystemAccess,
    FilenameEncoded,
    EmbeddedMetadata,
}

/// All timestamps known for one file. Filesystem times keep their
/// sub-second part so the one-minute tolerance is checked exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDateSet(BTreeMap<DateSource, NaiveDateTime>);

impl FileDateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: DateSource, ts: NaiveDateTime) {
        self.0.insert(source, ts);
    }

    pub fn get(&self, source: DateSource) -> Option<NaiveDateTime> {
        self.0.get(&source).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateSource, NaiveDateTime)> + '_ {
        self.0.iter().map(|(s, t)| (*s, *t))
    }
}

/// How naive timestamps map to filesystem instants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBasis {
    /// Wall-clock time of the local timezone (camera-style)
    #[default]
    Local,
    Utc,
}

impl TimeBasis {
    /// Seconds since the Unix epoch to naive time.
    pub fn naive(self, unix_seconds: i64) -> Option<NaiveDateTime> {
        self.naive_precise(unix_seconds, 0)
    }

    fn naive_precise(self, unix_seconds: i64, nanos: u32) -> Option<NaiveDateTime> {
        let utc = DateTime::from_timestamp(unix_seconds, nanos)?;
        Some(match self {
            TimeBasis::Local => utc.with_timezone(&chrono::Local).naive_local(),
            TimeBasis::Utc => utc.naive_utc(),
        })
    }

    /// Naive time to seconds since the Unix epoch. A local time that falls
    /// in a DST gap is read as UTC; an ambiguous one takes the earlier instant.
    pub fn unix_seconds(self, ts: NaiveDateTime) -> i64 {
        match self {
            TimeBasis::Local => chrono::Local
                .from_local_datetime(&ts)
                .earliest()
                .map(|dt| dt.timestamp())
                .unwrap_or_else(|| ts.and_utc().timestamp()),
            TimeBasis::Utc => ts.and_utc().timestamp(),
        }
    }

    pub fn file_time(self, ts: NaiveDateTime) -> FileTime {
        FileTime::from_unix_time(self.unix_seconds(ts), 0)
    }

    pub fn from_file_time(self, ft: FileTime) -> Option<NaiveDateTime> {
        self.naive_precise(ft.unix_seconds(), ft.nanoseconds())
    }
}

/// Filesystem timestamps of a path: creation, modification, access.
/// Creation falls back to the inode change time where birth time is unavailable.
pub fn read_fs_times(path: &Path, basis: TimeBasis) -> std::io::Result<FileDateSet> {
    let meta = fs::metadata(path)?;
    let mut dates = FileDateSet::new();

    let creation = FileTime::from_creation_time(&meta).or_else(|| change_time(&meta));
    let fields = [
        (DateSource::FilesystemCreation, creation),
        (
            DateSource::FilesystemModification,
            Some(FileTime::from_last_modification_time(&meta)),
        ),
        (
            DateSource::FilesystemAccess,
            Some(FileTime::from_last_access_time(&meta)),
        ),
    ];
    for (source, ft) in fields {
        if let Some(ts) = ft.and_then(|ft| basis.from_file_time(ft)) {
            dates.insert(source, ts);
        }
    }
    Ok(dates)
}

#[cfg(unix)]
fn change_time(meta: &fs::Metadata) -> Option<FileTime> {
    use std::os::unix::fs::MetadataExt;
    Some(FileTime::from_unix_time(
        meta.ctime(),
        u32::try_from(meta.ctime_nsec()).unwrap_or(0),
    ))
}

#[cfg(not(unix))]
fn change_time(_meta: &fs::Metadata) -> Option<FileTime> {
    None
}

/// Gather every timestamp for `path`: filesystem, filename and, when a
/// lookup finds one, the embedded capture time.
pub fn read_file_dates(
    path: &Path,
    basis: TimeBasis,
    lookup: &dyn MetadataLookup,
) -> std::io::Result<(FileDateSet, Option<EmbeddedMetadata>)> {
    let mut dates = read_fs_times(path, basis)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if let Some((rule, ts)) = filename::match_filename(&name) {
        tracing::debug!(rule = rule.name, %ts, "date encoded in filename");
        dates.insert(DateSource::FilenameEncoded, ts);
    }

    let metadata = lookup.lookup(path);
    if let Some(ts) = metadata.as_ref().and_then(|m| m.taken) {
        dates.insert(DateSource::EmbeddedMetadata, ts);
    }

    Ok((dates, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_sub_second_file_time_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        fs::write(&path, b"x").unwrap();
        let ft = FileTime::from_unix_time(1_689_006_232, 250_000_000);
        filetime::set_file_times(&path, ft, ft).unwrap();

        let dates = read_fs_times(&path, TimeBasis::Utc).unwrap();
        let mtime = dates.get(DateSource::FilesystemModification).unwrap();
        assert_eq!(mtime.and_utc().timestamp(), 1_689_006_232);
        assert_eq!(mtime.and_utc().timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_time_basis_round_trip() {
        let ts = NaiveDate::from_ymd_opt(2023, 7, 10)
            .unwrap()
            .and_hms_opt(16, 23, 52)
            .unwrap();
        let secs = TimeBasis::Utc.unix_seconds(ts);
        assert_eq!(secs, 1_689_006_232);
        assert_eq!(TimeBasis::Utc.naive(secs), Some(ts));
        let ft = TimeBasis::Local.file_time(ts);
        assert_eq!(TimeBasis::Local.from_file_time(ft), Some(ts));
    }

    #[test]
    fn test_read_file_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_20230525_101125.jpg");
        fs::write(&path, b"jpeg").unwrap();
        let mtime = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        filetime::set_file_mtime(&path, TimeBasis::Utc.file_time(mtime)).unwrap();

        let (dates, metadata) =
            read_file_dates(&path, TimeBasis::Utc, &exif::NoMetadata).unwrap();
        assert!(metadata.is_none());
        assert_eq!(dates.get(DateSource::FilesystemModification), Some(mtime));
        assert!(dates.get(DateSource::FilesystemCreation).is_some());
        assert!(dates.get(DateSource::FilesystemAccess).is_some());
        assert_eq!(
            dates.get(DateSource::FilenameEncoded),
            NaiveDate::from_ymd_opt(2023, 5, 25)
                .unwrap()
                .and_hms_opt(10, 11, 25)
        );
        assert!(dates.get(DateSource::EmbeddedMetadata).is_none());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.jpg");
        assert!(read_fs_times(&missing, TimeBasis::Utc).is_err());
    }
}
