use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

use super::{DateSource, FileDateSet};

/// Allowed drift between a filesystem timestamp and the target, in seconds.
pub const TOLERANCE_SECS: i64 = 60;

/// Sources that take part in the oldest-wins computation, highest
/// tie-break priority first.
const CANDIDATES: [DateSource; 3] = [
    DateSource::FilenameEncoded,
    DateSource::FilesystemCreation,
    DateSource::FilesystemModification,
];

/// Where the authoritative timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Date(DateSource),
    /// No candidate was available, wall-clock time was used
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub timestamp: NaiveDateTime,
    pub source: TargetSource,
}

impl ResolvedTarget {
    pub fn fallback(now: NaiveDateTime) -> Self {
        Self {
            timestamp: now,
            source: TargetSource::Fallback,
        }
    }
}

/// Pick the oldest of creation, modification and filename timestamps,
/// truncated to the whole second. Embedded metadata and access time are
/// not considered. Returns None when none of the candidates is present.
pub fn resolve(dates: &FileDateSet) -> Option<ResolvedTarget> {
    // Ties keep the earlier entry of CANDIDATES, so filename beats creation
    // beats modification for the same instant.
    CANDIDATES
        .iter()
        .filter_map(|&src| dates.get(src).map(|ts| (src, ts)))
        .fold(None, |best: Option<(DateSource, NaiveDateTime)>, (src, ts)| match best {
            Some((_, best_ts)) if best_ts <= ts => best,
            _ => Some((src, ts)),
        })
        .map(|(src, ts)| ResolvedTarget {
            timestamp: ts.with_nanosecond(0).unwrap_or(ts),
            source: TargetSource::Date(src),
        })
}

/// True if `ts` is at most [`TOLERANCE_SECS`] away from `target`.
pub fn within_tolerance(ts: NaiveDateTime, target: NaiveDateTime) -> bool {
    (ts - target).abs() <= TimeDelta::seconds(TOLERANCE_SECS)
}

fn drifts(ts: Option<NaiveDateTime>, target: NaiveDateTime) -> bool {
    ts.is_some_and(|ts| !within_tolerance(ts, target))
}

/// True if creation or modification time is more than a minute off target.
pub fn needs_correction(dates: &FileDateSet, target: NaiveDateTime) -> bool {
    drifts(dates.get(DateSource::FilesystemCreation), target)
        || drifts(dates.get(DateSource::FilesystemModification), target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn fs_dates(creation: NaiveDateTime, modification: NaiveDateTime) -> FileDateSet {
        let mut dates = FileDateSet::new();
        dates.insert(DateSource::FilesystemCreation, creation);
        dates.insert(DateSource::FilesystemModification, modification);
        dates
    }

    #[test]
    fn test_filename_oldest_wins() {
        let mut dates = fs_dates(at(2024, 1, 1, 0, 0, 0), at(2024, 1, 1, 0, 0, 0));
        dates.insert(DateSource::FilenameEncoded, at(2023, 7, 10, 16, 23, 52));
        let target = resolve(&dates).unwrap();
        assert_eq!(target.timestamp, at(2023, 7, 10, 16, 23, 52));
        assert_eq!(target.source, TargetSource::Date(DateSource::FilenameEncoded));
    }

    #[test]
    fn test_filesystem_older_than_filename() {
        let mut dates = fs_dates(at(2024, 1, 1, 0, 0, 0), at(2019, 3, 3, 3, 3, 3));
        dates.insert(DateSource::FilenameEncoded, at(2023, 7, 10, 16, 23, 52));
        let target = resolve(&dates).unwrap();
        assert_eq!(target.timestamp, at(2019, 3, 3, 3, 3, 3));
        assert_eq!(
            target.source,
            TargetSource::Date(DateSource::FilesystemModification)
        );
    }

    #[test]
    fn test_embedded_and_access_ignored() {
        let mut dates = fs_dates(at(2024, 1, 1, 0, 0, 0), at(2024, 2, 1, 0, 0, 0));
        dates.insert(DateSource::EmbeddedMetadata, at(2001, 1, 1, 0, 0, 0));
        dates.insert(DateSource::FilesystemAccess, at(2000, 1, 1, 0, 0, 0));
        let target = resolve(&dates).unwrap();
        assert_eq!(target.timestamp, at(2024, 1, 1, 0, 0, 0));
        assert_eq!(target.source, TargetSource::Date(DateSource::FilesystemCreation));
    }

    #[test]
    fn test_tie_break_prefers_filename() {
        let ts = at(2022, 5, 5, 5, 5, 5);
        let mut dates = fs_dates(ts, ts);
        assert_eq!(
            resolve(&dates).unwrap().source,
            TargetSource::Date(DateSource::FilesystemCreation)
        );
        dates.insert(DateSource::FilenameEncoded, ts);
        let target = resolve(&dates).unwrap();
        assert_eq!(target.timestamp, ts);
        assert_eq!(target.source, TargetSource::Date(DateSource::FilenameEncoded));
    }

    #[test]
    fn test_empty_set_has_no_target() {
        let mut dates = FileDateSet::new();
        assert!(resolve(&dates).is_none());
        dates.insert(DateSource::EmbeddedMetadata, at(2001, 1, 1, 0, 0, 0));
        assert!(resolve(&dates).is_none());
    }

    #[test]
    fn test_never_above_minimum() {
        let samples = [
            (at(2020, 1, 1, 0, 0, 0), at(2021, 1, 1, 0, 0, 0), None),
            (at(2021, 1, 1, 0, 0, 0), at(2020, 1, 1, 0, 0, 0), Some(at(2022, 1, 1, 0, 0, 0))),
            (at(2021, 1, 1, 0, 0, 0), at(2021, 1, 1, 0, 0, 1), Some(at(1999, 12, 31, 23, 59, 59))),
        ];
        for (c, m, f) in samples {
            let mut dates = fs_dates(c, m);
            if let Some(f) = f {
                dates.insert(DateSource::FilenameEncoded, f);
            }
            let min = [Some(c), Some(m), f].into_iter().flatten().min().unwrap();
            assert_eq!(resolve(&dates).unwrap().timestamp, min);
        }
    }

    #[test]
    fn test_correction_boundary() {
        let target = at(2023, 7, 10, 16, 23, 52);
        let exact = target + TimeDelta::seconds(60);
        let over = target + TimeDelta::milliseconds(60_100);

        assert!(!needs_correction(&fs_dates(target, target), target));
        assert!(!needs_correction(&fs_dates(exact, target), target));
        assert!(!needs_correction(&fs_dates(target, target - TimeDelta::seconds(60)), target));
        assert!(needs_correction(&fs_dates(over, target), target));
        assert!(needs_correction(&fs_dates(target, over), target));
    }

    #[test]
    fn test_target_drops_sub_seconds() {
        let created = at(2021, 4, 4, 4, 4, 4) + TimeDelta::milliseconds(900);
        let dates = fs_dates(created, at(2022, 1, 1, 0, 0, 0));
        let target = resolve(&dates).unwrap();
        assert_eq!(target.timestamp, at(2021, 4, 4, 4, 4, 4));
        // 0.9s off the whole-second target is well within tolerance
        assert!(!needs_correction(&fs_dates(created, target.timestamp), target.timestamp));
    }

    #[test]
    fn test_just_over_a_minute_needs_correction() {
        let target = at(2023, 7, 10, 16, 23, 52);
        let mut dates = FileDateSet::new();
        dates.insert(
            DateSource::FilesystemCreation,
            target + TimeDelta::milliseconds(60_100),
        );
        dates.insert(DateSource::FilesystemModification, target);
        assert!(needs_correction(&dates, target));
    }

    #[test]
    fn test_resolution_is_stable_after_correction() {
        let mut dates = fs_dates(at(2024, 1, 1, 0, 0, 0), at(2024, 1, 1, 0, 0, 0));
        dates.insert(DateSource::FilenameEncoded, at(2023, 7, 10, 16, 23, 52));
        let first = resolve(&dates).unwrap();
        assert!(needs_correction(&dates, first.timestamp));

        // what a second run sees once both timestamps were rewritten
        let mut corrected = fs_dates(first.timestamp, first.timestamp);
        corrected.insert(DateSource::FilenameEncoded, at(2023, 7, 10, 16, 23, 52));
        let second = resolve(&corrected).unwrap();
        assert_eq!(second.timestamp, first.timestamp);
        assert!(!needs_correction(&corrected, second.timestamp));
    }
}
