use chrono::{NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// How the captured digit groups of a rule become a timestamp.
/// Groups are concatenated in capture order before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    /// Concatenated groups form `YYYYMMDDHHMMSS`
    DateTime,
    /// Concatenated groups form `YYYYMMDD`, time is midnight
    DateOnly,
}

impl Extract {
    fn apply(self, digits: &str) -> Option<NaiveDateTime> {
        match self {
            Extract::DateTime => {
                if digits.len() != 14 {
                    return None;
                }
                let dt = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()?;
                // chrono accepts second 60 as a leap second; treat it as invalid
                (dt.nanosecond() == 0).then_some(dt)
            }
            Extract::DateOnly => {
                if digits.len() != 8 {
                    return None;
                }
                NaiveDate::parse_from_str(digits, "%Y%m%d")
                    .ok()?
                    .and_hms_opt(0, 0, 0)
            }
        }
    }
}

#[derive(Debug)]
pub struct FormatRule {
    /// Short label used in logs
    pub name: &'static str,
    regex: Regex,
    extract: Extract,
}

impl FormatRule {
    fn new(name: &'static str, pattern: &str, extract: Extract) -> Self {
        // Every rule is anchored at the start of the body and case-insensitive.
        let regex = Regex::new(&format!("(?i)^{}", pattern)).unwrap();
        Self {
            name,
            regex,
            extract,
        }
    }

    /// Match `body` (filename without extension). None on syntactic mismatch
    /// or when the digits do not form a valid calendar date/time.
    pub fn apply(&self, body: &str) -> Option<NaiveDateTime> {
        let caps = self.regex.captures(body)?;
        let digits: String = caps
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .collect();
        self.extract.apply(&digits)
    }
}

/// Ordered rule list. First valid match wins.
pub static RULES: LazyLock<Vec<FormatRule>> = LazyLock::new(|| {
    use Extract::*;
    vec![
        FormatRule::new("img-compact", r"IMG(\d{14})", DateTime),
        FormatRule::new("vid-compact", r"VID(\d{14})", DateTime),
        FormatRule::new("img-date", r"IMG(\d{8})(?:\d|[-_]|$)", DateOnly),
        FormatRule::new("img-underscore", r"IMG_(\d{8})_(\d{6})", DateTime),
        FormatRule::new("bare", r"(\d{8})_(\d{6})", DateTime),
        FormatRule::new("img-hyphen-date", r"IMG-(\d{8})-", DateOnly),
        FormatRule::new("dsc", r"DSC_(\d{8})_(\d{6})", DateTime),
        FormatRule::new("pxl", r"PXL_(\d{8})_(\d{6})", DateTime),
        FormatRule::new("vid-underscore", r"VID_(\d{8})_(\d{6})", DateTime),
        FormatRule::new("screenshot", r"Screenshot_(\d{8})-(\d{6})", DateTime),
        FormatRule::new("wp", r"WP_(\d{8})_(\d{6})", DateTime),
        FormatRule::new("fb-img", r"FB_IMG_(\d{14})", DateTime),
        FormatRule::new(
            "signal",
            r"Signal-(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-\d+",
            DateTime,
        ),
        FormatRule::new(
            "ms",
            r"MS_(\d{4})-(\d{2})-(\d{2})_(\d{2})-(\d{2})-(\d{2})",
            DateTime,
        ),
    ]
});

/// Filename without its final extension
fn body_of(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Find the first rule that yields a valid timestamp for `filename`.
pub fn match_filename(filename: &str) -> Option<(&'static FormatRule, NaiveDateTime)> {
    let body = body_of(filename);
    RULES
        .iter()
        .find_map(|rule| rule.apply(body).map(|dt| (rule, dt)))
}

/// Extract the capture timestamp encoded in a filename, if any.
pub fn parse_filename_date(filename: &str) -> Option<NaiveDateTime> {
    match_filename(filename).map(|(_, dt)| dt)
}
