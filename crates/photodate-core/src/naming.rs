use chrono::NaiveDateTime;

use crate::media::MediaKind;

/// Output filename: `<IMG|VID>_<YYYYMMDD>_<HHMMSS>_<NNNN>.<ext>`.
/// The counter is run-global; it alone disambiguates files that share a
/// target second.
pub fn output_filename(
    kind: MediaKind,
    target: NaiveDateTime,
    counter: u32,
    extension: &str,
) -> String {
    let stem = format!(
        "{}_{}_{:04}",
        kind.prefix(),
        target.format("%Y%m%d_%H%M%S"),
        counter
    );
    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension.to_lowercase())
    }
}
