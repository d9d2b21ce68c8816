use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Informational metadata embedded in a media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedMetadata {
    pub make: Option<String>,
    pub model: Option<String>,
    pub gps: Option<GpsCoordinates>,
    /// Capture time recorded by the device (display only, never resolved)
    pub taken: Option<NaiveDateTime>,
}

impl EmbeddedMetadata {
    pub fn is_empty(&self) -> bool {
        self.make.is_none() && self.model.is_none() && self.gps.is_none() && self.taken.is_none()
    }
}

/// Source of embedded metadata for a file on disk.
pub trait MetadataLookup: Send + Sync {
    fn lookup(&self, path: &Path) -> Option<EmbeddedMetadata>;
}

/// Lookup that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataLookup for NoMetadata {
    fn lookup(&self, _path: &Path) -> Option<EmbeddedMetadata> {
        None
    }
}

/// EXIF reader backed by kamadak-exif.
#[cfg(feature = "exif")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifLookup;

#[cfg(feature = "exif")]
impl MetadataLookup for ExifLookup {
    fn lookup(&self, path: &Path) -> Option<EmbeddedMetadata> {
        use exif::{In, Reader, Tag};
        use std::fs::File;
        use std::io::BufReader;

        let mut reader = BufReader::new(File::open(path).ok()?);
        let exif = Reader::new().read_from_container(&mut reader).ok()?;

        let ascii = |tag: Tag| -> Option<String> {
            let field = exif.get_field(tag, In::PRIMARY)?;
            match field.value {
                exif::Value::Ascii(ref parts) => parts
                    .first()
                    .map(|b| String::from_utf8_lossy(b).trim().to_string())
                    .filter(|s| !s.is_empty()),
                _ => None,
            }
        };

        let coordinate = |value_tag: Tag, ref_tag: Tag, negative: u8| -> Option<f64> {
            let field = exif.get_field(value_tag, In::PRIMARY)?;
            let exif::Value::Rational(ref parts) = field.value else {
                return None;
            };
            let decimal = dms_to_decimal(
                parts.iter().map(|r| r.to_f64()).collect::<Vec<_>>().as_slice(),
            )?;
            let hemisphere = ascii(ref_tag).and_then(|s| s.bytes().next());
            Some(if hemisphere.map(|b| b.to_ascii_uppercase()) == Some(negative) {
                -decimal
            } else {
                decimal
            })
        };

        let gps = match (
            coordinate(Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S'),
            coordinate(Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W'),
        ) {
            (Some(latitude), Some(longitude)) => Some(GpsCoordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        let taken = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
            .iter()
            .filter_map(|tag| exif.get_field(*tag, In::PRIMARY))
            .find_map(|field| parse_exif_datetime(&field.display_value().to_string()));

        let metadata = EmbeddedMetadata {
            make: ascii(Tag::Make),
            model: ascii(Tag::Model),
            gps,
            taken,
        };
        (!metadata.is_empty()).then_some(metadata)
    }
}

/// Degrees, minutes, seconds to decimal degrees.
fn dms_to_decimal(parts: &[f64]) -> Option<f64> {
    let (&deg, rest) = parts.split_first()?;
    let min = rest.first().copied().unwrap_or(0.0);
    let sec = rest.get(1).copied().unwrap_or(0.0);
    let value = deg + min / 60.0 + sec / 3600.0;
    value.is_finite().then_some(value)
}

/// EXIF datetimes have no timezone info - they are local time as-is.
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim()
        .trim_matches('"')
        .replace(['-', '/', '\\', '.'], ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    chrono::NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}
