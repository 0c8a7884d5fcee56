//! Wire formats and header enumerations.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Sync bytes that open a binary log with a full header.
pub const BINARY_SYNC: [u8; 3] = [0xAA, 0x44, 0x12];

/// Sync bytes that open a binary log with a short header.
pub const SHORT_BINARY_SYNC: [u8; 3] = [0xAA, 0x44, 0x13];

/// Sync character of a full ASCII log.
pub const ASCII_SYNC: u8 = b'#';

/// Sync character of a short-header ASCII log.
pub const SHORT_ASCII_SYNC: u8 = b'%';

/// Sync character of an abbreviated ASCII log.
pub const ABBREV_ASCII_SYNC: u8 = b'<';

/// Opening character of a JSON log.
pub const JSON_SYNC: u8 = b'{';

/// Wire format a log is encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Compact little-endian binary with counted arrays.
    Binary,
    /// Binary with every field at its maximum size and a fixed offset.
    FlattenedBinary,
    /// Comma-separated text with `#` sync and CRC trailer.
    Ascii,
    /// Text with `<` sync and named, order-independent field entries.
    AbbreviatedAscii,
    /// JSON object with `header` and `body` members.
    Json,
}

/// Group of formats that share a leading sync pattern.
///
/// Binary and flattened binary cannot be told apart by inspection, so both
/// map to [`FormatFamily::Binary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    /// `AA 44 12` or `AA 44 13` sync.
    Binary,
    /// `#` or `%` sync.
    Ascii,
    /// `<` sync.
    AbbreviatedAscii,
    /// `{` opening.
    Json,
}

impl Format {
    /// Every supported format, in display order.
    pub const ALL: [Format; 5] = [
        Format::Binary,
        Format::FlattenedBinary,
        Format::Ascii,
        Format::AbbreviatedAscii,
        Format::Json,
    ];

    /// Returns the sync family of this format.
    #[must_use]
    pub const fn family(self) -> FormatFamily {
        match self {
            Format::Binary | Format::FlattenedBinary => FormatFamily::Binary,
            Format::Ascii => FormatFamily::Ascii,
            Format::AbbreviatedAscii => FormatFamily::AbbreviatedAscii,
            Format::Json => FormatFamily::Json,
        }
    }

    /// Returns true for formats that carry a CRC trailer.
    #[must_use]
    pub const fn has_crc(self) -> bool {
        !matches!(self, Format::Json)
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Format::Binary => "BINARY",
            Format::FlattenedBinary => "FLATTENED_BINARY",
            Format::Ascii => "ASCII",
            Format::AbbreviatedAscii => "ABBREV_ASCII",
            Format::Json => "JSON",
        }
    }

    /// Identifies the format family of a log from its leading bytes.
    ///
    /// Leading ASCII whitespace is tolerated before a JSON object only.
    ///
    /// # Errors
    /// Returns [`Error::MalformedHeader`] if no sync pattern matches.
    pub fn sniff(bytes: &[u8]) -> Result<FormatFamily> {
        match bytes.first() {
            None => Err(Error::BufferTooShort {
                required: 1,
                available: 0,
            }),
            Some(&ASCII_SYNC | &SHORT_ASCII_SYNC) => Ok(FormatFamily::Ascii),
            Some(&ABBREV_ASCII_SYNC) => Ok(FormatFamily::AbbreviatedAscii),
            Some(&JSON_SYNC) => Ok(FormatFamily::Json),
            Some(&first) if first == BINARY_SYNC[0] => {
                if bytes.len() < BINARY_SYNC.len() {
                    return Err(Error::BufferTooShort {
                        required: BINARY_SYNC.len(),
                        available: bytes.len(),
                    });
                }
                let sync = &bytes[..BINARY_SYNC.len()];
                if sync == BINARY_SYNC || sync == SHORT_BINARY_SYNC {
                    Ok(FormatFamily::Binary)
                } else {
                    Err(Error::malformed(1, "incomplete binary sync"))
                }
            }
            Some(_) => match bytes.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(pos) if bytes[pos] == JSON_SYNC => Ok(FormatFamily::Json),
                _ => Err(Error::malformed(0, "unrecognised sync")),
            },
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "BINARY" | "BIN" => Ok(Format::Binary),
            "FLATTENED_BINARY" | "FLATTENED" => Ok(Format::FlattenedBinary),
            "ASCII" => Ok(Format::Ascii),
            "ABBREV_ASCII" | "ABBREVIATED_ASCII" | "ABBREV" => Ok(Format::AbbreviatedAscii),
            "JSON" => Ok(Format::Json),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

/// Quality of the GPS reference time carried in a log header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimeStatus {
    /// Time validity is unknown.
    Unknown = 20,
    /// Time is set approximately.
    Approximate = 60,
    /// Time is approaching coarse precision.
    CoarseAdjusting = 80,
    /// Time is valid to coarse precision.
    Coarse = 100,
    /// Time is coarse set and being steered.
    CoarseSteering = 120,
    /// Position is lost and the range bias cannot be calculated.
    FreeWheeling = 130,
    /// Time is adjusting to fine precision.
    FineAdjusting = 140,
    /// Time has fine precision.
    Fine = 160,
    /// Time is fine set and steered by a backup system.
    FineBackupSteering = 170,
    /// Time is fine set and being steered.
    FineSteering = 180,
    /// Time from satellite, used in logs with no receiver time.
    SatTime = 200,
    /// Time from an external source.
    Extern = 220,
    /// Time is exact.
    Exact = 240,
}

impl TimeStatus {
    const ALL: [TimeStatus; 13] = [
        TimeStatus::Unknown,
        TimeStatus::Approximate,
        TimeStatus::CoarseAdjusting,
        TimeStatus::Coarse,
        TimeStatus::CoarseSteering,
        TimeStatus::FreeWheeling,
        TimeStatus::FineAdjusting,
        TimeStatus::Fine,
        TimeStatus::FineBackupSteering,
        TimeStatus::FineSteering,
        TimeStatus::SatTime,
        TimeStatus::Extern,
        TimeStatus::Exact,
    ];

    /// Converts a raw header byte into a known status.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|status| *status as u8 == value)
    }

    /// Looks up a status by its text name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == name)
    }

    /// Returns the text name used in ASCII and JSON headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TimeStatus::Unknown => "UNKNOWN",
            TimeStatus::Approximate => "APPROXIMATE",
            TimeStatus::CoarseAdjusting => "COARSEADJUSTING",
            TimeStatus::Coarse => "COARSE",
            TimeStatus::CoarseSteering => "COARSESTEERING",
            TimeStatus::FreeWheeling => "FREEWHEELING",
            TimeStatus::FineAdjusting => "FINEADJUSTING",
            TimeStatus::Fine => "FINE",
            TimeStatus::FineBackupSteering => "FINEBACKUPSTEERING",
            TimeStatus::FineSteering => "FINESTEERING",
            TimeStatus::SatTime => "SATTIME",
            TimeStatus::Extern => "EXTERN",
            TimeStatus::Exact => "EXACT",
        }
    }
}

impl fmt::Display for TimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_families() {
        assert_eq!(
            Format::sniff(&[0xAA, 0x44, 0x12, 0x1C]).unwrap(),
            FormatFamily::Binary
        );
        assert_eq!(Format::sniff(b"#BESTPOSA,").unwrap(), FormatFamily::Ascii);
        assert_eq!(
            Format::sniff(&[0xAA, 0x44, 0x13, 0x58]).unwrap(),
            FormatFamily::Binary
        );
        assert_eq!(Format::sniff(b"%RANGECMPA,2163,").unwrap(), FormatFamily::Ascii);
        assert_eq!(
            Format::sniff(b"<BESTPOS COM1").unwrap(),
            FormatFamily::AbbreviatedAscii
        );
        assert_eq!(Format::sniff(b"{\"header\":{}}").unwrap(), FormatFamily::Json);
        assert_eq!(Format::sniff(b"  \n{\"header\":{}}").unwrap(), FormatFamily::Json);
    }

    #[test]
    fn test_sniff_rejects_garbage() {
        assert!(matches!(
            Format::sniff(b"$GPGGA,"),
            Err(Error::MalformedHeader { offset: 0, .. })
        ));
        assert!(matches!(
            Format::sniff(&[0xAA, 0x44, 0x14]),
            Err(Error::MalformedHeader { offset: 1, .. })
        ));
        assert!(matches!(
            Format::sniff(&[0xAA]),
            Err(Error::BufferTooShort { required: 3, .. })
        ));
        assert!(Format::sniff(&[]).is_err());
    }

    #[test]
    fn test_format_family_and_crc() {
        assert_eq!(Format::FlattenedBinary.family(), FormatFamily::Binary);
        assert!(Format::AbbreviatedAscii.has_crc());
        assert!(!Format::Json.has_crc());
    }

    #[test]
    fn test_format_from_str() {
        for format in Format::ALL {
            assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
        }
        assert_eq!("abbrev".parse::<Format>().unwrap(), Format::AbbreviatedAscii);
        assert!("nmea".parse::<Format>().is_err());
    }

    #[test]
    fn test_time_status_lookup() {
        assert_eq!(TimeStatus::from_u8(180), Some(TimeStatus::FineSteering));
        assert_eq!(TimeStatus::from_u8(181), None);
        assert_eq!(TimeStatus::from_name("SATTIME"), Some(TimeStatus::SatTime));
        assert_eq!(TimeStatus::Unknown.to_string(), "UNKNOWN");
    }
}
