//! Carrier wavelengths and signal code translation.
//!
//! `RANGE_RECORD` numbers systems and signals with the tracking status word
//! codes. `SATELLITE_SIGNAL` and `BIT_PACKED` use compact codes of their own,
//! translated onto the tracking status codes before a carrier is looked up.

use rxlog_schema::CompressionScheme;

const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Offset between a stored GLONASS frequency and its channel number.
pub const GLONASS_CHANNEL_OFFSET: i16 = 7;

const GPS_L1: f64 = 1_575.42e6;
const GPS_L2: f64 = 1_227.60e6;
const GPS_L5: f64 = 1_176.45e6;
const GALILEO_E5B: f64 = 1_207.14e6;
const GALILEO_E6: f64 = 1_278.75e6;
const GALILEO_ALTBOC: f64 = 1_191.795e6;
const BEIDOU_B1: f64 = 1_561.098e6;
const BEIDOU_B3: f64 = 1_268.52e6;
const GLONASS_L1: f64 = 1_602.0e6;
const GLONASS_L1_STEP: f64 = 562_500.0;
const GLONASS_L2: f64 = 1_246.0e6;
const GLONASS_L2_STEP: f64 = 437_500.0;
const GLONASS_L3: f64 = 1_202.025e6;

/// Satellite system codes of the tracking status word.
pub(crate) mod tracking {
    pub const GPS: u8 = 0;
    pub const GLONASS: u8 = 1;
    pub const SBAS: u8 = 2;
    pub const GALILEO: u8 = 3;
    pub const BEIDOU: u8 = 4;
    pub const QZSS: u8 = 5;
    pub const NAVIC: u8 = 6;
    pub const OTHER: u8 = 7;
}

/// Compact satellite system codes shared by `SATELLITE_SIGNAL` and `BIT_PACKED`.
pub(crate) mod system {
    pub const GPS: u8 = 0;
    pub const GLONASS: u8 = 1;
    pub const SBAS: u8 = 2;
    pub const GALILEO: u8 = 5;
    pub const BEIDOU: u8 = 6;
    pub const QZSS: u8 = 7;
    pub const LBAND: u8 = 8;
    pub const NAVIC: u8 = 9;
}

#[derive(Debug, Clone, Copy)]
enum Carrier {
    Fixed(f64),
    GlonassL1,
    GlonassL2,
}

/// Returns the carrier wavelength (m) of a signal, or `None` when the
/// system and signal pair has no known carrier.
///
/// `system` and `signal_type` are read in the code space of `scheme`, as
/// reported in [`RangeObservation`](super::RangeObservation).
/// `glonass_frequency` is the stored frequency, offset by
/// [`GLONASS_CHANNEL_OFFSET`].
#[must_use]
pub fn carrier_wavelength(
    scheme: CompressionScheme,
    system: u8,
    signal_type: u8,
    glonass_frequency: u8,
) -> Option<f64> {
    let (system, signal_type) = tracking_codes(scheme, system, signal_type)?;
    let channel = f64::from(i16::from(glonass_frequency) - GLONASS_CHANNEL_OFFSET);
    let hz = match carrier(system, signal_type)? {
        Carrier::Fixed(hz) => hz,
        Carrier::GlonassL1 => GLONASS_L1 + channel * GLONASS_L1_STEP,
        Carrier::GlonassL2 => GLONASS_L2 + channel * GLONASS_L2_STEP,
    };
    Some(SPEED_OF_LIGHT / hz)
}

/// Translates a system and signal pair onto tracking status codes.
pub(crate) fn tracking_codes(scheme: CompressionScheme, system: u8, signal_type: u8) -> Option<(u8, u8)> {
    if scheme == CompressionScheme::RangeRecord {
        return Some((system, signal_type));
    }
    let bit_packed = scheme == CompressionScheme::BitPacked;
    let translated = match (system, signal_type) {
        (system::GPS, 1) => (tracking::GPS, 0),
        (system::GPS, 4) => (tracking::GPS, 9),
        (system::GPS, 5) => (tracking::GPS, 17),
        (system::GPS, 6) => (tracking::GPS, 5),
        (system::GPS, 7) => (tracking::GPS, 14),
        (system::GPS, 15) => (tracking::GPS, 16),
        (system::GLONASS, 1) => (tracking::GLONASS, 0),
        (system::GLONASS, 3) => (tracking::GLONASS, 1),
        (system::GLONASS, 4) => (tracking::GLONASS, 5),
        (system::GLONASS, 6) => (tracking::GLONASS, 6),
        (system::SBAS, 1) => (tracking::SBAS, 0),
        (system::SBAS, 2) => (tracking::SBAS, 6),
        (system::GALILEO, 1) => (tracking::GALILEO, 2),
        (system::GALILEO, 2) => (tracking::GALILEO, 12),
        (system::GALILEO, 3) => (tracking::GALILEO, 17),
        (system::GALILEO, 4) => (tracking::GALILEO, 20),
        (system::GALILEO, 5) => (tracking::GALILEO, 7),
        (system::GALILEO, 12) => (tracking::GALILEO, 6),
        (system::QZSS, 1) => (tracking::QZSS, 0),
        (system::QZSS, 3) => (tracking::QZSS, 17),
        (system::QZSS, 4) => (tracking::QZSS, 14),
        (system::QZSS, 8) => (tracking::QZSS, 16),
        (system::QZSS, 10) if bit_packed => (tracking::QZSS, 28),
        (system::QZSS, 11) => (tracking::QZSS, 27),
        (system::BEIDOU, 1) => (tracking::BEIDOU, 0),
        (system::BEIDOU, 2) => (tracking::BEIDOU, 4),
        (system::BEIDOU, 3) => (tracking::BEIDOU, 1),
        (system::BEIDOU, 4) => (tracking::BEIDOU, 5),
        (system::BEIDOU, 5) if bit_packed => (tracking::BEIDOU, 2),
        (system::BEIDOU, 6) if bit_packed => (tracking::BEIDOU, 6),
        (system::BEIDOU, 7) if bit_packed => (tracking::BEIDOU, 7),
        (system::BEIDOU, 9) if bit_packed => (tracking::BEIDOU, 9),
        (system::BEIDOU, 11) if bit_packed => (tracking::BEIDOU, 11),
        (system::BEIDOU, 13) if !bit_packed => (tracking::BEIDOU, 2),
        (system::BEIDOU, 16) if !bit_packed => (tracking::BEIDOU, 6),
        (system::BEIDOU, 19) if !bit_packed => (tracking::BEIDOU, 7),
        (system::BEIDOU, 20) if !bit_packed => (tracking::BEIDOU, 9),
        (system::BEIDOU, 21) if !bit_packed => (tracking::BEIDOU, 11),
        (system::NAVIC, 1) => (tracking::NAVIC, 0),
        (system::LBAND, _) => (tracking::OTHER, signal_type),
        _ => return None,
    };
    Some(translated)
}

fn carrier(system: u8, signal_type: u8) -> Option<Carrier> {
    let fixed = match (system, signal_type) {
        (tracking::GPS, 0 | 16) => GPS_L1,
        (tracking::GPS, 5 | 9 | 17) => GPS_L2,
        (tracking::GPS, 14) => GPS_L5,
        (tracking::GLONASS, 0) => return Some(Carrier::GlonassL1),
        (tracking::GLONASS, 1 | 5) => return Some(Carrier::GlonassL2),
        (tracking::GLONASS, 6) => GLONASS_L3,
        (tracking::SBAS, 0) => GPS_L1,
        (tracking::SBAS, 6) => GPS_L5,
        (tracking::GALILEO, 2) => GPS_L1,
        (tracking::GALILEO, 6 | 7) => GALILEO_E6,
        (tracking::GALILEO, 12) => GPS_L5,
        (tracking::GALILEO, 17) => GALILEO_E5B,
        (tracking::GALILEO, 20) => GALILEO_ALTBOC,
        (tracking::BEIDOU, 0 | 4) => BEIDOU_B1,
        (tracking::BEIDOU, 1 | 5 | 11) => GALILEO_E5B,
        (tracking::BEIDOU, 2 | 6) => BEIDOU_B3,
        (tracking::BEIDOU, 7) => GPS_L1,
        (tracking::BEIDOU, 9) => GPS_L5,
        (tracking::QZSS, 0 | 16) => GPS_L1,
        (tracking::QZSS, 17) => GPS_L2,
        (tracking::QZSS, 14) => GPS_L5,
        (tracking::QZSS, 27 | 28) => GALILEO_E6,
        (tracking::NAVIC, 0) => GPS_L5,
        _ => return None,
    };
    Some(Carrier::Fixed(fixed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_tracking_codes_wavelengths() {
        let l1 = carrier_wavelength(CompressionScheme::RangeRecord, tracking::GPS, 0, 0).unwrap();
        assert!(close(l1, 0.190_293_672_798));
        let l2 = carrier_wavelength(CompressionScheme::RangeRecord, tracking::GPS, 17, 0).unwrap();
        assert!(close(l2, SPEED_OF_LIGHT / GPS_L2));
        let b3 = carrier_wavelength(CompressionScheme::RangeRecord, tracking::BEIDOU, 6, 0).unwrap();
        assert!(close(b3, SPEED_OF_LIGHT / BEIDOU_B3));
        assert!(carrier_wavelength(CompressionScheme::RangeRecord, tracking::SBAS, 5, 0).is_none());
        assert!(carrier_wavelength(CompressionScheme::RangeRecord, tracking::OTHER, 0, 0).is_none());
    }

    #[test]
    fn test_glonass_channel() {
        // stored 9 is channel +2
        let l1 = carrier_wavelength(CompressionScheme::RangeRecord, tracking::GLONASS, 0, 9).unwrap();
        assert!(close(l1, SPEED_OF_LIGHT / (1_602.0e6 + 2.0 * 562_500.0)));
        let l2 = carrier_wavelength(CompressionScheme::SatelliteSignal, system::GLONASS, 3, 0).unwrap();
        assert!(close(l2, SPEED_OF_LIGHT / (1_246.0e6 - 7.0 * 437_500.0)));
        let l3 = carrier_wavelength(CompressionScheme::BitPacked, system::GLONASS, 6, 3).unwrap();
        assert!(close(l3, SPEED_OF_LIGHT / GLONASS_L3));
    }

    #[test]
    fn test_compact_codes_differ_for_beidou() {
        let b3 = SPEED_OF_LIGHT / BEIDOU_B3;
        let satellite = carrier_wavelength(CompressionScheme::SatelliteSignal, system::BEIDOU, 13, 0);
        let packed = carrier_wavelength(CompressionScheme::BitPacked, system::BEIDOU, 5, 0);
        assert!(close(satellite.unwrap(), b3));
        assert!(close(packed.unwrap(), b3));
        assert!(carrier_wavelength(CompressionScheme::SatelliteSignal, system::BEIDOU, 5, 0).is_none());
        assert!(carrier_wavelength(CompressionScheme::BitPacked, system::BEIDOU, 13, 0).is_none());

        assert_eq!(
            tracking_codes(CompressionScheme::BitPacked, system::QZSS, 10),
            Some((tracking::QZSS, 28))
        );
        assert_eq!(tracking_codes(CompressionScheme::SatelliteSignal, system::QZSS, 10), None);
    }

    #[test]
    fn test_galileo_and_navic() {
        let e6b = carrier_wavelength(CompressionScheme::SatelliteSignal, system::GALILEO, 12, 0).unwrap();
        assert!(close(e6b, SPEED_OF_LIGHT / GALILEO_E6));
        let altboc = carrier_wavelength(CompressionScheme::BitPacked, system::GALILEO, 4, 0).unwrap();
        assert!(close(altboc, SPEED_OF_LIGHT / GALILEO_ALTBOC));
        let navic = carrier_wavelength(CompressionScheme::BitPacked, system::NAVIC, 1, 0).unwrap();
        assert!(close(navic, SPEED_OF_LIGHT / GPS_L5));
        assert!(carrier_wavelength(CompressionScheme::SatelliteSignal, system::LBAND, 1, 0).is_none());
    }
}
