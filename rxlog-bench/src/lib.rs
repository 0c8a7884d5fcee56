//! # rxlog bench
//!
//! Fixtures shared by the criterion benchmarks: a position log and a
//! compressed range log, each encoded in every format.

use rxlog_codec::{
    Codec, FieldValue, Format, GenericMessage, LogHeader, RangeCompressor, RangeObservation, SatelliteId, TimeStatus,
    carrier_wavelength,
};
use rxlog_schema::{CompressionScheme, MessageDatabase};
use std::sync::Arc;

/// Schema with a position log, a compressed range log and their enums.
pub const SCHEMA: &str = r#"{
    "enums": [
        {"_id": "1", "name": "SolStatus", "enumerators": [
            {"name": "SOL_COMPUTED", "value": 0}, {"name": "INSUFFICIENT_OBS", "value": 1}
        ]},
        {"_id": "2", "name": "PosType", "enumerators": [
            {"name": "NONE", "value": 0}, {"name": "SINGLE", "value": 16}, {"name": "NARROW_INT", "value": 50}
        ]},
        {"_id": "3", "name": "PortAddress", "enumerators": [
            {"name": "COM1", "value": 32}, {"name": "COM2", "value": 64}, {"name": "USB1", "value": 160}
        ]}
    ],
    "messages": [
        {"name": "BESTPOS", "messageID": 42, "latestMsgDefCrc": 45558, "fields": [
            {"name": "sol_status", "type": "ENUM", "dataType": {"name": "ENUM", "length": 4}, "enumID": "1"},
            {"name": "pos_type", "type": "ENUM", "dataType": {"name": "ENUM", "length": 4}, "enumID": "2"},
            {"name": "lat", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}, "conversionString": "%.11lf"},
            {"name": "lon", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}, "conversionString": "%.11lf"},
            {"name": "hgt", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}, "conversionString": "%.4lf"},
            {"name": "undulation", "type": "SIMPLE", "dataType": {"name": "FLOAT"}, "conversionString": "%.4f"},
            {"name": "datum_id", "type": "SIMPLE", "dataType": {"name": "ULONG"}},
            {"name": "lat_std", "type": "SIMPLE", "dataType": {"name": "FLOAT"}, "conversionString": "%.4f"},
            {"name": "lon_std", "type": "SIMPLE", "dataType": {"name": "FLOAT"}, "conversionString": "%.4f"},
            {"name": "hgt_std", "type": "SIMPLE", "dataType": {"name": "FLOAT"}, "conversionString": "%.4f"},
            {"name": "stn_id", "type": "STRING", "arrayLength": 4},
            {"name": "diff_age", "type": "SIMPLE", "dataType": {"name": "FLOAT"}, "conversionString": "%.3f"},
            {"name": "sol_age", "type": "SIMPLE", "dataType": {"name": "FLOAT"}, "conversionString": "%.3f"},
            {"name": "num_svs", "type": "SIMPLE", "dataType": {"name": "UCHAR"}},
            {"name": "num_soln_svs", "type": "SIMPLE", "dataType": {"name": "UCHAR"}},
            {"name": "num_soln_l1_svs", "type": "SIMPLE", "dataType": {"name": "UCHAR"}},
            {"name": "num_soln_multi_svs", "type": "SIMPLE", "dataType": {"name": "UCHAR"}},
            {"name": "reserved", "type": "SIMPLE", "dataType": {"name": "HEXBYTE"}},
            {"name": "ext_sol_stat", "type": "SIMPLE", "dataType": {"name": "HEXBYTE"}, "conversionString": "%x"},
            {"name": "sig_mask", "type": "FIXED_LENGTH_ARRAY", "dataType": {"name": "HEXBYTE"}, "arrayLength": 2, "conversionString": "%Z"}
        ]},
        {"name": "SATVIS", "messageID": 48, "fields": [
            {"name": "valid", "type": "SIMPLE", "dataType": {"name": "BOOL"}},
            {"name": "num_sats", "type": "SIMPLE", "dataType": {"name": "ULONG"}},
            {"name": "sats", "type": "FIELD_ARRAY", "arrayLength": 64, "arrayLengthRef": "num_sats", "fields": [
                {"name": "id", "type": "SIMPLE", "dataType": {"name": "SATELLITEID"}},
                {"name": "health", "type": "SIMPLE", "dataType": {"name": "ULONG"}},
                {"name": "elevation", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}},
                {"name": "azimuth", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}}
            ]}
        ]},
        {"name": "RANGECMP", "messageID": 140, "fields": [
            {"name": "range_data", "type": "COMPRESSED", "arrayLength": 7800,
                "compression": {"scheme": "RANGE_RECORD", "scale": 1.0}}
        ]}
    ]
}"#;

/// Loads [`SCHEMA`].
///
/// # Panics
/// Panics if the schema does not load; it is a constant.
#[must_use]
pub fn database() -> Arc<MessageDatabase> {
    Arc::new(MessageDatabase::from_json(SCHEMA).expect("bench schema loads"))
}

/// Creates a codec over [`database`].
#[must_use]
pub fn codec() -> Codec {
    Codec::new(database())
}

fn header(message_id: u16, sequence: u16) -> LogHeader {
    let mut header = LogHeader::new(message_id)
        .with_time(2163, 329_760_000)
        .with_time_status(TimeStatus::FineSteering)
        .with_port(32);
    header.sequence = sequence;
    header.idle_time = 167;
    header.receiver_status = 0x0240_0000;
    header.receiver_sw_version = 16_248;
    header
}

/// A position solution log.
#[must_use]
pub fn bestpos() -> GenericMessage {
    let mut header = header(42, 0);
    header.message_definition_crc = 0xb1f6;
    GenericMessage::new(
        header,
        vec![
            FieldValue::Enum(0),
            FieldValue::Enum(16),
            FieldValue::Float(51.150_437_111_11),
            FieldValue::Float(-114.030_677_677_79),
            FieldValue::Float(1097.2099),
            FieldValue::Float(f64::from(-17.0_f32)),
            FieldValue::UInt(61),
            FieldValue::Float(f64::from(0.9038_f32)),
            FieldValue::Float(f64::from(0.8534_f32)),
            FieldValue::Float(f64::from(1.7480_f32)),
            FieldValue::String("0".to_string()),
            FieldValue::Float(0.0),
            FieldValue::Float(0.0),
            FieldValue::UInt(35),
            FieldValue::UInt(30),
            FieldValue::UInt(30),
            FieldValue::UInt(30),
            FieldValue::UInt(0),
            FieldValue::UInt(6),
            FieldValue::Array(vec![FieldValue::UInt(0x00), FieldValue::UInt(0x33)]),
        ],
    )
}

/// A satellite visibility log with `count` records.
#[must_use]
pub fn satvis(count: usize) -> GenericMessage {
    let sats = (0..count)
        .map(|i| {
            FieldValue::Record(vec![
                FieldValue::SatelliteId(SatelliteId::new(1 + i as u16, 0)),
                FieldValue::UInt(0),
                FieldValue::Float(5.0 + i as f64 * 1.25),
                FieldValue::Float(i as f64 * 11.5),
            ])
        })
        .collect();
    GenericMessage::new(
        header(48, 1),
        vec![FieldValue::Bool(true), FieldValue::UInt(count as u64), FieldValue::Array(sats)],
    )
}

/// `count` plausible range observations.
#[must_use]
pub fn observations(count: usize) -> Vec<RangeObservation> {
    (0..count)
        .map(|i| {
            let n = i as f64;
            RangeObservation {
                prn: 1 + (i % 32) as u16,
                signal_type: (i % 3) as u8,
                tracking_status: 0x0810_1c04,
                psr: 21_000_000.0 + n * 1_250.0,
                psr_std: 0.05,
                adr: -110_000_000.0 / 256.0 - n * 10.0,
                adr_std: 0.004,
                doppler: -2_500.0 + n * 150.0,
                cno: 35.0 + (i % 15) as f64,
                locktime: 100.0 + n,
                ..RangeObservation::default()
            }
        })
        .collect()
}

/// A `RANGE_RECORD` block holding `count` observations.
///
/// # Panics
/// Panics if an observation does not fit the record layout.
#[must_use]
pub fn range_block(count: usize) -> Vec<u8> {
    let mut compressor = RangeCompressor::new(CompressionScheme::RangeRecord, 1.0);
    for obs in observations(count) {
        compressor.push_record(&obs).expect("observation fits");
    }
    compressor.finish()
}

/// Compact GPS signal codes, in block order.
const GPS_SIGNALS: [u8; 6] = [1, 4, 5, 6, 7, 15];

/// One GPS signal in compact codes. `velocity` is the line of sight range
/// rate (m/s) shared by every signal of a satellite.
fn gps_signal(
    scheme: CompressionScheme,
    prn: u16,
    signal_type: u8,
    psr: f64,
    phase: f64,
    velocity: f64,
) -> RangeObservation {
    let wavelength = carrier_wavelength(scheme, 0, signal_type, 0).unwrap_or(f64::NAN);
    RangeObservation {
        prn,
        signal_type,
        tracking_status: 0x0810_1c04,
        psr,
        psr_std: 0.066,
        adr: -phase / wavelength,
        adr_std: 0.00929,
        doppler: -velocity / wavelength,
        cno: 40.0,
        locktime: 100.0,
        ..RangeObservation::default()
    }
}

fn satellite_block(scheme: CompressionScheme, satellites: usize, signals: usize) -> Vec<u8> {
    let mut compressor = RangeCompressor::new(scheme, 1.0);
    for sat in 0..satellites {
        let base = 21_000_000.0 + sat as f64 * 1_000.0;
        let velocity = 35.0 - sat as f64 * 2.5;
        let group: Vec<RangeObservation> = GPS_SIGNALS
            .iter()
            .take(signals)
            .enumerate()
            .map(|(i, &code)| {
                let n = i as f64;
                gps_signal(scheme, 1 + sat as u16, code, base + n * 0.5, base + 1.0 + n * 0.25, velocity)
            })
            .collect();
        compressor.push_satellite(sat as u8, &group).expect("satellite fits");
    }
    compressor.finish()
}

/// A `SATELLITE_SIGNAL` block with `satellites` GPS satellites of up to six
/// signals each.
///
/// # Panics
/// Panics if an observation does not fit the block layout.
#[must_use]
pub fn satellite_signal_block(satellites: usize, signals: usize) -> Vec<u8> {
    satellite_block(CompressionScheme::SatelliteSignal, satellites, signals)
}

/// A `BIT_PACKED` block of reference blocks with `satellites` GPS
/// satellites, at most 32, of up to six signals each.
///
/// # Panics
/// Panics if an observation does not fit the block layout.
#[must_use]
pub fn bit_packed_block(satellites: usize, signals: usize) -> Vec<u8> {
    satellite_block(CompressionScheme::BitPacked, satellites, signals)
}

/// A compressed range log with `count` records.
#[must_use]
pub fn rangecmp(count: usize) -> GenericMessage {
    GenericMessage::new(header(140, 2), vec![FieldValue::Bytes(range_block(count))])
}

/// Encodes `msg` in `format`.
///
/// # Panics
/// Panics if the fixture does not encode.
#[must_use]
pub fn encoded(codec: &Codec, msg: &GenericMessage, format: Format) -> Vec<u8> {
    codec.encode(msg, format).expect("fixture encodes").to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_round_trip() {
        let codec = codec();
        for msg in [bestpos(), satvis(12), rangecmp(20)] {
            for format in Format::ALL {
                let bytes = encoded(&codec, &msg, format);
                assert!(codec.decode(&bytes, format).is_ok(), "{format}");
            }
        }
    }

    #[test]
    fn test_blocks_decompress() {
        let codec = codec();
        let msg = rangecmp(20);
        let obs = codec.decompress_field(&msg, "range_data").unwrap().decompress_all().unwrap();
        assert_eq!(obs.len(), 20);

        let block = satellite_signal_block(4, 3);
        let obs = rxlog_codec::RangeDecompressor::new(&block, CompressionScheme::SatelliteSignal, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(obs.len(), 12);

        let block = bit_packed_block(24, 4);
        let obs = rxlog_codec::RangeDecompressor::new(&block, CompressionScheme::BitPacked, 1.0)
            .decompress_all()
            .unwrap();
        assert_eq!(obs.len(), 96);
        assert!(obs.iter().all(|o| o.adr.is_finite()));
    }
}
