//! Literal log lines and error paths through the public codec API.

use rxlog_codec::{
    Codec, CodecError, CrcPolicy, FieldValue, Format, GenericMessage, LogHeader, MessageKey, TimeStatus,
};
use rxlog_core::HeaderKind;
use rxlog_core::crc32;
use rxlog_schema::MessageDatabase;
use std::sync::Arc;

const SCHEMA: &str = r#"{
    "enums": [{"_id": "2", "name": "PortAddress", "enumerators": [{"name": "COM1", "value": 32}]}],
    "messages": [
        {"name": "TEMPS", "messageID": 300, "fields": [
            {"name": "sensor", "type": "SIMPLE", "dataType": {"name": "ULONG"}},
            {"name": "celsius", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}}
        ]},
        {"name": "READINGS", "messageID": 301, "fields": [
            {"name": "values", "type": "VARIABLE_LENGTH_ARRAY", "dataType": {"name": "ULONG"}, "arrayLength": 15000}
        ]}
    ]
}"#;

fn codec() -> Codec {
    Codec::new(Arc::new(MessageDatabase::from_json(SCHEMA).unwrap()))
}

fn line(content: &str) -> String {
    format!("{content}*{:08x}\r\n", crc32(&content.as_bytes()[1..]))
}

#[test]
fn two_field_ascii_line() {
    let text = line("#TEMPSA,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7,-12.25");
    let msg = codec().decode(text.as_bytes(), Format::Ascii).unwrap();

    assert_eq!(msg.message_id(), 300);
    assert_eq!(msg.fields, vec![FieldValue::UInt(7), FieldValue::Float(-12.25)]);
    assert_eq!(msg.header.port, 32);
    assert_eq!(msg.header.sequence, 12);
    assert_eq!(msg.header.idle_time, 120);
    assert_eq!(msg.header.time_status(), Some(TimeStatus::FineSteering));
    assert_eq!(msg.header.week, 2163);
    assert_eq!(msg.header.milliseconds, 329_760_500);
    assert_eq!(msg.header.receiver_status, 0x0200_0000);
    assert_eq!(msg.header.receiver_sw_version, 16_248);

    let encoded = codec().encode(&msg, Format::Ascii).unwrap();
    assert_eq!(encoded, text.as_bytes());
}

#[test]
fn corrupted_crc_digit() {
    let text = line("#TEMPSA,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7,-12.25");
    let star = text.find('*').unwrap();
    let mut corrupt = text.into_bytes();
    corrupt[star + 1] = if corrupt[star + 1] == b'0' { b'1' } else { b'0' };

    assert!(matches!(
        codec().decode(&corrupt, Format::Ascii),
        Err(CodecError::CrcMismatch { .. })
    ));

    let lenient = Codec::builder(Arc::clone(codec().database()))
        .crc_policy(CrcPolicy::Warn)
        .build();
    let msg = lenient.decode(&corrupt, Format::Ascii).unwrap();
    assert_eq!(msg.fields[0], FieldValue::UInt(7));
}

#[test]
fn field_text_errors_name_the_field() {
    let text = line("#TEMPSA,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7,warm");
    match codec().decode(text.as_bytes(), Format::Ascii).unwrap_err() {
        CodecError::FieldConversion { field, offset, .. } => {
            assert_eq!(field, "celsius");
            assert_eq!(offset, text.find("warm").unwrap());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_message_name() {
    let text = line("#OTHERA,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7");
    match codec().decode(text.as_bytes(), Format::Ascii).unwrap_err() {
        CodecError::UnknownMessageId { key } => assert_eq!(key, MessageKey::Name("OTHER".to_string())),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn short_binary_buffers() {
    let codec = codec();
    let text = line("#TEMPSA,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7,-12.25");
    let msg = codec.decode(text.as_bytes(), Format::Ascii).unwrap();
    let binary = codec.encode(&msg, Format::Binary).unwrap();
    assert_eq!(binary.len(), 28 + 12 + 4);

    for len in [3, 20, 28, 39, binary.len() - 1] {
        match codec.decode(&binary[..len], Format::Binary).unwrap_err() {
            CodecError::BufferTooShort { required, available } => {
                assert_eq!(available, len);
                assert!(required > len);
            }
            other => panic!("unexpected error for {len} bytes: {other}"),
        }
    }
}

#[test]
fn format_family_mismatch() {
    let codec = codec();
    let text = line("#TEMPSA,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7,-12.25");
    for format in [Format::Binary, Format::FlattenedBinary, Format::AbbreviatedAscii, Format::Json] {
        assert!(matches!(
            codec.decode(text.as_bytes(), format),
            Err(CodecError::UnsupportedFormatCombination { .. })
        ));
    }
}

#[test]
fn abbreviated_positional_and_keyed_agree() {
    let codec = codec();
    let positional = line("<TEMPS,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;7,-12.25");
    let keyed = line("<TEMPS,COM1,12,60.0,FINESTEERING,2163,329760.500,02000000,0000,16248;celsius=-12.25,sensor=7");
    let a = codec.decode(positional.as_bytes(), Format::AbbreviatedAscii).unwrap();
    let b = codec.decode(keyed.as_bytes(), Format::AbbreviatedAscii).unwrap();
    assert_eq!(a, b);

    let encoded = codec.encode(&a, Format::AbbreviatedAscii).unwrap();
    let text = std::str::from_utf8(&encoded).unwrap();
    assert!(text.contains(";sensor=7,celsius=-12.25*"), "{text}");
}

#[test]
fn large_message_round_trips_in_every_format() {
    let codec = codec();
    let values = (0..15_000u64).map(|v| FieldValue::UInt(v * 100_003 % 4_000_000_000)).collect();
    let msg = GenericMessage::new(
        LogHeader::new(301).with_time(2163, 329_760_500),
        vec![FieldValue::Array(values)],
    );

    let binary = codec.encode(&msg, Format::Binary).unwrap();
    assert_eq!(binary.len(), 28 + 4 + 15_000 * 4 + 4);
    for format in Format::ALL {
        let encoded = codec.encode(&msg, format).unwrap();
        assert_eq!(codec.decode(&encoded, format).unwrap(), msg, "{format}");
    }

    let ascii = codec.transcode(&binary, Format::Binary, Format::Ascii).unwrap();
    assert!(ascii.len() > codec.config().max_message_length);
    let back = codec.transcode(&ascii, Format::Ascii, Format::Binary).unwrap();
    assert_eq!(back, binary);
}

#[test]
fn short_headers_in_every_format() {
    let codec = codec();
    let text = line("%TEMPSA,2163,329760.500;7,-12.25");
    let (format, msg) = codec.decode_auto(text.as_bytes()).unwrap();
    assert_eq!(format, Format::Ascii);
    assert!(msg.header.is_short());
    assert_eq!(msg.header.milliseconds, 329_760_500);
    assert_eq!(msg.header.time_status(), Some(TimeStatus::Unknown));
    assert_eq!(codec.encode(&msg, Format::Ascii).unwrap(), text.as_bytes());

    for format in Format::ALL {
        let encoded = codec.encode(&msg, format).unwrap();
        assert_eq!(codec.decode(&encoded, format).unwrap(), msg, "{format}");
    }

    let binary = codec.encode(&msg, Format::Binary).unwrap();
    assert_eq!(&binary[..4], &[0xAA, 0x44, 0x13, 12]);
    let (format, decoded) = codec.decode_auto(&binary).unwrap();
    assert_eq!(format, Format::Binary);
    assert_eq!(decoded.header.kind, HeaderKind::Short);
}
