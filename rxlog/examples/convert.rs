//! Converts one receiver log between formats.
//!
//! Run with: `cargo run --example convert -- <schema.json> <log-file> <format> [from-format]`
//!
//! Without arguments a built-in schema and log are converted to every format.
//! Binary output is printed as hex. Set `RUST_LOG=rxlog_codec=trace` to see
//! per-message tracing.

use anyhow::{Context, bail};
use rxlog::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEMO_SCHEMA: &str = r#"{
    "enums": [
        {"_id": "1", "name": "SolStatus", "enumerators": [
            {"name": "SOL_COMPUTED", "value": 0}, {"name": "INSUFFICIENT_OBS", "value": 1}
        ]},
        {"_id": "2", "name": "PortAddress", "enumerators": [{"name": "COM1", "value": 32}]}
    ],
    "messages": [
        {"name": "BESTPOS", "messageID": 42, "fields": [
            {"name": "sol_status", "type": "ENUM", "dataType": {"name": "ENUM", "length": 4}, "enumID": "1"},
            {"name": "lat", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}, "conversionString": "%.11lf"},
            {"name": "lon", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}, "conversionString": "%.11lf"},
            {"name": "hgt", "type": "SIMPLE", "dataType": {"name": "DOUBLE"}, "conversionString": "%.4lf"},
            {"name": "stn_id", "type": "STRING", "arrayLength": 4},
            {"name": "num_svs", "type": "SIMPLE", "dataType": {"name": "UCHAR"}}
        ]}
    ]
}"#;

const DEMO_LOG: &str = "{\"header\":{\"message\":\"BESTPOS\",\"id\":42,\"port\":\"COM1\",\"sequence_num\":0,\
\"percent_idle_time\":83.5,\"time_status\":\"FINESTEERING\",\"week\":2163,\"seconds\":329760.0,\
\"receiver_status\":37748736,\"HEADER_reserved1\":0,\"receiver_sw_version\":16248},\
\"body\":{\"sol_status\":\"SOL_COMPUTED\",\"lat\":51.15043711111,\"lon\":-114.03067767779,\
\"hgt\":1097.2099,\"stn_id\":\"0\",\"num_svs\":21}}";

fn print(format: Format, encoded: &[u8]) {
    match format {
        Format::Binary | Format::FlattenedBinary => println!("{format}: {}", hex::encode(encoded)),
        _ => println!("{format}: {}", String::from_utf8_lossy(encoded).trim_end()),
    }
}

fn demo() -> anyhow::Result<()> {
    let codec = Codec::new(Arc::new(MessageDatabase::from_json(DEMO_SCHEMA)?));
    let (format, msg) = codec.decode_auto(DEMO_LOG.as_bytes())?;
    tracing::info!(%format, id = msg.message_id(), "decoded demo log");
    for target in Format::ALL {
        print(target, &codec.encode(&msg, target)?);
    }
    Ok(())
}

fn convert(args: &[String]) -> anyhow::Result<()> {
    let [schema, log, target, rest @ ..] = args else {
        bail!("usage: convert <schema.json> <log-file> <format> [from-format]");
    };
    let db = MessageDatabase::from_path(schema).with_context(|| format!("loading {schema}"))?;
    tracing::info!(messages = db.len(), "loaded schema");
    let codec = Codec::new(Arc::new(db));

    let input = std::fs::read(log).with_context(|| format!("reading {log}"))?;
    let target: Format = target.parse().map_err(anyhow::Error::msg)?;
    let msg = match rest.first() {
        Some(from) => codec.decode(&input, from.parse().map_err(anyhow::Error::msg)?)?,
        None => codec.decode_auto(&input)?.1,
    };
    print(target, &codec.encode(&msg, target)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() { demo() } else { convert(&args) }
}
