//! Text log framing and header shared by ASCII and abbreviated ASCII.
//!
//! ```text
//! #NAMEA[_src],PORT,SEQ,IDLE,TIMESTATUS,WEEK,SECONDS,RXSTATUS,DEFCRC,SWVER;BODY*xxxxxxxx\r\n
//! %NAMEA[_src],WEEK,SECONDS;BODY*xxxxxxxx\r\n
//! ```
//!
//! The second line is the short header. The trailer CRC covers every byte
//! between the sync character and `*`.

use crate::config::CodecConfig;
use crate::error::{CodecError, MessageKey, Result};
use crate::text::{Token, find_unquoted, split_tokens};
use rxlog_core::{HeaderKind, LogHeader, TimeStatus, crc32};
use rxlog_schema::{MessageDatabase, MessageDef};
use std::fmt::Write;
use std::sync::Arc;

/// Name of the database enum holding symbolic port names.
pub const PORT_ENUM: &str = "PortAddress";

const HEADER_TOKENS: usize = 10;
const SHORT_HEADER_TOKENS: usize = 3;
const CRC_DIGITS: usize = 8;
const MAX_SOURCE: u8 = 0x1f;

/// Split text log: header tokens and the body between `;` and `*`.
#[derive(Debug)]
pub(crate) struct TextFrame<'a> {
    pub kind: HeaderKind,
    pub header: Vec<Token<'a>>,
    pub body: &'a str,
    pub body_offset: usize,
}

/// Checks the sync character, terminator and CRC, then splits header from body.
pub(crate) fn parse_frame<'a>(config: &CodecConfig, input: &'a [u8], sync: u8) -> Result<TextFrame<'a>> {
    let text = std::str::from_utf8(input)
        .map_err(|e| CodecError::malformed(e.valid_up_to(), "text log is not valid UTF-8"))?;
    if text.as_bytes().first() != Some(&sync) {
        return Err(CodecError::malformed(
            0,
            format!("expected sync character '{}'", char::from(sync)),
        ));
    }

    let line = match text.strip_suffix("\r\n") {
        Some(line) => line,
        None if config.require_line_terminator => {
            return Err(CodecError::malformed(text.len(), "missing \\r\\n terminator"));
        }
        None => text.trim_end_matches(['\r', '\n']),
    };

    let star = line
        .rfind('*')
        .ok_or_else(|| CodecError::malformed(line.len(), "missing CRC trailer"))?;
    let digits = &line[star + 1..];
    if digits.len() != CRC_DIGITS || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::malformed(
            star + 1,
            format!("CRC trailer '{digits}' is not {CRC_DIGITS} hex digits"),
        ));
    }
    let expected = u32::from_str_radix(digits, 16).map_err(|_| CodecError::malformed(star + 1, "bad CRC trailer"))?;
    config.check_crc(expected, crc32(&line.as_bytes()[1..star]))?;

    let content = &line[1..star];
    let semi = find_unquoted(content, b';').ok_or_else(|| CodecError::malformed(1, "missing ';' after header"))?;
    let header = split_tokens(&content[..semi], 1);
    let kind = match header.len() {
        HEADER_TOKENS => HeaderKind::Full,
        SHORT_HEADER_TOKENS => HeaderKind::Short,
        found => {
            return Err(CodecError::malformed(
                1,
                format!("expected {HEADER_TOKENS} or {SHORT_HEADER_TOKENS} header fields, found {found}"),
            ));
        }
    };
    Ok(TextFrame {
        kind,
        header,
        body: &content[semi + 1..],
        body_offset: semi + 2,
    })
}

/// Resolves the message name and decodes the remaining header fields.
///
/// With `name_suffix` set the name must end in that character (the ASCII
/// `A`), which is stripped before the database lookup. Three tokens make a
/// short header.
pub(crate) fn parse_header(
    db: &MessageDatabase,
    tokens: &[Token<'_>],
    name_suffix: Option<char>,
) -> Result<(Arc<MessageDef>, LogHeader)> {
    let Some(&name) = tokens.first() else {
        return Err(CodecError::malformed(1, "missing message name"));
    };
    let (def, source) = resolve_name(db, name, name_suffix)?;
    let mut header = LogHeader::new(def.id);
    header.measurement_source = source;
    if let [_, week, seconds] = tokens {
        header.kind = HeaderKind::Short;
        header.week = number(*week, "week")?;
        header.set_seconds(number::<f64>(*seconds, "seconds")?);
        return Ok((def, header));
    }
    if tokens.len() != HEADER_TOKENS {
        return Err(CodecError::malformed(
            name.offset,
            format!("expected {HEADER_TOKENS} header fields, found {}", tokens.len()),
        ));
    }
    header.port = parse_port(db, tokens[1])?;
    header.sequence = number(tokens[2], "sequence")?;
    header.set_idle_percent(number::<f64>(tokens[3], "idle time")?);
    header.time_status = match TimeStatus::from_name(tokens[4].text) {
        Some(status) => status as u8,
        None => number(tokens[4], "time status")?,
    };
    header.week = number(tokens[5], "week")?;
    header.set_seconds(number::<f64>(tokens[6], "seconds")?);
    header.receiver_status = hex_number(tokens[7], "receiver status")?;
    header.message_definition_crc = hex_number::<u16>(tokens[8], "definition CRC")?;
    header.receiver_sw_version = number(tokens[9], "software version")?;
    Ok((def, header))
}

/// Looks up the definition named by a header's first token and returns it
/// with the measurement source.
///
/// A trailing `_<digits>` is the source only when the whole token does not
/// already name a message.
pub(crate) fn resolve_name(
    db: &MessageDatabase,
    token: Token<'_>,
    name_suffix: Option<char>,
) -> Result<(Arc<MessageDef>, u8)> {
    let whole = strip_name_suffix(token.text, name_suffix, token.offset)
        .ok()
        .and_then(|name| db.lookup_name(name));
    if let Some(def) = whole {
        return Ok((Arc::clone(def), 0));
    }
    let (name, source) = split_source(token)?;
    let name = strip_name_suffix(name, name_suffix, token.offset)?;
    let def = db
        .lookup_name(name)
        .ok_or_else(|| CodecError::UnknownMessageId {
            key: MessageKey::Name(name.to_string()),
        })?;
    Ok((Arc::clone(def), source))
}

fn strip_name_suffix(name: &str, suffix: Option<char>, offset: usize) -> Result<&str> {
    match suffix {
        Some(suffix) => name.strip_suffix(suffix).ok_or_else(|| {
            CodecError::malformed(offset, format!("message name '{name}' lacks the '{suffix}' suffix"))
        }),
        None => Ok(name),
    }
}

fn split_source(token: Token<'_>) -> Result<(&str, u8)> {
    match token.text.rsplit_once('_') {
        Some((name, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            let source = digits
                .parse::<u8>()
                .ok()
                .filter(|s| *s <= MAX_SOURCE)
                .ok_or_else(|| CodecError::malformed(token.offset, format!("bad measurement source '{digits}'")))?;
            Ok((name, source))
        }
        _ => Ok((token.text, 0)),
    }
}

fn parse_port(db: &MessageDatabase, token: Token<'_>) -> Result<u8> {
    let symbolic = db
        .enum_by_name(PORT_ENUM)
        .and_then(|ports| ports.value_of(token.text))
        .and_then(|v| u8::try_from(v).ok());
    match symbolic {
        Some(port) => Ok(port),
        None => number(token, "port"),
    }
}

fn number<T: std::str::FromStr>(token: Token<'_>, what: &str) -> Result<T> {
    token
        .text
        .parse()
        .map_err(|_| CodecError::malformed(token.offset, format!("bad {what} '{}'", token.text)))
}

fn hex_number<T: TryFrom<u32>>(token: Token<'_>, what: &str) -> Result<T> {
    u32::from_str_radix(token.text, 16)
        .ok()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| CodecError::malformed(token.offset, format!("bad {what} '{}'", token.text)))
}

/// Appends sync, name and header fields up to and including the `;`.
///
/// A short header writes only the week and seconds after the name.
pub(crate) fn write_header(
    out: &mut String,
    db: &MessageDatabase,
    def: &MessageDef,
    header: &LogHeader,
    sync: u8,
    name_suffix: Option<char>,
) {
    out.push(char::from(sync));
    out.push_str(&def.name);
    if let Some(suffix) = name_suffix {
        out.push(suffix);
    }
    if header.measurement_source != 0 {
        let _ = write!(out, "_{}", header.measurement_source);
    }
    if header.is_short() {
        let _ = write!(out, ",{},{:.3};", header.week, header.seconds());
        return;
    }
    out.push(',');
    match db
        .enum_by_name(PORT_ENUM)
        .and_then(|ports| ports.name_of(i32::from(header.port)))
    {
        Some(port) => out.push_str(port),
        None => {
            let _ = write!(out, "{}", header.port);
        }
    }
    let _ = write!(out, ",{},{:.1},", header.sequence, header.idle_percent());
    match header.time_status() {
        Some(status) => out.push_str(status.as_str()),
        None => {
            let _ = write!(out, "{}", header.time_status);
        }
    }
    let _ = write!(
        out,
        ",{},{:.3},{:08x},{:04x},{};",
        header.week,
        header.seconds(),
        header.receiver_status,
        header.message_definition_crc,
        header.receiver_sw_version
    );
}

/// Appends the CRC trailer and terminator to a line starting at `start`.
pub(crate) fn finish_line(out: &mut String, start: usize) {
    let crc = crc32(&out.as_bytes()[start + 1..]);
    let _ = write!(out, "*{crc:08x}\r\n");
}
