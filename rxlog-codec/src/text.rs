//! Scalar text conversion shared by the ASCII, abbreviated ASCII and header
//! paths.
//!
//! Floats without a precision print the shortest text that parses back to
//! the same value (`f32` for `FLOAT`), so text transcoding is lossless for
//! those fields.

use crate::message::{FieldValue, SatelliteId, Scalar, check_signed, check_unsigned};
use rxlog_schema::{Conversion, ConversionSpec, DataType, EnumDef};
use std::fmt::Write;

/// One comma-separated token and its byte offset in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub text: &'a str,
    pub offset: usize,
}

/// Splits `text` on commas outside double quotes.
///
/// An empty input yields no tokens; otherwise `n` commas yield `n + 1`
/// tokens. `base` is the offset of `text` in the input.
pub(crate) fn split_tokens(text: &str, base: usize) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    if text.is_empty() {
        return tokens;
    }
    let mut start = 0;
    let mut quoted = false;
    for (idx, byte) in text.bytes().enumerate() {
        match byte {
            b'"' => quoted = !quoted,
            b',' if !quoted => {
                tokens.push(Token {
                    text: &text[start..idx],
                    offset: base + start,
                });
                start = idx + 1;
            }
            _ => {}
        }
    }
    tokens.push(Token {
        text: &text[start..],
        offset: base + start,
    });
    tokens
}

/// Returns the position of the first `needle` outside double quotes.
pub(crate) fn find_unquoted(text: &str, needle: u8) -> Option<usize> {
    let mut quoted = false;
    for (idx, byte) in text.bytes().enumerate() {
        match byte {
            b'"' => quoted = !quoted,
            b if b == needle && !quoted => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Returns true for `%Z` byte arrays printed as one hex token.
pub(crate) fn is_hex_array(data_type: DataType, conversion: Option<&Conversion>) -> bool {
    matches!(conversion, Some(c) if c.spec == ConversionSpec::HexBytes)
        && matches!(data_type, DataType::HexByte | DataType::UChar | DataType::Char)
}

/// Returns true for `%s` character arrays printed as one quoted string.
pub(crate) fn is_char_string(data_type: DataType, conversion: Option<&Conversion>) -> bool {
    matches!(conversion, Some(c) if c.spec == ConversionSpec::String)
        && matches!(data_type, DataType::UChar | DataType::Char)
}

/// Converts byte-array elements to raw bytes.
pub(crate) fn elements_to_bytes(data_type: DataType, values: &[FieldValue]) -> Result<Vec<u8>, String> {
    values
        .iter()
        .map(|v| Scalar::from_value(data_type, v).map(|s| s.bits() as u8))
        .collect()
}

/// Converts raw bytes to byte-array elements.
pub(crate) fn bytes_to_elements(data_type: DataType, bytes: &[u8]) -> Vec<FieldValue> {
    bytes
        .iter()
        .map(|&b| match data_type {
            DataType::Char => FieldValue::Int(i64::from(b as i8)),
            _ => FieldValue::UInt(u64::from(b)),
        })
        .collect()
}

/// Appends a quoted string.
pub(crate) fn write_quoted(out: &mut String, value: &str) -> Result<(), String> {
    if value.contains('"') {
        return Err("string contains a double quote".to_string());
    }
    out.push('"');
    out.push_str(value);
    out.push('"');
    Ok(())
}

/// Parses a quoted string token.
pub(crate) fn parse_quoted(token: &str) -> Result<String, String> {
    token
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|inner| !inner.contains('"'))
        .map(str::to_string)
        .ok_or_else(|| format!("expected a quoted string, found '{token}'"))
}

/// Appends an enum value: its name, or the number when it has none.
pub(crate) fn write_enum(
    out: &mut String,
    def: &EnumDef,
    data_type: DataType,
    value: &FieldValue,
) -> Result<(), String> {
    let v = Scalar::from_enum(data_type, value)?;
    match i32::try_from(v).ok().and_then(|v| def.name_of(v)) {
        Some(name) => out.push_str(name),
        None => {
            let _ = write!(out, "{v}");
        }
    }
    Ok(())
}

/// Parses an enum token: an enumerator name or a number.
pub(crate) fn parse_enum(token: &str, def: &EnumDef, data_type: DataType) -> Result<FieldValue, String> {
    if let Some(v) = def.value_of(token) {
        return Ok(FieldValue::Enum(v));
    }
    let v: i64 = token
        .parse()
        .map_err(|_| format!("'{token}' is not a value of enum {}", def.name))?;
    check_signed(data_type, v)?;
    i32::try_from(v)
        .map(FieldValue::Enum)
        .map_err(|_| format!("enum value {v} out of range"))
}

fn width_mask(data_type: DataType) -> u64 {
    match data_type.size() {
        8 => u64::MAX,
        n => (1u64 << (n * 8)) - 1,
    }
}

fn write_hex(out: &mut String, value: u64, conversion: Option<&Conversion>, default_width: usize) {
    let width = conversion.and_then(|c| c.width).unwrap_or(default_width);
    if matches!(conversion, Some(c) if c.spec == ConversionSpec::UpperHex) {
        let _ = write!(out, "{value:0width$X}");
    } else {
        let _ = write!(out, "{value:0width$x}");
    }
}

/// Formats a float in C `%e` style: `1.234500e+05`.
fn write_exponent(out: &mut String, value: f64, precision: usize) {
    if !value.is_finite() {
        let _ = write!(out, "{value}");
        return;
    }
    let text = format!("{value:.precision$e}");
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            let _ = write!(out, "{mantissa}e{sign}{:02}", exp.unsigned_abs());
        }
        None => out.push_str(&text),
    }
}

fn write_float(out: &mut String, data_type: DataType, value: f64, conversion: Option<&Conversion>) {
    match conversion {
        Some(c) if c.spec == ConversionSpec::Exponent => {
            write_exponent(out, value, c.precision.unwrap_or(6));
        }
        Some(&Conversion {
            precision: Some(p),
            spec: ConversionSpec::Fixed | ConversionSpec::General,
            ..
        }) if value.is_finite() => {
            let _ = write!(out, "{value:.p$}");
        }
        _ if data_type == DataType::Float => {
            let _ = write!(out, "{}", value as f32);
        }
        _ => {
            let _ = write!(out, "{value}");
        }
    }
}

/// Appends a scalar formatted per its type and conversion.
pub(crate) fn write_scalar(
    out: &mut String,
    data_type: DataType,
    conversion: Option<&Conversion>,
    value: &FieldValue,
) -> Result<(), String> {
    let hex = conversion.is_some_and(Conversion::is_hex);
    match Scalar::from_value(data_type, value)? {
        Scalar::Bool(b) => out.push_str(if b { "TRUE" } else { "FALSE" }),
        Scalar::Float(v) => write_float(out, data_type, v, conversion),
        Scalar::SatelliteId(id) => {
            let _ = write!(out, "{id}");
        }
        Scalar::Signed(v) if hex => write_hex(out, v as u64 & width_mask(data_type), conversion, 0),
        Scalar::Signed(v)
            if matches!(conversion, Some(c) if c.spec == ConversionSpec::Char)
                && (v as u8).is_ascii_alphabetic()
                && (0..128).contains(&v) =>
        {
            out.push(char::from(v as u8));
        }
        Scalar::Signed(v) => {
            let _ = write!(out, "{v}");
        }
        Scalar::Unsigned(v) if hex => write_hex(out, v, conversion, 0),
        Scalar::Unsigned(v) if data_type == DataType::HexByte => write_hex(out, v, conversion, 2),
        Scalar::Unsigned(v)
            if matches!(conversion, Some(c) if c.spec == ConversionSpec::Char)
                && (v as u8).is_ascii_alphabetic()
                && v < 128 =>
        {
            out.push(char::from(v as u8));
        }
        Scalar::Unsigned(v) => {
            let _ = write!(out, "{v}");
        }
    }
    Ok(())
}

fn parse_unsigned_text(token: &str, radix: u32) -> Result<u64, String> {
    u64::from_str_radix(token, radix).map_err(|_| {
        if radix == 16 {
            format!("'{token}' is not a hex integer")
        } else {
            format!("'{token}' is not an unsigned integer")
        }
    })
}

fn parse_float(token: &str, data_type: DataType) -> Result<f64, String> {
    let bad = || format!("'{token}' is not a number");
    if data_type == DataType::Float {
        token.parse::<f32>().map(f64::from).map_err(|_| bad())
    } else {
        token.parse::<f64>().map_err(|_| bad())
    }
}

/// Parses a scalar token per its type and conversion.
pub(crate) fn parse_scalar(
    token: &str,
    data_type: DataType,
    conversion: Option<&Conversion>,
) -> Result<FieldValue, String> {
    let hex = conversion.is_some_and(Conversion::is_hex);
    let is_char = matches!(conversion, Some(c) if c.spec == ConversionSpec::Char);
    match data_type {
        DataType::Bool => match token {
            "TRUE" | "true" | "1" => Ok(FieldValue::Bool(true)),
            "FALSE" | "false" | "0" => Ok(FieldValue::Bool(false)),
            _ => Err(format!("'{token}' is not a boolean")),
        },
        DataType::Float | DataType::Double => parse_float(token, data_type).map(FieldValue::Float),
        DataType::SatelliteId => token.parse::<SatelliteId>().map(FieldValue::SatelliteId),
        dt if is_char && token.len() == 1 && token.as_bytes()[0].is_ascii_alphabetic() => {
            let code = token.as_bytes()[0];
            if dt.is_signed() {
                Ok(FieldValue::Int(i64::from(code)))
            } else {
                Ok(FieldValue::UInt(u64::from(code)))
            }
        }
        dt if dt.is_signed() => {
            let v = if hex {
                let raw = parse_unsigned_text(token, 16)?;
                if raw > width_mask(dt) {
                    return Err(format!("hex value {token} too wide for {dt}"));
                }
                let bits = (dt.size() * 8) as u32;
                // sign-extend from the type width
                ((raw << (64 - bits)) as i64) >> (64 - bits)
            } else {
                token
                    .parse::<i64>()
                    .map_err(|_| format!("'{token}' is not an integer"))?
            };
            check_signed(dt, v)?;
            Ok(FieldValue::Int(v))
        }
        dt => {
            let radix = if hex || dt == DataType::HexByte { 16 } else { 10 };
            let v = parse_unsigned_text(token, radix)?;
            check_unsigned(dt, v)?;
            Ok(FieldValue::UInt(v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxlog_schema::Enumerator;

    fn conv(text: &str) -> Conversion {
        Conversion::parse(text).unwrap()
    }

    fn fmt(data_type: DataType, conversion: Option<&str>, value: FieldValue) -> String {
        let conversion = conversion.map(conv);
        let mut out = String::new();
        write_scalar(&mut out, data_type, conversion.as_ref(), &value).unwrap();
        out
    }

    fn parse(data_type: DataType, conversion: Option<&str>, token: &str) -> Result<FieldValue, String> {
        let conversion = conversion.map(conv);
        parse_scalar(token, data_type, conversion.as_ref())
    }

    #[test]
    fn test_split_tokens_respects_quotes() {
        let tokens = split_tokens(r#"1,"a,b",,3"#, 10);
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["1", r#""a,b""#, "", "3"]);
        assert_eq!(tokens[1].offset, 12);
        assert_eq!(tokens[3].offset, 19);
        assert!(split_tokens("", 0).is_empty());
        assert_eq!(find_unquoted(r#""x=1",y=2"#, b'='), Some(7));
        assert_eq!(find_unquoted(r#""x=1""#, b'='), None);
    }

    #[test]
    fn test_integer_text() {
        assert_eq!(fmt(DataType::Long, None, FieldValue::Int(-42)), "-42");
        assert_eq!(fmt(DataType::ULong, Some("%08lx"), FieldValue::UInt(0xbeef)), "0000beef");
        assert_eq!(fmt(DataType::UShort, Some("%X"), FieldValue::UInt(0xbeef)), "BEEF");
        assert_eq!(fmt(DataType::Short, Some("%04x"), FieldValue::Int(-1)), "ffff");
        assert_eq!(fmt(DataType::HexByte, None, FieldValue::UInt(10)), "0a");

        assert_eq!(parse(DataType::Short, Some("%04x"), "ffff"), Ok(FieldValue::Int(-1)));
        assert_eq!(parse(DataType::ULong, Some("%x"), "BEEF"), Ok(FieldValue::UInt(0xbeef)));
        assert_eq!(parse(DataType::HexByte, None, "ff"), Ok(FieldValue::UInt(255)));
        assert!(parse(DataType::UChar, None, "256").is_err());
        assert!(parse(DataType::Short, Some("%x"), "10000").is_err());
        assert!(parse(DataType::Long, None, "1.5").is_err());
    }

    #[test]
    fn test_char_conversion() {
        assert_eq!(fmt(DataType::Char, Some("%c"), FieldValue::Int(i64::from(b'G'))), "G");
        assert_eq!(fmt(DataType::Char, Some("%c"), FieldValue::Int(7)), "7");
        assert_eq!(parse(DataType::Char, Some("%c"), "G"), Ok(FieldValue::Int(71)));
        assert_eq!(parse(DataType::Char, Some("%c"), "7"), Ok(FieldValue::Int(7)));
    }

    #[test]
    fn test_float_text() {
        assert_eq!(fmt(DataType::Double, Some("%.3lf"), FieldValue::Float(1.23456)), "1.235");
        assert_eq!(fmt(DataType::Double, Some("%e"), FieldValue::Float(123456.0)), "1.234560e+05");
        assert_eq!(fmt(DataType::Double, Some("%.2e"), FieldValue::Float(0.00125)), "1.25e-03");
        assert_eq!(fmt(DataType::Double, None, FieldValue::Float(0.1)), "0.1");

        // FLOAT prints the shortest f32 text and parses back exactly
        let widened = f64::from(0.1f32);
        let text = fmt(DataType::Float, None, FieldValue::Float(widened));
        assert_eq!(text, "0.1");
        assert_eq!(parse(DataType::Float, None, &text), Ok(FieldValue::Float(widened)));

        assert_eq!(parse(DataType::Double, Some("%e"), "1.234560e+05"), Ok(FieldValue::Float(123456.0)));
        assert!(parse(DataType::Double, None, "abc").is_err());
    }

    #[test]
    fn test_bool_and_satellite_text() {
        assert_eq!(fmt(DataType::Bool, None, FieldValue::Bool(true)), "TRUE");
        assert_eq!(parse(DataType::Bool, None, "FALSE"), Ok(FieldValue::Bool(false)));
        assert!(parse(DataType::Bool, None, "maybe").is_err());

        let id = FieldValue::SatelliteId(SatelliteId::new(38, -7));
        assert_eq!(fmt(DataType::SatelliteId, None, id.clone()), "38-7");
        assert_eq!(parse(DataType::SatelliteId, None, "38-7"), Ok(id));
    }

    #[test]
    fn test_enum_text() {
        let def = EnumDef::new(
            "1".to_string(),
            "SolStatus".to_string(),
            vec![Enumerator {
                name: "SOL_COMPUTED".to_string(),
                value: 0,
                description: None,
            }],
        );
        let mut out = String::new();
        write_enum(&mut out, &def, DataType::Int, &FieldValue::Enum(0)).unwrap();
        out.push(',');
        write_enum(&mut out, &def, DataType::Int, &FieldValue::Enum(9)).unwrap();
        assert_eq!(out, "SOL_COMPUTED,9");

        assert_eq!(parse_enum("SOL_COMPUTED", &def, DataType::Int), Ok(FieldValue::Enum(0)));
        assert_eq!(parse_enum("9", &def, DataType::Int), Ok(FieldValue::Enum(9)));
        assert!(parse_enum("BOGUS", &def, DataType::Int).is_err());
        assert!(parse_enum("200", &def, DataType::Char).is_err());
    }

    #[test]
    fn test_quoted_strings() {
        let mut out = String::new();
        write_quoted(&mut out, "GPSCARD").unwrap();
        assert_eq!(out, "\"GPSCARD\"");
        assert_eq!(parse_quoted("\"GPSCARD\""), Ok("GPSCARD".to_string()));
        assert_eq!(parse_quoted("\"\""), Ok(String::new()));
        assert!(parse_quoted("GPSCARD").is_err());
        assert!(write_quoted(&mut out, "a\"b").is_err());
    }

    #[test]
    fn test_byte_elements() {
        let values = bytes_to_elements(DataType::HexByte, &[0x00, 0xff]);
        assert_eq!(values, vec![FieldValue::UInt(0), FieldValue::UInt(255)]);
        assert_eq!(elements_to_bytes(DataType::HexByte, &values).unwrap(), vec![0x00, 0xff]);

        let values = bytes_to_elements(DataType::Char, &[0xff]);
        assert_eq!(values, vec![FieldValue::Int(-1)]);
        assert_eq!(elements_to_bytes(DataType::Char, &values).unwrap(), vec![0xff]);

        assert!(is_hex_array(DataType::HexByte, Some(&conv("%Z"))));
        assert!(!is_hex_array(DataType::Double, Some(&conv("%Z"))));
        assert!(is_char_string(DataType::UChar, Some(&conv("%s"))));
    }
}
