//! Primitive text parsing and zcode encoding of analyzed values.

use crate::zedc::{
    zed::{Primitive, zcode},
    zson::{Value, ZsonError},
};
use chrono::DateTime;
use std::net::IpAddr;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Encodes an analyzed value as a single tagged zcode value.
pub fn build(v: &Value) -> Result<Vec<u8>, ZsonError> {
    let mut b = zcode::Builder::new();
    build_into(&mut b, v)?;
    Ok(b.into_bytes())
}

fn build_into(b: &mut zcode::Builder, v: &Value) -> Result<(), ZsonError> {
    match v {
        Value::Null { .. } => b.append(None),
        Value::Primitive { ty, text } => {
            let p = ty
                .as_primitive()
                .ok_or_else(|| value_err(format!("{ty} is not a primitive type")))?;
            let body = parse_primitive(p, text)?;
            b.append(body.as_deref());
        }
        Value::Record { fields, .. } => {
            b.begin_container();
            for f in fields {
                build_into(b, f)?;
            }
            b.end_container();
        }
        Value::Array { elems, .. } => {
            b.begin_container();
            for e in elems {
                build_into(b, e)?;
            }
            b.end_container();
        }
        Value::Set { elems, .. } => {
            // Set bodies are sorted and deduplicated by encoding.
            let mut encoded = elems.iter().map(build).collect::<Result<Vec<_>, _>>()?;
            encoded.sort();
            encoded.dedup();
            b.begin_container();
            for e in encoded {
                append_raw(b, &e);
            }
            b.end_container();
        }
        Value::Map { entries, .. } => {
            b.begin_container();
            for (k, val) in entries {
                build_into(b, k)?;
                build_into(b, val)?;
            }
            b.end_container();
        }
        Value::Union {
            selector, value, ..
        } => {
            if *selector < 0 {
                b.append(None);
            } else {
                b.begin_container();
                b.append_uint(*selector as u64);
                build_into(b, value)?;
                b.end_container();
            }
        }
        Value::Enum { selector, .. } => b.append_uint(*selector),
        Value::TypeValue { value, .. } => b.append_uint(u64::from(value.id())),
        Value::Error { value, .. } => build_into(b, value)?,
    }
    Ok(())
}

/// Splices an already tagged value into the builder.
fn append_raw(b: &mut zcode::Builder, tagged: &[u8]) {
    match zcode::Iter::new(tagged).next() {
        Some(Ok(body)) => b.append(body),
        _ => b.append(None),
    }
}

/// Parses primitive text as `p`, returning the zcode body or `None` for null.
pub fn parse_primitive(p: Primitive, text: &str) -> Result<Option<Vec<u8>>, ZsonError> {
    let bad = || value_err(format!("cannot parse {text:?} as {p}"));
    let body = match p {
        Primitive::Uint8 | Primitive::Uint16 | Primitive::Uint32 | Primitive::Uint64 => {
            let u: u64 = text.parse().map_err(|_| bad())?;
            let max = match p {
                Primitive::Uint8 => u64::from(u8::MAX),
                Primitive::Uint16 => u64::from(u16::MAX),
                Primitive::Uint32 => u64::from(u32::MAX),
                _ => u64::MAX,
            };
            if u > max {
                return Err(bad());
            }
            zcode::encode_uint(u)
        }
        Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64 => {
            let i: i64 = text.parse().map_err(|_| bad())?;
            let (min, max) = match p {
                Primitive::Int8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
                Primitive::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
                Primitive::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
                _ => (i64::MIN, i64::MAX),
            };
            if !(min..=max).contains(&i) {
                return Err(bad());
            }
            zcode::encode_int(i)
        }
        Primitive::Duration => zcode::encode_int(parse_duration(text)?),
        Primitive::Time => zcode::encode_int(parse_time(text)?),
        Primitive::Float16 => zcode::encode_float16(parse_float(text).ok_or_else(bad)? as f32),
        Primitive::Float32 => zcode::encode_float32(parse_float(text).ok_or_else(bad)? as f32),
        Primitive::Float64 => zcode::encode_float64(parse_float(text).ok_or_else(bad)?),
        Primitive::Bool => match text {
            "true" => zcode::encode_bool(true),
            "false" => zcode::encode_bool(false),
            _ => return Err(bad()),
        },
        Primitive::Bytes => parse_bytes(text)?,
        Primitive::String | Primitive::Error => text.as_bytes().to_vec(),
        Primitive::Bstring => unescape_bstring(text)?,
        Primitive::Ip => zcode::encode_ip(text.parse::<IpAddr>().map_err(|_| bad())?),
        Primitive::Net => {
            let (addr, prefix) = parse_net(text)?;
            zcode::encode_net(addr, prefix)
        }
        Primitive::Type => return Err(value_err("type values must be written as <type>")),
        Primitive::Null => {
            if !text.is_empty() {
                return Err(value_err(format!("null value with text {text:?}")));
            }
            return Ok(None);
        }
    };
    Ok(Some(body))
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "Inf" | "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" | "+NaN" | "-NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

pub fn parse_bytes(text: &str) -> Result<Vec<u8>, ZsonError> {
    let hex = text
        .strip_prefix("0x")
        .ok_or_else(|| value_err(format!("bytes value {text:?} must start with 0x")))?;
    if hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(value_err(format!("invalid hex in bytes value {text:?}")));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<_, _>>()
        .map_err(|_| value_err(format!("invalid hex in bytes value {text:?}")))
}

fn unescape_bstring(text: &str) -> Result<Vec<u8>, ZsonError> {
    let src = text.as_bytes();
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\\' && src.get(i + 1) == Some(&b'x') {
            let hex = src
                .get(i + 2..i + 4)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| value_err(format!("bad \\x escape in bstring {text:?}")))?;
            out.push(hex);
            i += 4;
            continue;
        }
        out.push(src[i]);
        i += 1;
    }
    Ok(out)
}

/// Parses an RFC 3339 timestamp into nanoseconds since the epoch.
pub fn parse_time(text: &str) -> Result<i64, ZsonError> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .and_then(|t| t.timestamp_nanos_opt())
        .ok_or_else(|| value_err(format!("cannot parse {text:?} as time")))
}

pub fn format_time(ns: i64) -> String {
    DateTime::from_timestamp_nanos(ns).to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

fn unit_nanos(unit: &str) -> Option<i128> {
    let n = match unit {
        "ns" => 1,
        "us" | "µs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        "d" => 86_400 * NANOS_PER_SEC,
        "w" => 7 * 86_400 * NANOS_PER_SEC,
        "y" => 365 * 86_400 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(n)
}

/// Parses a duration such as `1h30m` or `-1.5s` into nanoseconds.
///
/// Accumulates in 128 bits so the most negative duration parses exactly.
pub fn parse_duration(text: &str) -> Result<i64, ZsonError> {
    let bad = || value_err(format!("cannot parse {text:?} as duration"));
    let (neg, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if rest.is_empty() {
        return Err(bad());
    }
    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(a) => {
                let n = a.bytes().take_while(u8::is_ascii_digit).count();
                a.split_at(n)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        let unit_len = after
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_len);
        let scale = unit_nanos(unit).ok_or_else(bad)?;
        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| bad())?
        };
        total = whole
            .checked_mul(scale)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(bad)?;
        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(18)];
            let f: i128 = digits.parse().map_err(|_| bad())?;
            total += f * scale / 10i128.pow(digits.len() as u32);
        }
        if total > i128::from(i64::MAX) + 1 {
            return Err(bad());
        }
        rest = next;
    }
    let signed = if neg { -total } else { total };
    i64::try_from(signed).map_err(|_| bad())
}

/// Formats nanoseconds in the canonical duration form, e.g. `1h2m3.5s`.
pub fn format_duration(ns: i64) -> String {
    if ns == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    if ns < 0 {
        out.push('-');
    }
    let mut n = i128::from(ns).unsigned_abs();
    let sec = NANOS_PER_SEC as u128;
    if n < sec {
        let (unit, scale) = if n < 1_000 {
            ("ns", 1u128)
        } else if n < 1_000_000 {
            ("us", 1_000)
        } else {
            ("ms", 1_000_000)
        };
        out.push_str(&fraction(n / scale, n % scale, scale));
        out.push_str(unit);
        return out;
    }
    let hours = n / (3_600 * sec);
    n %= 3_600 * sec;
    let mins = n / (60 * sec);
    n %= 60 * sec;
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || mins > 0 {
        out.push_str(&format!("{mins}m"));
    }
    out.push_str(&fraction(n / sec, n % sec, sec));
    out.push('s');
    out
}

fn fraction(whole: u128, rem: u128, scale: u128) -> String {
    if rem == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let frac = format!("{rem:0width$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Parses `addr/prefix` notation.
pub fn parse_net(text: &str) -> Result<(IpAddr, u8), ZsonError> {
    let bad = || value_err(format!("cannot parse {text:?} as net"));
    let (addr, prefix) = text.split_once('/').ok_or_else(bad)?;
    let addr: IpAddr = addr.parse().map_err(|_| bad())?;
    let prefix: u8 = prefix.parse().map_err(|_| bad())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(bad());
    }
    Ok((addr, prefix))
}

fn value_err(msg: impl Into<String>) -> ZsonError {
    ZsonError::Value(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::{
        zed::{Context, zcode::decode_int},
        zson::{Analyzer, parse_value_str},
    };

    #[test]
    fn durations() {
        assert_eq!(parse_duration("1h30m").unwrap(), 5_400_000_000_000);
        assert_eq!(parse_duration("-1.5s").unwrap(), -1_500_000_000);
        assert_eq!(parse_duration("250µs").unwrap(), 250_000);
        assert_eq!(parse_duration("1d").unwrap(), 86_400_000_000_000);
        assert_eq!(parse_duration("-2562047h47m16.854775808s").unwrap(), i64::MIN);
        assert!(parse_duration("2562047h47m16.854775808s").is_err());
        assert!(parse_duration("1x").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10").is_err());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(5_400_000_000_000), "1h30m0s");
        assert_eq!(format_duration(-1_500_000_000), "-1.5s");
        assert_eq!(format_duration(250_000), "250us");
        assert_eq!(format_duration(1_500), "1.5us");
        assert_eq!(format_duration(0), "0s");
        assert_eq!(parse_duration(&format_duration(i64::MIN)).unwrap(), i64::MIN);
    }

    #[test]
    fn times() {
        let ns = parse_time("1970-01-01T00:00:01.5Z").unwrap();
        assert_eq!(ns, 1_500_000_000);
        assert_eq!(format_time(ns), "1970-01-01T00:00:01.500Z");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn integer_ranges() {
        assert!(parse_primitive(Primitive::Uint8, "255").is_ok());
        assert_eq!(
            parse_primitive(Primitive::Uint8, "256").unwrap_err().to_string(),
            "cannot parse \"256\" as uint8"
        );
        assert!(parse_primitive(Primitive::Int8, "-129").is_err());
        assert_eq!(parse_primitive(Primitive::Null, "").unwrap(), None);
    }

    #[test]
    fn bytes_and_bstrings() {
        assert_eq!(parse_bytes("0x0aff").unwrap(), vec![0x0a, 0xff]);
        assert!(parse_bytes("0x0").is_err());
        assert_eq!(unescape_bstring("a\\x00b").unwrap(), b"a\0b".to_vec());
    }

    #[test]
    fn nets() {
        let (addr, prefix) = parse_net("10.0.0.0/8").unwrap();
        assert_eq!((addr.to_string().as_str(), prefix), ("10.0.0.0", 8));
        assert!(parse_net("10.0.0.0/33").is_err());
    }

    #[test]
    fn builds_records() {
        let zctx = Context::new();
        let ast = parse_value_str("{a:-1,b:null}").unwrap();
        let v = Analyzer::new(&zctx).convert_value(&ast).unwrap();
        let bytes = build(&v).unwrap();
        let body = zcode::Iter::new(&bytes).next().unwrap().unwrap().unwrap();
        let fields: Vec<_> = zcode::Iter::new(body).collect::<Result<_, _>>().unwrap();
        assert_eq!(decode_int(fields[0].unwrap()), -1);
        assert_eq!(fields[1], None);
    }

    #[test]
    fn sets_are_sorted_and_deduped() {
        let zctx = Context::new();
        let ast = parse_value_str("|[3,1,3]|").unwrap();
        let v = Analyzer::new(&zctx).convert_value(&ast).unwrap();
        let bytes = build(&v).unwrap();
        let body = zcode::Iter::new(&bytes).next().unwrap().unwrap().unwrap();
        let elems: Vec<_> = zcode::Iter::new(body).collect::<Result<_, _>>().unwrap();
        assert_eq!(elems.len(), 2);
    }
}
