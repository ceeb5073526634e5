/// Timestamp parsing for the formats ACME servers emit: RFC 3339 bodies
/// and HTTP-date / delta-seconds `Retry-After` headers.
use crate::error::{AcmeError, Result};
use jiff::{RoundMode, Timestamp, TimestampRound, Unit};

/// Parse an RFC 3339 timestamp into a UTC instant with millisecond
/// precision (fraction truncated toward zero).
///
/// Accepts 0 to 9 fractional digits, case-insensitive `T`/`Z`, and both
/// `±HH:MM` and `±HHMM` offsets. Date-only strings are rejected.
pub fn parse_timestamp(value: &str) -> Result<Timestamp> {
    let normalized = normalize_offset(value);
    let ts: Timestamp = normalized
        .parse()
        .map_err(|e| AcmeError::invalid_input(format!("invalid timestamp {value:?}: {e}")))?;
    ts.round(
        TimestampRound::new()
            .smallest(Unit::Millisecond)
            .mode(RoundMode::Trunc),
    )
    .map_err(|e| AcmeError::invalid_input(format!("invalid timestamp {value:?}: {e}")))
}

/// Insert the colon into a `±HHMM` offset, which RFC 3339 parsers reject
fn normalize_offset(value: &str) -> std::borrow::Cow<'_, str> {
    let bytes = value.as_bytes();
    if bytes.len() >= 5 {
        let offset_at = bytes.len() - 5;
        let sign = bytes[offset_at];
        let has_time = value[..offset_at].bytes().any(|b| b == b'T' || b == b't');
        if has_time
            && (sign == b'+' || sign == b'-')
            && bytes[offset_at + 1..].iter().all(u8::is_ascii_digit)
        {
            let mut fixed = String::with_capacity(value.len() + 1);
            fixed.push_str(&value[..bytes.len() - 2]);
            fixed.push(':');
            fixed.push_str(&value[bytes.len() - 2..]);
            return fixed.into();
        }
    }
    value.into()
}

/// Parse an HTTP-date (RFC 7231, i.e. the RFC 2822 shape with `GMT`)
pub fn parse_http_date(value: &str) -> Result<Timestamp> {
    jiff::fmt::rfc2822::parse(value)
        .map(|zoned| zoned.timestamp())
        .map_err(|e| AcmeError::protocol(format!("invalid HTTP date {value:?}: {e}")))
}

/// Parse a `Retry-After` header value, either delta-seconds or an
/// HTTP-date, into an absolute instant. `None` if the value is malformed.
pub fn parse_retry_after(value: &str, now: Timestamp) -> Option<Timestamp> {
    let value = value.trim();
    if value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = value.parse().ok()?;
        return now.checked_add(jiff::SignedDuration::from_secs(secs)).ok();
    }
    parse_http_date(value).ok()
}

/// Serde glue for `Timestamp` fields that must go through [`parse_timestamp`]
pub(crate) mod ts {
    use super::parse_timestamp;
    use jiff::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(t)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Timestamp, D::Error> {
        let value = String::deserialize(d)?;
        parse_timestamp(&value).map_err(serde::de::Error::custom)
    }
}

/// Serde glue for optional timestamp fields
pub(crate) mod ts_option {
    use super::parse_timestamp;
    use jiff::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.collect_str(t),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        let value: Option<String> = Option::deserialize(d)?;
        value
            .map(|v| parse_timestamp(&v).map_err(serde::de::Error::custom))
            .transpose()
    }
}
