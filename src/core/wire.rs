//! Purpose: Transcode between a value's wire representation and its declared type.
//! Exports: `WireType`.
//! Role: Applied by the dispatcher after raw-byte reads and structured decodes.
//! Invariants: `List<...>` and `Map<...>` targets are transformed element-wise.
//! Invariants: Nulls pass through untouched.
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::core::error::{Error, ErrorKind};
use crate::core::types::TypeRef;

const RFC1123_FORMAT: &str =
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    /// Unpadded URL-safe base64 text standing in for raw bytes.
    Base64Url,
    /// `Sun, 06 Nov 1994 08:49:37 GMT`, surfaced as RFC 3339.
    DateTimeRfc1123,
    /// Seconds since the epoch, surfaced as RFC 3339.
    UnixTime,
}

impl WireType {
    pub fn as_str(self) -> &'static str {
        match self {
            WireType::Base64Url => "base64_url",
            WireType::DateTimeRfc1123 => "date_time_rfc1123",
            WireType::UnixTime => "unix_time",
        }
    }

    /// Raw-bytes returns: only base64url changes the bytes.
    pub fn decode_bytes(self, raw: Bytes) -> Result<Bytes, Error> {
        match self {
            WireType::Base64Url => {
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim().trim_matches('"');
                decode_base64_url(text).map(Bytes::from)
            }
            WireType::DateTimeRfc1123 | WireType::UnixTime => Ok(raw),
        }
    }

    pub fn transform(self, value: Value, target: &TypeRef) -> Result<Value, Error> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Array(items) if target.name() == "List" => {
                let element = target.args().first().cloned().unwrap_or_else(TypeRef::string);
                items
                    .into_iter()
                    .map(|item| self.transform(item, &element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            Value::Object(entries) if target.name() == "Map" => {
                let element = target.args().last().cloned().unwrap_or_else(TypeRef::string);
                let mut out = Map::new();
                for (key, item) in entries {
                    out.insert(key, self.transform(item, &element)?);
                }
                Ok(Value::Object(out))
            }
            leaf => self.transform_leaf(leaf),
        }
    }

    fn transform_leaf(self, value: Value) -> Result<Value, Error> {
        match (self, value) {
            (WireType::Base64Url, Value::String(text)) => {
                let bytes = decode_base64_url(&text)?;
                Ok(Value::Array(bytes.into_iter().map(Value::from).collect()))
            }
            (WireType::DateTimeRfc1123, Value::String(text)) => {
                let parsed = parse_rfc1123(&text)?;
                format_rfc3339(parsed)
            }
            (WireType::UnixTime, Value::Number(number)) => {
                let seconds = number.as_i64().ok_or_else(|| {
                    Error::new(ErrorKind::Decode)
                        .with_message(format!("unix time `{number}` is not an integer"))
                })?;
                let parsed = OffsetDateTime::from_unix_timestamp(seconds).map_err(|err| {
                    Error::new(ErrorKind::Decode)
                        .with_message(format!("unix time `{seconds}` is out of range"))
                        .with_source(err)
                })?;
                format_rfc3339(parsed)
            }
            (wire, other) => Err(Error::new(ErrorKind::Decode).with_message(format!(
                "cannot apply {} wire type to `{other}`",
                wire.as_str()
            ))),
        }
    }
}

fn decode_base64_url(text: &str) -> Result<Vec<u8>, Error> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("invalid base64url value")
                .with_source(err)
        })
}

fn parse_rfc1123(text: &str) -> Result<OffsetDateTime, Error> {
    let format = time::format_description::parse(RFC1123_FORMAT).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid rfc1123 format description")
            .with_source(err)
    })?;
    PrimitiveDateTime::parse(text, &format)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message(format!("invalid rfc1123 date `{text}`"))
                .with_source(err)
        })
}

fn format_rfc3339(value: OffsetDateTime) -> Result<Value, Error> {
    value.format(&Rfc3339).map(Value::String).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("failed to format timestamp")
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::WireType;
    use crate::core::types::TypeRef;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn base64_url_bytes_accept_json_string() {
        let raw = Bytes::from_static(b"\"aGVsbG8\"");
        let decoded = WireType::Base64Url.decode_bytes(raw).expect("decode");
        assert_eq!(decoded.as_ref(), b"hello");
    }

    #[test]
    fn rfc1123_becomes_rfc3339() {
        let value = WireType::DateTimeRfc1123
            .transform(json!("Sun, 06 Nov 1994 08:49:37 GMT"), &TypeRef::named("DateTime"))
            .expect("transform");
        assert_eq!(value, json!("1994-11-06T08:49:37Z"));
    }

    #[test]
    fn unix_time_list_is_transformed_elementwise() {
        let target = TypeRef::list(TypeRef::named("DateTime"));
        let value = WireType::UnixTime
            .transform(json!([0, null]), &target)
            .expect("transform");
        assert_eq!(value, json!(["1970-01-01T00:00:00Z", null]));
    }

    #[test]
    fn mismatched_leaf_is_a_decode_error() {
        let err = WireType::UnixTime
            .transform(json!("yesterday"), &TypeRef::named("DateTime"))
            .expect_err("err");
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Decode);
    }
}
