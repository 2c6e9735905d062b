//! Purpose: Serializer contract plus the default serde_json implementation.
//! Exports: `Encoding`, `Serializer`, `JsonSerializer`, `TypeDecoders`, `TypeDecoder`.
//! Role: The engine encodes request bodies and decodes response bodies only through here.
//! Invariants: An empty body decodes to `Value::Null` for every target type.
//! Invariants: Self-describing decoders registered by type name win over the serializer.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::types::{Shape, TypeRef};

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    Json,
    Xml,
    Text,
    Binary,
}

impl Encoding {
    /// Missing content types are treated as JSON.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Encoding::Json;
        };
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.is_empty()
            || mime == APPLICATION_JSON
            || mime.ends_with("+json")
            || mime == "text/json"
        {
            Encoding::Json
        } else if mime.ends_with("/xml") || mime.ends_with("+xml") {
            Encoding::Xml
        } else if mime == APPLICATION_OCTET_STREAM {
            Encoding::Binary
        } else if mime.starts_with("text/") || mime == APPLICATION_FORM {
            Encoding::Text
        } else {
            Encoding::Json
        }
    }
}

pub trait Serializer: Send + Sync {
    fn encode(&self, value: &Value, encoding: Encoding) -> Result<Bytes, Error>;
    fn decode(&self, bytes: &[u8], target: &TypeRef, encoding: Encoding) -> Result<Value, Error>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, value: &Value, encoding: Encoding) -> Result<Bytes, Error> {
        match encoding {
            Encoding::Json => serde_json::to_vec(value).map(Bytes::from).map_err(|err| {
                Error::new(ErrorKind::Encode)
                    .with_message("failed to encode json body")
                    .with_source(err)
            }),
            Encoding::Text | Encoding::Binary => Ok(match value {
                Value::String(text) => Bytes::from(text.clone()),
                other => Bytes::from(other.to_string()),
            }),
            Encoding::Xml => Err(Error::new(ErrorKind::Encode)
                .with_message("no xml serializer is configured")
                .with_hint("Register a Serializer that handles Encoding::Xml.")),
        }
    }

    fn decode(&self, bytes: &[u8], target: &TypeRef, encoding: Encoding) -> Result<Value, Error> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        match encoding {
            Encoding::Json | Encoding::Binary => match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => Ok(value),
                Err(_) if target.shape() == Shape::Text => {
                    Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
                }
                Err(err) => Err(Error::new(ErrorKind::Decode)
                    .with_message(format!("invalid json for `{target}`"))
                    .with_source(err)),
            },
            Encoding::Text => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
            Encoding::Xml => Err(Error::new(ErrorKind::Decode)
                .with_message(format!("cannot decode xml body into `{target}`"))
                .with_hint("Register a Serializer that handles Encoding::Xml.")),
        }
    }
}

pub type TypeDecoder = Arc<dyn Fn(&[u8]) -> Result<Value, Error> + Send + Sync>;

/// Decoders supplied by types that describe their own wire format.
#[derive(Clone, Default)]
pub struct TypeDecoders {
    decoders: HashMap<String, TypeDecoder>,
}

impl TypeDecoders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        decoder: impl Fn(&[u8]) -> Result<Value, Error> + Send + Sync + 'static,
    ) {
        self.decoders.insert(type_name.into(), Arc::new(decoder));
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeDecoder> {
        self.decoders.get(type_name)
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for TypeDecoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Encoding, JsonSerializer, Serializer};
    use crate::core::error::ErrorKind;
    use crate::core::types::TypeRef;
    use serde_json::{Value, json};

    #[test]
    fn encoding_follows_content_type() {
        assert_eq!(Encoding::from_content_type(None), Encoding::Json);
        assert_eq!(
            Encoding::from_content_type(Some("application/merge-patch+json; charset=utf-8")),
            Encoding::Json
        );
        assert_eq!(Encoding::from_content_type(Some("application/xml")), Encoding::Xml);
        assert_eq!(Encoding::from_content_type(Some("text/plain")), Encoding::Text);
        assert_eq!(
            Encoding::from_content_type(Some("application/octet-stream")),
            Encoding::Binary
        );
    }

    #[test]
    fn empty_body_decodes_to_null() {
        let value = JsonSerializer
            .decode(b"", &TypeRef::named("Widget"), Encoding::Json)
            .expect("decode");
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn plain_text_is_accepted_for_string_targets() {
        let value = JsonSerializer
            .decode(b"hello", &TypeRef::string(), Encoding::Json)
            .expect("decode");
        assert_eq!(value, json!("hello"));
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let err = JsonSerializer
            .decode(b"{oops", &TypeRef::named("Widget"), Encoding::Json)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn xml_is_reported_as_unsupported() {
        let err = JsonSerializer
            .encode(&json!({"a": 1}), Encoding::Xml)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Encode);
    }
}
