//! Purpose: Dynamically shaped call arguments and the capabilities they may carry.
//! Exports: `Arg`, `WireSerializable`, `ResponseListener`, `ResponseEvent`.
//! Role: What callers pass positionally to `ServiceClient::invoke`.
//! Invariants: `Arg::Null` and `Arg::Json(Value::Null)` are both treated as absent.
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};
use crate::core::http::{BodyStream, Context, Headers, RequestHead};
use crate::core::options::RequestOptions;
use crate::core::serializer::Encoding;

/// A value that knows how to put itself on the wire.
pub trait WireSerializable: Send + Sync {
    fn to_wire(&self, encoding: Encoding) -> Result<Bytes, Error>;
}

pub struct ResponseEvent<'a> {
    pub request: &'a RequestHead,
    pub status: u16,
    pub headers: &'a Headers,
}

#[derive(Clone)]
pub struct ResponseListener(Arc<dyn Fn(&ResponseEvent<'_>) + Send + Sync>);

impl ResponseListener {
    pub fn new(listener: impl Fn(&ResponseEvent<'_>) + Send + Sync + 'static) -> Self {
        Self(Arc::new(listener))
    }

    pub(crate) fn notify(&self, event: &ResponseEvent<'_>) {
        (self.0)(event)
    }
}

impl fmt::Debug for ResponseListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseListener")
    }
}

pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    Json(Value),
    List(Vec<Arg>),
    Map(Vec<(String, Arg)>),
    Stream(BodyStream),
    Serializable(Arc<dyn WireSerializable>),
    Context(Context),
    Options(RequestOptions),
    Listener(ResponseListener),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null | Arg::Json(Value::Null))
    }

    /// Bytes, strings, and streams are sent as `application/octet-stream` unless told otherwise.
    pub fn is_binary_like(&self) -> bool {
        matches!(self, Arg::Bytes(_) | Arg::Str(_) | Arg::Stream(_))
    }

    /// Text form used for placeholders, query values, headers, and form fields.
    pub fn to_param_string(&self) -> Option<String> {
        match self {
            Arg::Null => None,
            Arg::Bool(value) => Some(value.to_string()),
            Arg::Int(value) => Some(value.to_string()),
            Arg::Float(value) => Some(value.to_string()),
            Arg::Str(value) => Some(value.clone()),
            Arg::Bytes(value) => Some(String::from_utf8_lossy(value).into_owned()),
            Arg::Json(Value::Null) => None,
            Arg::Json(Value::String(value)) => Some(value.clone()),
            Arg::Json(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Arg::Json(value) => Some(value.to_string()),
            Arg::List(items) => Some(
                items
                    .iter()
                    .filter_map(Arg::to_param_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Arg::Map(_)
            | Arg::Stream(_)
            | Arg::Serializable(_)
            | Arg::Context(_)
            | Arg::Options(_)
            | Arg::Listener(_) => None,
        }
    }

    /// Structured form handed to the general serializer.
    pub fn to_json(&self) -> Result<Value, Error> {
        match self {
            Arg::Null => Ok(Value::Null),
            Arg::Bool(value) => Ok(Value::Bool(*value)),
            Arg::Int(value) => Ok(Value::from(*value)),
            Arg::Float(value) => Ok(Value::from(*value)),
            Arg::Str(value) => Ok(Value::String(value.clone())),
            Arg::Bytes(value) => Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(value),
            )),
            Arg::Json(value) => Ok(value.clone()),
            Arg::List(items) => items
                .iter()
                .map(Arg::to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Arg::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json()?);
                }
                Ok(Value::Object(map))
            }
            Arg::Stream(_)
            | Arg::Serializable(_)
            | Arg::Context(_)
            | Arg::Options(_)
            | Arg::Listener(_) => Err(Error::new(ErrorKind::Encode)
                .with_message(format!("{} argument has no structured form", self.label()))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Arg::Null => "null",
            Arg::Bool(_) => "bool",
            Arg::Int(_) => "int",
            Arg::Float(_) => "float",
            Arg::Str(_) => "string",
            Arg::Bytes(_) => "bytes",
            Arg::Json(_) => "json",
            Arg::List(_) => "list",
            Arg::Map(_) => "map",
            Arg::Stream(_) => "stream",
            Arg::Serializable(_) => "serializable",
            Arg::Context(_) => "context",
            Arg::Options(_) => "options",
            Arg::Listener(_) => "listener",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => f.write_str("Null"),
            Arg::Bool(value) => write!(f, "Bool({value})"),
            Arg::Int(value) => write!(f, "Int({value})"),
            Arg::Float(value) => write!(f, "Float({value})"),
            Arg::Str(value) => write!(f, "Str({value:?})"),
            Arg::Bytes(value) => write!(f, "Bytes({} bytes)", value.len()),
            Arg::Json(value) => write!(f, "Json({value})"),
            Arg::List(items) => f.debug_tuple("List").field(items).finish(),
            Arg::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Arg::Stream(stream) => write!(f, "Stream({stream:?})"),
            Arg::Serializable(_) => f.write_str("Serializable"),
            Arg::Context(context) => write!(f, "Context({context:?})"),
            Arg::Options(_) => f.write_str("Options"),
            Arg::Listener(_) => f.write_str("Listener"),
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Json(value)
    }
}

impl From<BodyStream> for Arg {
    fn from(value: BodyStream) -> Self {
        Arg::Stream(value)
    }
}

impl From<Context> for Arg {
    fn from(value: Context) -> Self {
        Arg::Context(value)
    }
}

impl From<RequestOptions> for Arg {
    fn from(value: RequestOptions) -> Self {
        Arg::Options(value)
    }
}

impl From<ResponseListener> for Arg {
    fn from(value: ResponseListener) -> Self {
        Arg::Listener(value)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Null)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(value: Vec<T>) -> Self {
        Arg::List(value.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::Arg;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn param_string_skips_nulls_in_lists() {
        let arg = Arg::List(vec![Arg::from("a"), Arg::Null, Arg::from(3)]);
        assert_eq!(arg.to_param_string().as_deref(), Some("a,3"));
    }

    #[test]
    fn json_strings_render_unquoted() {
        assert_eq!(Arg::Json(json!("x")).to_param_string().as_deref(), Some("x"));
        assert_eq!(Arg::Json(json!(7)).to_param_string().as_deref(), Some("7"));
        assert!(Arg::Json(json!(null)).is_null());
    }

    #[test]
    fn bytes_serialize_as_base64() {
        let arg = Arg::Bytes(Bytes::from_static(b"hi"));
        assert_eq!(arg.to_json().expect("json"), json!("aGk="));
    }

    #[test]
    fn map_serializes_as_object() {
        let arg = Arg::Map(vec![("a".to_string(), Arg::from(true))]);
        assert_eq!(arg.to_json().expect("json"), json!({"a": true}));
    }
}
