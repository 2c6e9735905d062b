//! Purpose: Decoded response bodies and the values returned from an invocation.
//! Exports: `Payload`, `LazyValue`, `BinaryData`, `ReturnValue`.
//! Role: Produced by the dispatcher; consumed by callers and wrapped-response constructors.
//! Invariants: A `LazyValue` runs its decode at most once; later forces reuse the result.
//! Invariants: `BinaryData` reads its body on demand; a taken stream cannot be read again.
use std::fmt;
use std::sync::{Mutex, OnceLock};

use bytes::Bytes;
use serde_json::Value;

use crate::core::construct::WrappedResponse;
use crate::core::error::{Error, ErrorKind};
use crate::core::http::{BodyStream, ResponseBody};

type LazyThunk = Box<dyn FnOnce() -> Result<Value, Error> + Send>;

/// Memoized decode: computed on first `get`, then cached for every later call.
pub struct LazyValue {
    cell: OnceLock<Result<Value, Error>>,
    thunk: Mutex<Option<LazyThunk>>,
}

impl LazyValue {
    pub fn new(thunk: impl FnOnce() -> Result<Value, Error> + Send + 'static) -> Self {
        Self {
            cell: OnceLock::new(),
            thunk: Mutex::new(Some(Box::new(thunk))),
        }
    }

    pub fn ready(value: Value) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(value));
        Self {
            cell,
            thunk: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Result<&Value, Error> {
        let result = self.cell.get_or_init(|| {
            let thunk = self
                .thunk
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .take();
            match thunk {
                Some(thunk) => thunk(),
                None => Err(Error::new(ErrorKind::Internal).with_message("lazy value has no source")),
            }
        });
        result.as_ref().map_err(Error::shallow_clone)
    }

    pub fn is_forced(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(Ok(value)) => write!(f, "LazyValue({value})"),
            Some(Err(err)) => write!(f, "LazyValue(error: {err})"),
            None => f.write_str("LazyValue(<pending>)"),
        }
    }
}

/// Binary response content left unread until the caller asks for it.
#[derive(Debug)]
pub struct BinaryData {
    body: ResponseBody,
    content_type: Option<String>,
    length: Option<u64>,
}

impl BinaryData {
    pub fn new(body: ResponseBody, content_type: Option<String>, length: Option<u64>) -> Self {
        Self {
            body,
            content_type,
            length,
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let length = Some(bytes.len() as u64);
        Self::new(ResponseBody::from_bytes(bytes), None, length)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared length, when the response carried one.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        self.body.bytes()
    }

    pub fn to_text(&self) -> Result<String, Error> {
        let bytes = self.to_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("binary data is not valid utf-8")
                .with_source(err)
        })
    }

    pub fn to_json(&self) -> Result<Value, Error> {
        let bytes = self.to_bytes()?;
        serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("binary data is not valid json")
                .with_source(err)
        })
    }

    pub fn into_stream(self) -> Result<BodyStream, Error> {
        self.body.take_stream()
    }

    pub fn close(&self) -> Result<(), Error> {
        self.body.close()
    }
}

pub enum Payload {
    /// No body: void payload type, or the body was ignored.
    Empty,
    Value(Value),
    Lazy(LazyValue),
    Bytes(Bytes),
    Stream(BodyStream),
    Binary(BinaryData),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Structured view of the payload; forces lazy values.
    pub fn value(&self) -> Result<Option<Value>, Error> {
        match self {
            Payload::Empty => Ok(None),
            Payload::Value(value) => Ok(Some(value.clone())),
            Payload::Lazy(lazy) => lazy.get().cloned().map(Some),
            Payload::Bytes(_) | Payload::Stream(_) | Payload::Binary(_) => {
                Err(Error::new(ErrorKind::Usage)
                    .with_message("payload is raw content, not a decoded value")
                    .with_hint("Use Payload::into_bytes or Payload::into_stream."))
            }
        }
    }

    pub fn into_bytes(self) -> Result<Option<Bytes>, Error> {
        match self {
            Payload::Empty => Ok(None),
            Payload::Bytes(bytes) => Ok(Some(bytes)),
            Payload::Stream(stream) => stream.read_all().map(Some),
            Payload::Binary(binary) => binary.to_bytes().map(Some),
            Payload::Value(_) | Payload::Lazy(_) => Err(Error::new(ErrorKind::Usage)
                .with_message("payload is a decoded value, not raw content")),
        }
    }

    pub fn into_stream(self) -> Result<BodyStream, Error> {
        match self {
            Payload::Stream(stream) => Ok(stream),
            Payload::Binary(binary) => binary.into_stream(),
            Payload::Bytes(bytes) => {
                let length = bytes.len() as u64;
                Ok(BodyStream::new(std::io::Cursor::new(bytes)).with_length(length))
            }
            Payload::Empty | Payload::Value(_) | Payload::Lazy(_) => {
                Err(Error::new(ErrorKind::Usage).with_message("payload has no raw stream"))
            }
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Value(value) => write!(f, "Value({value})"),
            Payload::Lazy(lazy) => lazy.fmt(f),
            Payload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Payload::Stream(stream) => stream.fmt(f),
            Payload::Binary(binary) => binary.fmt(f),
        }
    }
}

#[derive(Debug)]
pub enum ReturnValue {
    None,
    Bool(bool),
    Body(Payload),
    Wrapped(Box<dyn WrappedResponse>),
}

impl ReturnValue {
    pub fn is_none(&self) -> bool {
        matches!(self, ReturnValue::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ReturnValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Decoded value of a plain return, or the payload value of a wrapped one.
    pub fn value(&self) -> Result<Option<Value>, Error> {
        match self {
            ReturnValue::None => Ok(None),
            ReturnValue::Bool(value) => Ok(Some(Value::Bool(*value))),
            ReturnValue::Body(payload) => payload.value(),
            ReturnValue::Wrapped(wrapped) => wrapped.payload().value(),
        }
    }

    pub fn into_payload(self) -> Payload {
        match self {
            ReturnValue::None => Payload::Empty,
            ReturnValue::Bool(value) => Payload::Value(Value::Bool(value)),
            ReturnValue::Body(payload) => payload,
            ReturnValue::Wrapped(wrapped) => wrapped.into_payload(),
        }
    }

    pub fn into_wrapped(self) -> Option<Box<dyn WrappedResponse>> {
        match self {
            ReturnValue::Wrapped(wrapped) => Some(wrapped),
            _ => None,
        }
    }
}
