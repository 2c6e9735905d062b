//! Purpose: Plain-data HTTP request/response model exchanged with the transport.
//! Exports: `HttpMethod`, `Headers`, `Context`, `RequestUrl`, `RequestHead`, `HttpRequest`,
//! Exports: `RequestBody`, `BodyStream`, `BodySource`, `ResponseBody`, `HttpResponse`.
//! Role: Boundary types between the assembler, the transport, and the dispatcher.
//! Invariants: Header names compare case-insensitively and keep first-seen spelling.
//! Invariants: A `ResponseBody` is single-reader; once taken or closed, reads fail.
//! Invariants: A body source is closed once: after buffering, on a failed read, or when dropped.
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown http method `{value}`"))),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Headers {
    entries: Vec<HeaderEntry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// First value of the named header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|index| self.entries[index].values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(index) => &self.entries[index].values,
            None => &[],
        }
    }

    /// All values of the named header joined with `,`.
    pub fn value(&self, name: &str) -> Option<String> {
        self.position(name)
            .map(|index| self.entries[index].values.join(","))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_values(name, vec![value.into()]);
    }

    pub fn set_values(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].values = values,
            None => self.entries.push(HeaderEntry { name, values }),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].values.push(value.into()),
            None => self.entries.push(HeaderEntry {
                name,
                values: vec![value.into()],
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let index = self.position(name)?;
        Some(self.entries.remove(index).values)
    }

    /// Copies every entry of `other` over same-named entries of `self`.
    pub fn extend_replacing(&mut self, other: &Headers) {
        for (name, values) in other.iter() {
            self.set_values(name, values.to_vec());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Lower-cased header names mapped to their comma-joined values.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for entry in &self.entries {
            map.insert(
                entry.name.to_ascii_lowercase(),
                Value::String(entry.values.join(",")),
            );
        }
        Value::Object(map)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name.eq_ignore_ascii_case(name))
    }
}

/// Caller-supplied key/value pairs carried alongside a request for the transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Context {
    values: BTreeMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn merge(&mut self, other: &Context) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect::<Map<String, Value>>(),
        )
    }
}

/// Request target kept exactly as assembled; the parsed form is only for inspection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestUrl {
    raw: String,
    parsed: Url,
}

impl RequestUrl {
    pub fn parse(raw: impl Into<String>) -> Result<Self, url::ParseError> {
        let raw = raw.into();
        let parsed = Url::parse(&raw)?;
        Ok(Self { raw, parsed })
    }

    /// The target as it goes to the transport, without normalization.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> &Url {
        &self.parsed
    }

    pub fn path(&self) -> &str {
        self.parsed.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.parsed.query()
    }
}

impl From<Url> for RequestUrl {
    fn from(parsed: Url) -> Self {
        Self {
            raw: parsed.as_str().to_string(),
            parsed,
        }
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Method, target, and headers of a request, detached from its body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestHead {
    pub method: HttpMethod,
    pub url: RequestUrl,
    pub headers: Headers,
}

pub struct BodyStream {
    pub reader: Box<dyn Read + Send>,
    pub length: Option<u64>,
}

impl BodyStream {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            length: None,
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn read_all(mut self) -> Result<Bytes, Error> {
        let mut out = Vec::new();
        self.reader.read_to_end(&mut out).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read body stream")
                .with_source(err)
        })?;
        Ok(Bytes::from(out))
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

pub type DeferredBody = Box<dyn FnOnce() -> Result<Bytes, Error> + Send>;

pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream(BodyStream),
    /// Materialized on first use; length unknown until then.
    Deferred(DeferredBody),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Length known without reading or realizing the body.
    pub fn known_length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Bytes(bytes) => Some(bytes.len() as u64),
            RequestBody::Stream(stream) => stream.length,
            RequestBody::Deferred(_) => None,
        }
    }

    /// Reads or realizes the whole body. Used by transports that need a buffer.
    pub fn into_bytes(self) -> Result<Bytes, Error> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Bytes(bytes) => Ok(bytes),
            RequestBody::Stream(stream) => stream.read_all(),
            RequestBody::Deferred(realize) => realize(),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Stream(stream) => write!(f, "Stream({stream:?})"),
            RequestBody::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: RequestUrl,
    pub headers: Headers,
    pub body: RequestBody,
    pub context: Context,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<RequestUrl>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: RequestBody::Empty,
            context: Context::new(),
        }
    }

    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Replaces the body and keeps `Content-Length` in step with it when the length is known.
    pub fn set_body(&mut self, body: RequestBody) {
        match body.known_length() {
            Some(length) => self.headers.set("Content-Length", length.to_string()),
            None => {
                self.headers.remove("Content-Length");
            }
        }
        self.body = body;
    }

    pub fn declared_length(&self) -> Result<Option<u64>, Error> {
        let Some(value) = self.headers.get("Content-Length") else {
            return Ok(None);
        };
        value.trim().parse::<u64>().map(Some).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid Content-Length header `{value}`"))
                .with_source(err)
        })
    }
}

/// Readable response body source that may need an explicit close.
pub trait BodySource: Read + Send {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ReaderSource<R>(R);

impl<R: Read> Read for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> BodySource for ReaderSource<R> {}

enum BodyState {
    Unread(Box<dyn BodySource>),
    Buffered(Bytes),
    Taken,
    Closed,
}

pub struct ResponseBody {
    state: Mutex<BodyState>,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            state: Mutex::new(BodyState::Buffered(bytes.into())),
        }
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::from_source(ReaderSource(reader))
    }

    pub fn from_source(source: impl BodySource + 'static) -> Self {
        Self {
            state: Mutex::new(BodyState::Unread(Box::new(source))),
        }
    }

    /// Buffers the body on first call; later calls return the same bytes.
    pub fn bytes(&self) -> Result<Bytes, Error> {
        let mut state = self.lock();
        match &mut *state {
            BodyState::Buffered(bytes) => Ok(bytes.clone()),
            BodyState::Unread(source) => {
                let mut out = Vec::new();
                if let Err(err) = source.read_to_end(&mut out) {
                    if let Err(close_err) = source.close() {
                        warn!(error = %close_err, "failed to close response body after read error");
                    }
                    *state = BodyState::Closed;
                    return Err(Error::new(ErrorKind::Io)
                        .with_message("failed to read response body")
                        .with_source(err));
                }
                let close_result = source.close();
                let bytes = Bytes::from(out);
                *state = BodyState::Buffered(bytes.clone());
                close_result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to close response body")
                        .with_source(err)
                })?;
                Ok(bytes)
            }
            BodyState::Taken | BodyState::Closed => Err(consumed_error()),
        }
    }

    /// Hands the unread body to the caller without buffering it.
    pub fn take_stream(&self) -> Result<BodyStream, Error> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, BodyState::Taken) {
            BodyState::Unread(source) => Ok(BodyStream {
                reader: Box::new(ClosingSource(source)),
                length: None,
            }),
            BodyState::Buffered(bytes) => {
                let length = bytes.len() as u64;
                Ok(BodyStream::new(Cursor::new(bytes)).with_length(length))
            }
            previous => {
                *state = previous;
                Err(consumed_error())
            }
        }
    }

    /// Releases the body. Closing twice, or after the stream was taken, is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, BodyState::Closed) {
            BodyState::Unread(mut source) => source.close().map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to close response body")
                    .with_source(err)
            }),
            BodyState::Taken => {
                *state = BodyState::Taken;
                Ok(())
            }
            BodyState::Buffered(_) | BodyState::Closed => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), BodyState::Closed)
    }

    fn lock(&self) -> MutexGuard<'_, BodyState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poison| poison.into_inner());
        if let BodyState::Unread(mut source) = std::mem::replace(state, BodyState::Closed)
            && let Err(err) = source.close()
        {
            warn!(error = %err, "failed to close unread response body");
        }
    }
}

/// A taken body source; closed when the stream reading it is dropped.
struct ClosingSource(Box<dyn BodySource>);

impl Read for ClosingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Drop for ClosingSource {
    fn drop(&mut self) {
        if let Err(err) = self.0.close() {
            warn!(error = %err, "failed to close response stream");
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            BodyState::Unread(_) => "unread".to_string(),
            BodyState::Buffered(bytes) => format!("buffered({} bytes)", bytes.len()),
            BodyState::Taken => "taken".to_string(),
            BodyState::Closed => "closed".to_string(),
        };
        f.debug_struct("ResponseBody").field("state", &state).finish()
    }
}

fn consumed_error() -> Error {
    Error::new(ErrorKind::Io).with_message("response body already consumed")
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: ResponseBody::empty(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::from_bytes(body);
        self
    }

    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_body_source(mut self, source: impl BodySource + 'static) -> Self {
        self.body = ResponseBody::from_source(source);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BodySource, Headers, HttpMethod, HttpRequest, RequestBody, RequestUrl, ResponseBody,
    };
    use crate::core::error::ErrorKind;
    use bytes::Bytes;
    use std::io::{self, Cursor, Read};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct Counted {
        inner: Cursor<Vec<u8>>,
        fail: bool,
        closes: Arc<AtomicUsize>,
    }

    impl Read for Counted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::ConnectionReset));
            }
            self.inner.read(buf)
        }
    }

    impl BodySource for Counted {
        fn close(&mut self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted(body: &[u8], fail: bool) -> (ResponseBody, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let source = Counted {
            inner: Cursor::new(body.to_vec()),
            fail,
            closes: Arc::clone(&closes),
        };
        (ResponseBody::from_source(source), closes)
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        headers.set("content-type", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn headers_join_multiple_values() {
        let mut headers = Headers::new();
        headers.add("Accept", "a");
        headers.add("accept", "b");
        assert_eq!(headers.value("Accept").as_deref(), Some("a,b"));
        assert_eq!(headers.get_all("ACCEPT").len(), 2);
    }

    #[test]
    fn method_parses_any_case() {
        assert_eq!("patch".parse::<HttpMethod>().expect("method"), HttpMethod::Patch);
        assert!("FETCH".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn set_body_tracks_content_length() {
        let url = Url::parse("https://example.com/").expect("url");
        let mut request = HttpRequest::new(HttpMethod::Post, url);
        request.set_body(RequestBody::Bytes(Bytes::from_static(b"hello")));
        assert_eq!(request.declared_length().expect("length"), Some(5));
        request.set_body(RequestBody::Deferred(Box::new(|| Ok(Bytes::new()))));
        assert_eq!(request.declared_length().expect("length"), None);
    }

    #[test]
    fn response_body_is_buffered_once() {
        let body = ResponseBody::from_reader(Cursor::new(b"payload".to_vec()));
        assert_eq!(body.bytes().expect("bytes").as_ref(), b"payload");
        assert_eq!(body.bytes().expect("bytes again").as_ref(), b"payload");
    }

    #[test]
    fn response_body_fails_after_stream_taken() {
        let body = ResponseBody::from_reader(Cursor::new(b"payload".to_vec()));
        let mut stream = body.take_stream().expect("stream");
        let mut out = String::new();
        stream.reader.read_to_string(&mut out).expect("read");
        assert_eq!(out, "payload");
        let err = body.bytes().expect_err("consumed");
        assert_eq!(err.message(), Some("response body already consumed"));
    }

    #[test]
    fn response_body_fails_after_close() {
        let body = ResponseBody::from_reader(Cursor::new(b"payload".to_vec()));
        body.close().expect("close");
        body.close().expect("second close is a no-op");
        assert!(body.is_closed());
        assert!(body.bytes().is_err());
        assert!(body.take_stream().is_err());
    }

    #[test]
    fn failed_read_closes_source_once() {
        let (body, closes) = counted(b"payload", true);
        let err = body.bytes().expect_err("reset");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(body.is_closed());
        body.close().expect("already closed");
        drop(body);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_unread_body_closes_source() {
        let (body, closes) = counted(b"payload", false);
        drop(body);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (body, closes) = counted(b"payload", false);
        body.bytes().expect("bytes");
        drop(body);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn taken_stream_closes_source_when_dropped() {
        let (body, closes) = counted(b"payload", false);
        let stream = body.take_stream().expect("stream");
        drop(body);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert_eq!(stream.read_all().expect("read").as_ref(), b"payload");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_url_keeps_text_verbatim() {
        let url = RequestUrl::parse("https://other.example.net/a/../b?x=1").expect("url");
        assert_eq!(url.as_str(), "https://other.example.net/a/../b?x=1");
        assert_eq!(url.to_string(), "https://other.example.net/a/../b?x=1");
        assert_eq!(url.path(), "/b");
        assert_eq!(url.query(), Some("x=1"));
    }
}
