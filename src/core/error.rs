//! Purpose: Define the single error type shared by compilation, assembly, and dispatch.
//! Exports: `Error`, `ErrorKind`, `StatusFailure`, `ErrorBody`, `to_exit_code`.
//! Role: Every fallible engine operation returns `Result<_, Error>`.
//! Invariants: `UnexpectedStatus` errors always carry a `StatusFailure`, even when
//! Invariants: the error body could not be decoded.
//! Invariants: Only `Transport` errors report themselves as retryable.
use std::error::Error as StdError;
use std::fmt;

use bytes::Bytes;
use serde_json::Value;

use crate::core::http::{Headers, RequestHead};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Configuration,
    BodyLengthMismatch,
    UnexpectedStatus,
    Transport,
    Decode,
    Encode,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Usage => "Usage",
            ErrorKind::Configuration => "Configuration",
            ErrorKind::BodyLengthMismatch => "BodyLengthMismatch",
            ErrorKind::UnexpectedStatus => "UnexpectedStatus",
            ErrorKind::Transport => "Transport",
            ErrorKind::Decode => "Decode",
            ErrorKind::Encode => "Encode",
            ErrorKind::Io => "Io",
        }
    }
}

/// Error body carried by an unexpected-status failure.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorBody {
    Empty,
    Decoded(Value),
    Raw(Bytes),
    /// Decoding was attempted and failed; the raw bytes are kept alongside the reason.
    Undecodable { raw: Bytes, reason: String },
}

impl ErrorBody {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ErrorBody::Decoded(value) => Some(value),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            ErrorBody::Raw(raw) | ErrorBody::Undecodable { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StatusFailure {
    pub status: u16,
    pub exception_type: String,
    pub request: RequestHead,
    pub headers: Headers,
    pub body: ErrorBody,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    service: Option<String>,
    method: Option<String>,
    failure: Option<Box<StatusFailure>>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            service: None,
            method: None,
            failure: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.failure.as_ref().map(|failure| failure.status)
    }

    pub fn failure(&self) -> Option<&StatusFailure> {
        self.failure.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_failure(mut self, failure: StatusFailure) -> Self {
        self.failure = Some(Box::new(failure));
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Rebuilds an error with the same kind and message, without source or failure.
    pub(crate) fn shallow_clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            hint: self.hint.clone(),
            service: self.service.clone(),
            method: self.method.clone(),
            failure: None,
            source: None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration).with_message(message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        match (&self.service, &self.method) {
            (Some(service), Some(method)) => write!(f, " ({service}.{method})")?,
            (Some(service), None) => write!(f, " ({service})")?,
            (None, Some(method)) => write!(f, " ({method})")?,
            (None, None) => {}
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Configuration => 3,
        ErrorKind::BodyLengthMismatch => 4,
        ErrorKind::UnexpectedStatus => 5,
        ErrorKind::Transport => 6,
        ErrorKind::Decode => 7,
        ErrorKind::Encode => 8,
        ErrorKind::Io => 9,
    }
}
