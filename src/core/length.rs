//! Purpose: Guarantee an outgoing body matches its declared `Content-Length`.
//! Exports: `enforce_length`, `LengthValidatingReader`, `LengthGuard`, `LengthViolation`.
//! Role: Runs after the mutation callback, immediately before the transport send.
//! Invariants: Streams fail on the read that crosses the declared length, or at EOF when short.
//! Invariants: Deferred bodies are realized once and replaced by their bytes.
//! Invariants: Violations are `BodyLengthMismatch`, never retryable.
use std::io::{self, Read};
use std::sync::{Arc, OnceLock};

use crate::core::error::{Error, ErrorKind};
use crate::core::http::{BodyStream, HttpRequest, RequestBody};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LengthViolation {
    pub declared: u64,
    pub observed: u64,
}

impl LengthViolation {
    pub fn to_error(self) -> Error {
        let message = if self.observed > self.declared {
            format!(
                "body exceeded declared Content-Length {} (read {} bytes)",
                self.declared, self.observed
            )
        } else {
            format!(
                "body ended after {} of {} declared bytes",
                self.observed, self.declared
            )
        };
        Error::new(ErrorKind::BodyLengthMismatch).with_message(message)
    }
}

/// Shared view of a streamed body's first length violation, if any.
#[derive(Clone, Debug, Default)]
pub struct LengthGuard {
    violation: Arc<OnceLock<LengthViolation>>,
}

impl LengthGuard {
    pub fn violation(&self) -> Option<LengthViolation> {
        self.violation.get().copied()
    }

    fn record(&self, violation: LengthViolation) -> LengthViolation {
        *self.violation.get_or_init(|| violation)
    }
}

pub struct LengthValidatingReader<R> {
    inner: R,
    declared: u64,
    read: u64,
    guard: LengthGuard,
}

impl<R: Read> LengthValidatingReader<R> {
    pub fn new(inner: R, declared: u64) -> Self {
        Self {
            inner,
            declared,
            read: 0,
            guard: LengthGuard::default(),
        }
    }

    pub fn guard(&self) -> LengthGuard {
        self.guard.clone()
    }

    fn fail(&self, observed: u64) -> io::Error {
        let violation = self.guard.record(LengthViolation {
            declared: self.declared,
            observed,
        });
        io::Error::new(io::ErrorKind::InvalidData, violation.to_error())
    }
}

impl<R: Read> Read for LengthValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(violation) = self.guard.violation() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, violation.to_error()));
        }
        let count = self.inner.read(buf)?;
        if count == 0 && !buf.is_empty() {
            if self.read < self.declared {
                return Err(self.fail(self.read));
            }
            return Ok(0);
        }
        self.read += count as u64;
        if self.read > self.declared {
            return Err(self.fail(self.read));
        }
        Ok(count)
    }
}

/// Validates `request.body` against its `Content-Length`, if one is declared.
///
/// Returns a guard for stream bodies so a violation raised inside the transport
/// can be reported as a length mismatch rather than a transport failure.
pub fn enforce_length(request: &mut HttpRequest) -> Result<Option<LengthGuard>, Error> {
    let Some(declared) = request.declared_length()? else {
        return Ok(None);
    };
    match std::mem::replace(&mut request.body, RequestBody::Empty) {
        RequestBody::Empty => compare(declared, 0).map(|()| None),
        RequestBody::Bytes(bytes) => {
            compare(declared, bytes.len() as u64)?;
            request.body = RequestBody::Bytes(bytes);
            Ok(None)
        }
        RequestBody::Deferred(realize) => {
            let bytes = realize()?;
            compare(declared, bytes.len() as u64)?;
            request.body = RequestBody::Bytes(bytes);
            Ok(None)
        }
        RequestBody::Stream(stream) => {
            let reader = LengthValidatingReader::new(stream.reader, declared);
            let guard = reader.guard();
            request.body = RequestBody::Stream(BodyStream::new(reader).with_length(declared));
            Ok(Some(guard))
        }
    }
}

fn compare(declared: u64, actual: u64) -> Result<(), Error> {
    if declared == actual {
        return Ok(());
    }
    Err(LengthViolation {
        declared,
        observed: actual,
    }
    .to_error())
}
