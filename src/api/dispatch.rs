//! Purpose: Send an assembled request and turn the response into a return value.
//! Exports: `Dispatcher`.
//! Role: Interpreter back half; status validation, error decoding, return decoding.
//! Invariants: Every response body is closed exactly once on every exit path.
//! Invariants: Close failures while building an error are logged, never raised.
//! Invariants: Decode failures of an error body are carried inside the error, not lost.
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::assemble::Assembled;
use crate::api::transport::Transport;
use crate::core::construct::{ConstructorCache, ResponseTypes};
use crate::core::descriptor::ServiceMethodDescriptor;
use crate::core::error::{Error, ErrorBody, ErrorKind, StatusFailure};
use crate::core::http::{
    BodyStream, Headers, HttpMethod, HttpResponse, RequestHead, ResponseBody,
};
use crate::core::length::LengthGuard;
use crate::core::options::BodyMode;
use crate::core::payload::{BinaryData, LazyValue, Payload, ReturnValue};
use crate::core::serializer::{APPLICATION_OCTET_STREAM, Encoding, Serializer, TypeDecoders};
use crate::core::types::{Shape, TypeRef};
use crate::core::value::ResponseEvent;
use crate::core::wire::WireType;

/// Client-owned collaborators the dispatcher reads from on every call.
pub struct Dispatcher<'a> {
    pub serializer: &'a Arc<dyn Serializer>,
    pub decoders: &'a Arc<TypeDecoders>,
    pub response_types: &'a ResponseTypes,
    pub constructors: &'a ConstructorCache,
    pub default_body_mode: BodyMode,
    pub preview_limit: usize,
}

impl Dispatcher<'_> {
    pub fn dispatch(
        &self,
        descriptor: &ServiceMethodDescriptor,
        assembled: Assembled,
        guard: Option<LengthGuard>,
        transport: &dyn Transport,
    ) -> Result<ReturnValue, Error> {
        let Assembled {
            request,
            listener,
            body_mode,
        } = assembled;
        let head = request.head();
        let response = match transport.send(request) {
            Ok(response) => response,
            Err(err) => {
                return match guard.and_then(|guard| guard.violation()) {
                    Some(violation) => Err(violation.to_error().with_source(err)),
                    None => Err(err),
                };
            }
        };
        debug!(
            service = %descriptor.service,
            method = %descriptor.name,
            status = response.status,
            "received response"
        );

        if let Some(listener) = &listener {
            listener.notify(&ResponseEvent {
                request: &head,
                status: response.status,
                headers: &response.headers,
            });
        }

        if !descriptor.expected.matches(response.status) {
            return Err(self.status_error(descriptor, head, response));
        }

        let returns = &descriptor.returns;
        if returns.declared.is_void() {
            response.body.close()?;
            return Ok(ReturnValue::None);
        }

        let HttpResponse {
            status,
            headers,
            body,
        } = response;

        if returns.wrapped {
            let plan = match self.constructors.plan_for(self.response_types, &returns.declared) {
                Ok(plan) => plan,
                Err(err) => {
                    close_quietly(&body);
                    return Err(err);
                }
            };
            let payload = if returns.body.is_void() {
                body.close()?;
                Payload::Empty
            } else {
                let mode = body_mode.unwrap_or(self.default_body_mode);
                self.wrapped_payload(mode, &returns.body, returns.wire_type, &headers, body)?
            };
            let wrapped = plan.construct(head, status, headers, payload)?;
            return Ok(ReturnValue::Wrapped(wrapped));
        }

        let body_type = &returns.body;
        if descriptor.http_method == HttpMethod::Head && body_type.shape() == Shape::Bool {
            body.close()?;
            return Ok(ReturnValue::Bool((200..300).contains(&status)));
        }
        match self.raw_payload(body_type, returns.wire_type, &headers, body)? {
            Payload::Empty => Ok(ReturnValue::None),
            payload => Ok(ReturnValue::Body(payload)),
        }
    }

    fn wrapped_payload(
        &self,
        mode: BodyMode,
        body_type: &TypeRef,
        wire_type: Option<WireType>,
        headers: &Headers,
        body: ResponseBody,
    ) -> Result<Payload, Error> {
        match mode {
            BodyMode::Ignore => {
                body.close()?;
                Ok(Payload::Empty)
            }
            BodyMode::Stream => body
                .take_stream()
                .map(|stream| Payload::Stream(with_declared_length(stream, headers))),
            BodyMode::Lazy if body_type.is_decodable() => {
                let decode = DecodeJob {
                    serializer: Arc::clone(self.serializer),
                    decoders: Arc::clone(self.decoders),
                    target: body_type.clone(),
                    wire_type,
                    content_type: headers.get("Content-Type").map(str::to_string),
                };
                Ok(Payload::Lazy(LazyValue::new(move || {
                    let bytes = body.bytes()?;
                    decode.run(&bytes)
                })))
            }
            BodyMode::Lazy | BodyMode::Eager => {
                self.raw_payload(body_type, wire_type, headers, body)
            }
        }
    }

    /// Plain-return decoding rules, in priority order after the HEAD/bool case.
    fn raw_payload(
        &self,
        body_type: &TypeRef,
        wire_type: Option<WireType>,
        headers: &Headers,
        body: ResponseBody,
    ) -> Result<Payload, Error> {
        match body_type.shape() {
            Shape::Bytes => {
                let bytes = body.bytes()?;
                if bytes.is_empty() {
                    return Ok(Payload::Empty);
                }
                let bytes = match wire_type {
                    Some(wire) => wire.decode_bytes(bytes)?,
                    None => bytes,
                };
                Ok(Payload::Bytes(bytes))
            }
            Shape::ByteStream => body
                .take_stream()
                .map(|stream| Payload::Stream(with_declared_length(stream, headers))),
            Shape::Binary => Ok(Payload::Binary(BinaryData::new(
                body,
                headers.get("Content-Type").map(str::to_string),
                declared_length(headers),
            ))),
            Shape::Void => {
                body.close()?;
                Ok(Payload::Empty)
            }
            _ => {
                let bytes = body.bytes()?;
                let decode = DecodeJob {
                    serializer: Arc::clone(self.serializer),
                    decoders: Arc::clone(self.decoders),
                    target: body_type.clone(),
                    wire_type,
                    content_type: headers.get("Content-Type").map(str::to_string),
                };
                decode.run(&bytes).map(Payload::Value)
            }
        }
    }

    fn status_error(
        &self,
        descriptor: &ServiceMethodDescriptor,
        request: RequestHead,
        response: HttpResponse,
    ) -> Error {
        let status = response.status;
        let exception = descriptor.exceptions.resolve(status);
        let content_type = response.headers.get("Content-Type").map(str::to_string);
        let is_octet_stream = content_type
            .as_deref()
            .is_some_and(|value| value.starts_with(APPLICATION_OCTET_STREAM));

        let (body, detail) = match response.body.bytes() {
            Ok(raw) if raw.is_empty() => (ErrorBody::Empty, "(empty body)".to_string()),
            Ok(raw) if is_octet_stream => {
                let detail = format!("({}-byte body)", raw.len());
                (ErrorBody::Raw(raw), detail)
            }
            Ok(raw) => {
                let detail = format!("\"{}\"", preview(&raw, self.preview_limit));
                let decode = DecodeJob {
                    serializer: Arc::clone(self.serializer),
                    decoders: Arc::clone(self.decoders),
                    target: exception.body.clone(),
                    wire_type: None,
                    content_type,
                };
                let body = match decode.run(&raw) {
                    Ok(value) => ErrorBody::Decoded(value),
                    Err(err) => ErrorBody::Undecodable {
                        raw,
                        reason: err.to_string(),
                    },
                };
                (body, detail)
            }
            Err(err) => (
                ErrorBody::Undecodable {
                    raw: Bytes::new(),
                    reason: err.to_string(),
                },
                "(unreadable body)".to_string(),
            ),
        };
        close_quietly(&response.body);

        Error::new(ErrorKind::UnexpectedStatus)
            .with_message(format!("Status code {status}, {detail}"))
            .with_service(descriptor.service.clone())
            .with_method(descriptor.name.clone())
            .with_failure(StatusFailure {
                status,
                exception_type: exception.name.clone(),
                request,
                headers: response.headers,
                body,
            })
    }
}

/// Everything needed to decode a body, detached from the dispatcher so it can run lazily.
struct DecodeJob {
    serializer: Arc<dyn Serializer>,
    decoders: Arc<TypeDecoders>,
    target: TypeRef,
    wire_type: Option<WireType>,
    content_type: Option<String>,
}

impl DecodeJob {
    fn run(&self, bytes: &[u8]) -> Result<Value, Error> {
        let value = match self.decoders.get(self.target.name()) {
            Some(decoder) if !bytes.is_empty() => decoder(bytes),
            _ => self.serializer.decode(
                bytes,
                &self.target,
                Encoding::from_content_type(self.content_type.as_deref()),
            ),
        }
        .map_err(|err| match err.kind() {
            ErrorKind::Decode => err,
            _ => Error::new(ErrorKind::Decode)
                .with_message(format!("failed to decode `{}`", self.target))
                .with_source(err),
        })?;
        match self.wire_type {
            Some(wire) => wire.transform(value, &self.target),
            None => Ok(value),
        }
    }
}

fn close_quietly(body: &ResponseBody) {
    if let Err(err) = body.close() {
        warn!(error = %err, "failed to close response body");
    }
}

fn declared_length(headers: &Headers) -> Option<u64> {
    headers
        .get("Content-Length")
        .and_then(|value| value.trim().parse().ok())
}

fn with_declared_length(stream: BodyStream, headers: &Headers) -> BodyStream {
    match (stream.length, declared_length(headers)) {
        (None, Some(length)) => stream.with_length(length),
        _ => stream,
    }
}

fn preview(raw: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::preview;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld".as_bytes(), 4), "héll...");
        assert_eq!(preview(b"short", 10), "short");
    }
}
