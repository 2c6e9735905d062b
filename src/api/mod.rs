//! Purpose: Define the public Rust API boundary for wirecall.
//! Exports: Client, manifest, wire value, and error types used by the CLI and callers.
//! Role: Public, additive-only surface over the `core` modules.
//! Invariants: This module is the only public path to engine internals.
//! Invariants: Internal modules remain private and are not directly exposed.

mod assemble;
mod client;
mod dispatch;
mod transport;

pub use crate::core::construct::{
    Constructor, ConstructorArgs, ConstructorPlan, ResponseBase, SimpleResponse, WrappedResponse,
};
pub use crate::core::descriptor::{
    BodySlot, DEFAULT_EXCEPTION, ExceptionTable, ExceptionType, ExpectedStatus, ReturnShape,
    ServiceMethodDescriptor,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorBody, ErrorKind, StatusFailure};
pub use crate::core::http::{
    BodySource, BodyStream, Context, Headers, HttpMethod, HttpRequest, HttpResponse, RequestBody,
    RequestHead, RequestUrl, ResponseBody,
};
pub use crate::core::length::{LengthValidatingReader, LengthViolation};
pub use crate::core::manifest::{
    ExceptionManifest, MethodManifest, ParamManifest, ParamRole, ServiceManifest,
};
pub use crate::core::options::{BodyMode, RequestCallback, RequestOptions};
pub use crate::core::payload::{BinaryData, LazyValue, Payload, ReturnValue};
pub use crate::core::serializer::{
    APPLICATION_FORM, APPLICATION_JSON, APPLICATION_OCTET_STREAM, Encoding, JsonSerializer,
    Serializer, TypeDecoder, TypeDecoders,
};
pub use crate::core::template::encode_component;
pub use crate::core::types::{Shape, TypeRef};
pub use crate::core::value::{Arg, ResponseEvent, ResponseListener, WireSerializable};
pub use crate::core::wire::WireType;
pub use client::{ClientOptions, ServiceClient, ServiceProxy};
pub use transport::{Transport, UreqTransport};
