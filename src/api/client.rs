//! Purpose: Public entry point tying the compiler, assembler, and dispatcher together.
//! Exports: `ServiceClient`, `ClientOptions`, `ServiceProxy`.
//! Role: Owns the per-client caches; clones share them through `Arc`.
//! Invariants: Length validation always runs after the caller's mutation callbacks.
//! Invariants: Errors leaving `invoke` name the service and method they came from.
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::api::assemble::{Assembled, assemble};
use crate::api::dispatch::Dispatcher;
use crate::api::transport::{Transport, UreqTransport};
use crate::core::construct::{Constructor, ConstructorCache, ResponseTypes};
use crate::core::descriptor::ServiceMethodDescriptor;
use crate::core::error::{Error, ErrorKind};
use crate::core::http::{Headers, HttpRequest};
use crate::core::length::enforce_length;
use crate::core::manifest::ServiceManifest;
use crate::core::options::{BodyMode, RequestOptions};
use crate::core::payload::ReturnValue;
use crate::core::registry::DescriptorRegistry;
use crate::core::serializer::{JsonSerializer, Serializer, TypeDecoders};
use crate::core::value::Arg;

const DEFAULT_PREVIEW_LIMIT: usize = 1024;
const MAX_PREVIEW_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct ClientOptions {
    body_mode: BodyMode,
    error_preview_limit: usize,
    user_agent: Option<String>,
    default_headers: Headers,
    serializer: Arc<dyn Serializer>,
    decoders: TypeDecoders,
    response_types: ResponseTypes,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            body_mode: BodyMode::default(),
            error_preview_limit: DEFAULT_PREVIEW_LIMIT,
            user_agent: Some(format!("wirecall/{}", env!("CARGO_PKG_VERSION"))),
            default_headers: Headers::new(),
            serializer: Arc::new(JsonSerializer),
            decoders: TypeDecoders::new(),
            response_types: ResponseTypes::new(),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body mode for wrapped returns when the call does not pick one.
    pub fn with_body_mode(mut self, mode: BodyMode) -> Self {
        self.body_mode = mode;
        self
    }

    /// Maximum characters of an error body quoted in `UnexpectedStatus` messages.
    pub fn with_error_preview_limit(mut self, limit: usize) -> Self {
        self.error_preview_limit = limit;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn without_user_agent(mut self) -> Self {
        self.user_agent = None;
        self
    }

    /// Sent on every request; static and argument headers override it.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.set(name, value);
        self
    }

    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    pub fn with_type_decoder(
        mut self,
        type_name: impl Into<String>,
        decoder: impl Fn(&[u8]) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Self {
        self.decoders.register(type_name, decoder);
        self
    }

    pub fn with_response_type(
        mut self,
        type_name: impl Into<String>,
        constructor: Constructor,
    ) -> Self {
        self.response_types.register(type_name, constructor);
        self
    }

    pub fn body_mode(&self) -> BodyMode {
        self.body_mode
    }

    pub fn error_preview_limit(&self) -> usize {
        self.error_preview_limit
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.error_preview_limit == 0 || self.error_preview_limit > MAX_PREVIEW_LIMIT {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "error preview limit {} is out of range",
                    self.error_preview_limit
                ))
                .with_hint(format!("Use a limit between 1 and {MAX_PREVIEW_LIMIT}.")));
        }
        if let Some(user_agent) = &self.user_agent
            && user_agent.trim().is_empty()
        {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("user agent is empty")
                .with_hint("Call without_user_agent() to send none."));
        }
        for (name, _) in self.default_headers.iter() {
            if !is_header_token(name) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid default header name `{name}`"))
                    .with_hint("Header names may not be empty or contain spaces or separators."));
            }
        }
        Ok(())
    }

    fn effective_headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(user_agent) = &self.user_agent {
            headers.set("User-Agent", user_agent.clone());
        }
        headers.extend_replacing(&self.default_headers);
        headers
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("body_mode", &self.body_mode)
            .field("error_preview_limit", &self.error_preview_limit)
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .field("decoders", &self.decoders)
            .field("response_types", &self.response_types)
            .finish_non_exhaustive()
    }
}

fn is_header_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte))
}

#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Box<dyn Transport>,
    body_mode: BodyMode,
    preview_limit: usize,
    headers: Headers,
    serializer: Arc<dyn Serializer>,
    decoders: Arc<TypeDecoders>,
    response_types: ResponseTypes,
    registry: DescriptorRegistry,
    constructors: ConstructorCache,
}

impl ServiceClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::build(Box::new(transport), ClientOptions::default())
    }

    /// Blocking client over `UreqTransport` with default options.
    pub fn ureq() -> Self {
        Self::new(UreqTransport::new())
    }

    pub fn with_options(
        transport: impl Transport + 'static,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self::build(Box::new(transport), options))
    }

    fn build(transport: Box<dyn Transport>, options: ClientOptions) -> Self {
        let headers = options.effective_headers();
        Self {
            inner: Arc::new(ClientInner {
                transport,
                body_mode: options.body_mode,
                preview_limit: options.error_preview_limit,
                headers,
                serializer: options.serializer,
                decoders: Arc::new(options.decoders),
                response_types: options.response_types,
                registry: DescriptorRegistry::new(),
                constructors: ConstructorCache::new(),
            }),
        }
    }

    pub fn descriptor(
        &self,
        service: &ServiceManifest,
        method: &str,
    ) -> Result<Arc<ServiceMethodDescriptor>, Error> {
        self.inner.registry.get_or_compile(service, method)
    }

    pub fn invoke(
        &self,
        service: &ServiceManifest,
        method: &str,
        args: Vec<Arg>,
    ) -> Result<ReturnValue, Error> {
        self.invoke_inner(service, method, args, None)
    }

    pub fn invoke_with(
        &self,
        service: &ServiceManifest,
        method: &str,
        args: Vec<Arg>,
        options: RequestOptions,
    ) -> Result<ReturnValue, Error> {
        self.invoke_inner(service, method, args, Some(options))
    }

    /// Builds the request exactly as `invoke` would, without sending it.
    pub fn assemble(
        &self,
        service: &ServiceManifest,
        method: &str,
        args: Vec<Arg>,
        options: Option<RequestOptions>,
    ) -> Result<HttpRequest, Error> {
        let descriptor = self.descriptor(service, method)?;
        self.assemble_for(&descriptor, args, options)
            .map(|assembled| assembled.request)
            .map_err(|err| attribute(err, &descriptor))
    }

    pub fn proxy(&self, manifest: ServiceManifest) -> ServiceProxy {
        ServiceProxy {
            client: self.clone(),
            manifest: Arc::new(manifest),
        }
    }

    /// Number of compiled descriptors held by this client.
    pub fn descriptor_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of wrapped-response constructor plans held by this client.
    pub fn constructor_count(&self) -> usize {
        self.inner.constructors.len()
    }

    fn invoke_inner(
        &self,
        service: &ServiceManifest,
        method: &str,
        args: Vec<Arg>,
        options: Option<RequestOptions>,
    ) -> Result<ReturnValue, Error> {
        let descriptor = self.descriptor(service, method)?;
        self.run(&descriptor, args, options)
            .map_err(|err| attribute(err, &descriptor))
    }

    fn run(
        &self,
        descriptor: &ServiceMethodDescriptor,
        args: Vec<Arg>,
        options: Option<RequestOptions>,
    ) -> Result<ReturnValue, Error> {
        let mut assembled = self.assemble_for(descriptor, args, options)?;
        let guard = enforce_length(&mut assembled.request)?;
        let dispatcher = Dispatcher {
            serializer: &self.inner.serializer,
            decoders: &self.inner.decoders,
            response_types: &self.inner.response_types,
            constructors: &self.inner.constructors,
            default_body_mode: self.inner.body_mode,
            preview_limit: self.inner.preview_limit,
        };
        dispatcher.dispatch(descriptor, assembled, guard, self.inner.transport.as_ref())
    }

    fn assemble_for(
        &self,
        descriptor: &ServiceMethodDescriptor,
        args: Vec<Arg>,
        options: Option<RequestOptions>,
    ) -> Result<Assembled, Error> {
        assemble(
            descriptor,
            args,
            options,
            &self.inner.headers,
            self.inner.serializer.as_ref(),
        )
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("body_mode", &self.inner.body_mode)
            .field("descriptors", &self.inner.registry.len())
            .field("constructors", &self.inner.constructors.len())
            .finish_non_exhaustive()
    }
}

fn attribute(err: Error, descriptor: &ServiceMethodDescriptor) -> Error {
    if err.service().is_some() {
        return err;
    }
    err.with_service(descriptor.service())
        .with_method(descriptor.name())
}

/// A service manifest bound to a client: `proxy.call("get", args)`.
#[derive(Clone, Debug)]
pub struct ServiceProxy {
    client: ServiceClient,
    manifest: Arc<ServiceManifest>,
}

impl ServiceProxy {
    pub fn manifest(&self) -> &ServiceManifest {
        &self.manifest
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub fn call(&self, method: &str, args: Vec<Arg>) -> Result<ReturnValue, Error> {
        self.client.invoke(&self.manifest, method, args)
    }

    pub fn call_with(
        &self,
        method: &str,
        args: Vec<Arg>,
        options: RequestOptions,
    ) -> Result<ReturnValue, Error> {
        self.client.invoke_with(&self.manifest, method, args, options)
    }

    pub fn assemble(
        &self,
        method: &str,
        args: Vec<Arg>,
        options: Option<RequestOptions>,
    ) -> Result<HttpRequest, Error> {
        self.client.assemble(&self.manifest, method, args, options)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientOptions, ServiceClient};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::http::{HttpMethod, HttpRequest, HttpResponse};
    use crate::core::manifest::{MethodManifest, ServiceManifest};

    fn echo(request: HttpRequest) -> Result<HttpResponse, Error> {
        Ok(HttpResponse::new(204).with_header("x-url", request.url.as_str()))
    }

    #[test]
    fn options_validate_ranges() {
        let err = ClientOptions::new()
            .with_error_preview_limit(0)
            .validate()
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
        let err = ClientOptions::new()
            .with_default_header("bad name", "v")
            .validate()
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        ClientOptions::new().validate().expect("defaults are valid");
    }

    #[test]
    fn clones_share_descriptor_cache() {
        let client = ServiceClient::new(echo);
        let manifest = ServiceManifest::new("S")
            .with_host("https://example.com")
            .with_method(MethodManifest::new("ping", HttpMethod::Get, "/ping"));
        client.invoke(&manifest, "ping", Vec::new()).expect("first");
        let clone = client.clone();
        clone.invoke(&manifest, "ping", Vec::new()).expect("second");
        assert_eq!(client.descriptor_count(), 1);
    }

    #[test]
    fn default_headers_carry_user_agent() {
        let client = ServiceClient::with_options(
            echo,
            ClientOptions::new()
                .with_user_agent("tests/1.0")
                .with_default_header("x-tenant", "t1"),
        )
        .expect("client");
        let manifest = ServiceManifest::new("S")
            .with_host("https://example.com")
            .with_method(MethodManifest::new("ping", HttpMethod::Get, "/ping").with_header("x-tenant: t2"));
        let request = client
            .assemble(&manifest, "ping", Vec::new(), None)
            .expect("assemble");
        assert_eq!(request.headers.get("user-agent"), Some("tests/1.0"));
        assert_eq!(request.headers.get("x-tenant"), Some("t2"));
    }
}
