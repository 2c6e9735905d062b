//! Purpose: Build wrapped responses through per-type constructor strategies.
//! Exports: `WrappedResponse`, `Constructor`, `ConstructorArgs`, `ConstructorPlan`,
//! Exports: `ConstructorCache`, `ResponseTypes`, `SimpleResponse`, `ResponseBase`.
//! Role: The dispatcher asks the cache for a plan once per concrete type, then invokes it.
//! Invariants: Selection prefers the highest arity among registered 3-5 argument constructors.
//! Invariants: A selected plan is never re-selected; failed selections are not cached.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::http::{Headers, RequestHead};
use crate::core::payload::Payload;
use crate::core::types::{RESPONSE, RESPONSE_BASE, TypeRef};

/// Status, headers, and payload of a response, plus the request that produced it.
pub trait WrappedResponse: fmt::Debug + Send {
    fn type_name(&self) -> &str;
    fn request(&self) -> &RequestHead;
    fn status(&self) -> u16;
    fn headers(&self) -> &Headers;
    fn payload(&self) -> &Payload;
    fn into_payload(self: Box<Self>) -> Payload;
    fn typed_headers(&self) -> Option<&Value> {
        None
    }
    fn as_any(&self) -> &dyn Any;
}

/// Everything a constructor may receive; fields beyond its arity are `None`.
#[derive(Debug)]
pub struct ConstructorArgs {
    pub request: RequestHead,
    pub status: u16,
    pub headers: Headers,
    pub payload: Option<Payload>,
    pub typed_headers: Option<Value>,
}

type ConstructFn =
    Arc<dyn Fn(ConstructorArgs) -> Result<Box<dyn WrappedResponse>, Error> + Send + Sync>;

#[derive(Clone)]
pub struct Constructor {
    arity: usize,
    invoke: ConstructFn,
}

impl Constructor {
    /// Raw form; `arity` is trusted and checked again when invoked.
    pub fn new(
        arity: usize,
        invoke: impl Fn(ConstructorArgs) -> Result<Box<dyn WrappedResponse>, Error>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            arity,
            invoke: Arc::new(invoke),
        }
    }

    /// `(request, status, headers)`.
    pub fn three<W: WrappedResponse + 'static>(
        build: impl Fn(RequestHead, u16, Headers) -> W + Send + Sync + 'static,
    ) -> Self {
        Self::new(3, move |args| {
            Ok(Box::new(build(args.request, args.status, args.headers)) as Box<dyn WrappedResponse>)
        })
    }

    /// `(request, status, headers, payload)`.
    pub fn four<W: WrappedResponse + 'static>(
        build: impl Fn(RequestHead, u16, Headers, Payload) -> W + Send + Sync + 'static,
    ) -> Self {
        Self::new(4, move |args| {
            let payload = args.payload.unwrap_or(Payload::Empty);
            Ok(Box::new(build(args.request, args.status, args.headers, payload))
                as Box<dyn WrappedResponse>)
        })
    }

    /// `(request, status, headers, payload, typed headers)`.
    pub fn five<W: WrappedResponse + 'static>(
        build: impl Fn(RequestHead, u16, Headers, Payload, Value) -> W + Send + Sync + 'static,
    ) -> Self {
        Self::new(5, move |args| {
            let payload = args.payload.unwrap_or(Payload::Empty);
            let typed = args.typed_headers.unwrap_or(Value::Null);
            Ok(
                Box::new(build(args.request, args.status, args.headers, payload, typed))
                    as Box<dyn WrappedResponse>,
            )
        })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Constructors available per concrete wrapper type name.
#[derive(Clone, Debug)]
pub struct ResponseTypes {
    constructors: HashMap<String, Vec<Constructor>>,
}

impl Default for ResponseTypes {
    fn default() -> Self {
        let mut types = Self {
            constructors: HashMap::new(),
        };
        types.register(RESPONSE, Constructor::four(SimpleResponse::new));
        types.register(RESPONSE_BASE, Constructor::five(ResponseBase::new));
        types
    }
}

impl ResponseTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, constructor: Constructor) {
        self.constructors
            .entry(type_name.into())
            .or_default()
            .push(constructor);
    }

    pub fn constructors(&self, type_name: &str) -> &[Constructor] {
        self.constructors
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct ConstructorPlan {
    type_name: String,
    constructor: Constructor,
}

impl ConstructorPlan {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn arity(&self) -> usize {
        self.constructor.arity
    }

    pub fn construct(
        &self,
        request: RequestHead,
        status: u16,
        headers: Headers,
        payload: Payload,
    ) -> Result<Box<dyn WrappedResponse>, Error> {
        let args = match self.constructor.arity {
            3 => ConstructorArgs {
                request,
                status,
                headers,
                payload: None,
                typed_headers: None,
            },
            4 => ConstructorArgs {
                request,
                status,
                headers,
                payload: Some(payload),
                typed_headers: None,
            },
            5 => {
                let typed = headers.to_json();
                ConstructorArgs {
                    request,
                    status,
                    headers,
                    payload: Some(payload),
                    typed_headers: Some(typed),
                }
            }
            other => {
                return Err(Error::new(ErrorKind::Internal).with_message(format!(
                    "constructor for `{}` has unsupported arity {other}",
                    self.type_name
                )));
            }
        };
        (self.constructor.invoke)(args)
    }
}

/// Memoized constructor selection, keyed by concrete type name.
#[derive(Debug, Default)]
pub struct ConstructorCache {
    plans: DashMap<String, Arc<ConstructorPlan>>,
}

impl ConstructorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_for(
        &self,
        types: &ResponseTypes,
        ty: &TypeRef,
    ) -> Result<Arc<ConstructorPlan>, Error> {
        if let Some(plan) = self.plans.get(ty.name()) {
            return Ok(Arc::clone(plan.value()));
        }
        let constructor = types
            .constructors(ty.name())
            .iter()
            .filter(|constructor| (3..=5).contains(&constructor.arity))
            .max_by_key(|constructor| constructor.arity)
            .cloned()
            .ok_or_else(|| {
                Error::configuration(format!("no viable constructor for `{ty}`")).with_hint(
                    "Register a 3-5 argument constructor with ClientOptions::with_response_type.",
                )
            })?;
        debug!(
            type_name = ty.name(),
            arity = constructor.arity,
            "selected response constructor"
        );
        let plan = Arc::new(ConstructorPlan {
            type_name: ty.name().to_string(),
            constructor,
        });
        let entry = self.plans.entry(ty.name().to_string()).or_insert(plan);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Built-in `Response<T>`.
#[derive(Debug)]
pub struct SimpleResponse {
    request: RequestHead,
    status: u16,
    headers: Headers,
    payload: Payload,
}

impl SimpleResponse {
    pub fn new(request: RequestHead, status: u16, headers: Headers, payload: Payload) -> Self {
        Self {
            request,
            status,
            headers,
            payload,
        }
    }
}

impl WrappedResponse for SimpleResponse {
    fn type_name(&self) -> &str {
        RESPONSE
    }

    fn request(&self) -> &RequestHead {
        &self.request
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn into_payload(self: Box<Self>) -> Payload {
        self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Built-in `ResponseBase<H, T>`: a `Response<T>` that also carries typed headers.
#[derive(Debug)]
pub struct ResponseBase {
    inner: SimpleResponse,
    typed_headers: Value,
}

impl ResponseBase {
    pub fn new(
        request: RequestHead,
        status: u16,
        headers: Headers,
        payload: Payload,
        typed_headers: Value,
    ) -> Self {
        Self {
            inner: SimpleResponse::new(request, status, headers, payload),
            typed_headers,
        }
    }
}

impl WrappedResponse for ResponseBase {
    fn type_name(&self) -> &str {
        RESPONSE_BASE
    }

    fn request(&self) -> &RequestHead {
        &self.inner.request
    }

    fn status(&self) -> u16 {
        self.inner.status
    }

    fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    fn payload(&self) -> &Payload {
        &self.inner.payload
    }

    fn into_payload(self: Box<Self>) -> Payload {
        self.inner.payload
    }

    fn typed_headers(&self) -> Option<&Value> {
        Some(&self.typed_headers)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
