//! Purpose: Per-call override surface supplied by callers.
//! Exports: `RequestOptions`, `RequestCallback`, `BodyMode`.
//! Role: Carried as an `Arg::Options` argument or passed beside the arguments.
//! Invariants: Callbacks run after headers and body are set, in registration order.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::http::{Context, Headers, HttpRequest};

/// How a wrapped response's body is turned into its payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    #[default]
    Eager,
    Lazy,
    Stream,
    Ignore,
}

impl BodyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BodyMode::Eager => "eager",
            BodyMode::Lazy => "lazy",
            BodyMode::Stream => "stream",
            BodyMode::Ignore => "ignore",
        }
    }
}

impl FromStr for BodyMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "eager" => Ok(BodyMode::Eager),
            "lazy" => Ok(BodyMode::Lazy),
            "stream" => Ok(BodyMode::Stream),
            "ignore" => Ok(BodyMode::Ignore),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown body mode `{value}`"))
                .with_hint("Use one of: eager, lazy, stream, ignore.")),
        }
    }
}

pub type RequestCallback = Arc<dyn Fn(&mut HttpRequest) -> Result<(), Error> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RequestOptions {
    pub(crate) headers: Headers,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body_mode: Option<BodyMode>,
    pub(crate) context: Context,
    pub(crate) callbacks: Vec<RequestCallback>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any same-named header the method would otherwise send.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Appended after the method's own query parameters; the value is percent-encoded.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body_mode(mut self, mode: BodyMode) -> Self {
        self.body_mode = Some(mode);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_callback(
        mut self,
        callback: impl Fn(&mut HttpRequest) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.push(Arc::new(callback));
        self
    }

    pub fn body_mode(&self) -> Option<BodyMode> {
        self.body_mode
    }

    pub(crate) fn merge(&mut self, other: RequestOptions) {
        self.headers.extend_replacing(&other.headers);
        self.query.extend(other.query);
        if other.body_mode.is_some() {
            self.body_mode = other.body_mode;
        }
        self.context.merge(&other.context);
        self.callbacks.extend(other.callbacks);
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("body_mode", &self.body_mode)
            .field("context", &self.context)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
