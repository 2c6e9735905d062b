//! Purpose: Declarative service descriptions, loadable from JSON files.
//! Exports: `ServiceManifest`, `MethodManifest`, `ParamManifest`, `ParamRole`,
//! Exports: `ExceptionManifest`.
//! Role: Input of the descriptor compiler; built in code or parsed with serde.
//! Invariants: A parameter's position in `params` is its argument index.
//! Invariants: Manifests are plain data; nothing here validates routing metadata.
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::http::HttpMethod;
use crate::core::types::TypeRef;
use crate::core::wire::WireType;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceManifest {
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodManifest>,
}

impl ServiceManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
            methods: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_method(mut self, method: MethodManifest) -> Self {
        self.methods.push(method);
        self
    }

    pub fn method(&self, name: &str) -> Option<&MethodManifest> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid service manifest: {err}"))
                .with_source(err)
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let raw = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read manifest {}", path.display()))
                .with_source(err)
        })?;
        Self::from_json_str(&raw).map_err(|err| {
            err.with_hint(format!(
                "Check {} against the manifest format in the README.",
                path.display()
            ))
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodManifest {
    pub name: String,
    #[serde(default)]
    pub http_method: Option<HttpMethod>,
    #[serde(default)]
    pub path: Option<String>,
    /// Static `Name: v1,v2` headers.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Static `name=value` query pairs.
    #[serde(default)]
    pub query: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamManifest>,
    #[serde(default)]
    pub expected_statuses: Vec<u16>,
    #[serde(default)]
    pub exceptions: Vec<ExceptionManifest>,
    #[serde(default = "TypeRef::void")]
    pub returns: TypeRef,
    #[serde(default)]
    pub wire_type: Option<WireType>,
}

impl MethodManifest {
    pub fn new(name: impl Into<String>, http_method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http_method: Some(http_method),
            path: Some(path.into()),
            headers: Vec::new(),
            query: Vec::new(),
            params: Vec::new(),
            expected_statuses: Vec::new(),
            exceptions: Vec::new(),
            returns: TypeRef::void(),
            wire_type: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query.push(query.into());
        self
    }

    pub fn with_param(mut self, param: ParamManifest) -> Self {
        self.params.push(param);
        self
    }

    pub fn expect_statuses(mut self, statuses: &[u16]) -> Self {
        self.expected_statuses = statuses.to_vec();
        self
    }

    pub fn with_exception(mut self, exception: ExceptionManifest) -> Self {
        self.exceptions.push(exception);
        self
    }

    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.returns = ty;
        self
    }

    pub fn with_wire_type(mut self, wire_type: WireType) -> Self {
        self.wire_type = Some(wire_type);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    Host,
    Path,
    Query,
    Header,
    /// `name` is the prefix prepended to every map key.
    HeaderMap,
    Body,
    Form,
    Context,
    Options,
    Listener,
}

impl ParamRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamRole::Host => "host",
            ParamRole::Path => "path",
            ParamRole::Query => "query",
            ParamRole::Header => "header",
            ParamRole::HeaderMap => "header_map",
            ParamRole::Body => "body",
            ParamRole::Form => "form",
            ParamRole::Context => "context",
            ParamRole::Options => "options",
            ParamRole::Listener => "listener",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamManifest {
    pub role: ParamRole,
    #[serde(default)]
    pub name: Option<String>,
    /// `None` picks the role default: host values are sent as given, everything else is encoded.
    #[serde(default)]
    pub encode: Option<bool>,
    /// Query only: expand list values into repeated pairs.
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeRef>,
}

impl ParamManifest {
    pub fn new(role: ParamRole) -> Self {
        Self {
            role,
            name: None,
            encode: None,
            multiple: false,
            content_type: None,
            ty: None,
        }
    }

    fn named(role: ParamRole, name: impl Into<String>) -> Self {
        let mut param = Self::new(role);
        param.name = Some(name.into());
        param
    }

    pub fn host(name: impl Into<String>) -> Self {
        Self::named(ParamRole::Host, name)
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::named(ParamRole::Path, name)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::named(ParamRole::Query, name)
    }

    pub fn query_list(name: impl Into<String>) -> Self {
        let mut param = Self::named(ParamRole::Query, name);
        param.multiple = true;
        param
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::named(ParamRole::Header, name)
    }

    pub fn header_map(prefix: impl Into<String>) -> Self {
        Self::named(ParamRole::HeaderMap, prefix)
    }

    pub fn body() -> Self {
        Self::new(ParamRole::Body)
    }

    pub fn form(name: impl Into<String>) -> Self {
        Self::named(ParamRole::Form, name)
    }

    pub fn context() -> Self {
        Self::new(ParamRole::Context)
    }

    pub fn options() -> Self {
        Self::new(ParamRole::Options)
    }

    pub fn listener() -> Self {
        Self::new(ParamRole::Listener)
    }

    pub fn with_encode(mut self, encode: bool) -> Self {
        self.encode = Some(encode);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExceptionManifest {
    /// Empty means this entry is the default for unmatched statuses.
    #[serde(default)]
    pub statuses: Vec<u16>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub body: Option<TypeRef>,
}

impl ExceptionManifest {
    pub fn new(type_name: impl Into<String>, statuses: &[u16]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            type_name: type_name.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: TypeRef) -> Self {
        self.body = Some(body);
        self
    }
}
