//! Purpose: Compile a method manifest into an immutable invocation plan.
//! Exports: `compile_method`, `ServiceMethodDescriptor`, `ExpectedStatus`,
//! Exports: `ExceptionTable`, `ExceptionType`, `ReturnShape`, `BodySlot`.
//! Role: Called by the registry on first use of a method; pure and side-effect free.
//! Invariants: Every failure is `ErrorKind::Configuration` naming the missing metadata.
//! Invariants: Form parameters suppress a separately declared body parameter.
//! Invariants: Placeholder names not bound by a host/path parameter stay literal.
use std::collections::HashMap;

use serde_json::{Value, json};

use crate::core::error::Error;
use crate::core::http::{Headers, HttpMethod};
use crate::core::manifest::{MethodManifest, ParamManifest, ParamRole, ServiceManifest};
use crate::core::params::ParameterProcessor;
use crate::core::template::{PlaceholderBinding, PlaceholderTable, UrlTemplate, encode_component};
use crate::core::types::TypeRef;
use crate::core::wire::WireType;

/// Exception type used when a method declares no default of its own.
pub const DEFAULT_EXCEPTION: &str = "HttpResponseException";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExpectedStatus {
    Explicit(Vec<u16>),
    Below400,
}

impl ExpectedStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            ExpectedStatus::Explicit(statuses) => statuses.contains(&status),
            ExpectedStatus::Below400 => status < 400,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExceptionType {
    pub name: String,
    pub body: TypeRef,
}

impl ExceptionType {
    /// Untyped exception whose body decodes as a generic JSON value.
    pub fn untyped() -> Self {
        Self {
            name: DEFAULT_EXCEPTION.to_string(),
            body: TypeRef::named("Object"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExceptionTable {
    by_status: HashMap<u16, ExceptionType>,
    default: ExceptionType,
}

impl ExceptionTable {
    pub fn resolve(&self, status: u16) -> &ExceptionType {
        self.by_status.get(&status).unwrap_or(&self.default)
    }

    pub fn default_type(&self) -> &ExceptionType {
        &self.default
    }
}

#[derive(Clone, Debug)]
pub struct ReturnShape {
    pub declared: TypeRef,
    pub wrapped: bool,
    /// Payload type: the wrapper's single type argument, or the declared type itself.
    pub body: TypeRef,
    pub decodable: bool,
    pub wire_type: Option<WireType>,
}

impl ReturnShape {
    fn resolve(declared: &TypeRef, wire_type: Option<WireType>) -> Self {
        let (wrapped, body) = match declared.response_ancestor() {
            Some(ancestor) => (
                true,
                ancestor.args().first().cloned().unwrap_or_else(TypeRef::void),
            ),
            None => (false, declared.clone()),
        };
        Self {
            declared: declared.clone(),
            wrapped,
            decodable: body.is_decodable(),
            body,
            wire_type,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BodySlot {
    pub index: usize,
    pub content_type: Option<String>,
    pub ty: Option<TypeRef>,
}

#[derive(Clone, Debug)]
pub struct ServiceMethodDescriptor {
    pub(crate) service: String,
    pub(crate) name: String,
    pub(crate) http_method: HttpMethod,
    pub(crate) host: UrlTemplate,
    pub(crate) path: UrlTemplate,
    pub(crate) static_headers: Headers,
    pub(crate) static_query: Vec<String>,
    pub(crate) query: Vec<ParameterProcessor>,
    pub(crate) headers: Vec<ParameterProcessor>,
    pub(crate) form: Vec<ParameterProcessor>,
    pub(crate) body: Option<BodySlot>,
    pub(crate) expected: ExpectedStatus,
    pub(crate) exceptions: ExceptionTable,
    pub(crate) returns: ReturnShape,
    pub(crate) context_index: Option<usize>,
    pub(crate) options_index: Option<usize>,
    pub(crate) listener_index: Option<usize>,
}

impl ServiceMethodDescriptor {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn http_method(&self) -> HttpMethod {
        self.http_method
    }

    pub fn host_template(&self) -> &UrlTemplate {
        &self.host
    }

    pub fn path_template(&self) -> &UrlTemplate {
        &self.path
    }

    pub fn static_headers(&self) -> &Headers {
        &self.static_headers
    }

    pub fn static_query(&self) -> &[String] {
        &self.static_query
    }

    pub fn processors(&self) -> impl Iterator<Item = &ParameterProcessor> {
        self.query.iter().chain(&self.headers).chain(&self.form)
    }

    pub fn body(&self) -> Option<&BodySlot> {
        self.body.as_ref()
    }

    pub fn has_form(&self) -> bool {
        !self.form.is_empty()
    }

    pub fn expected(&self) -> &ExpectedStatus {
        &self.expected
    }

    pub fn exceptions(&self) -> &ExceptionTable {
        &self.exceptions
    }

    pub fn returns(&self) -> &ReturnShape {
        &self.returns
    }

    pub fn summary_json(&self) -> Value {
        let expected = match &self.expected {
            ExpectedStatus::Explicit(statuses) => json!(statuses),
            ExpectedStatus::Below400 => json!("<400"),
        };
        let mut exceptions: Vec<Value> = self
            .exceptions
            .by_status
            .iter()
            .map(|(status, ty)| json!({"status": status, "type": ty.name, "body": ty.body.to_string()}))
            .collect();
        exceptions.sort_by_key(|entry| entry["status"].as_u64());
        let processors: Vec<Value> = self
            .processors()
            .map(|processor| json!({"index": processor.index(), "kind": processor.label()}))
            .collect();
        json!({
            "service": self.service,
            "method": self.name,
            "http_method": self.http_method.as_str(),
            "host": self.host.source(),
            "path": self.path.source(),
            "placeholders": self.host.placeholder_count() + self.path.placeholder_count(),
            "static_headers": self.static_headers.to_json(),
            "static_query": self.static_query,
            "processors": processors,
            "body": self.body.as_ref().map(|slot| json!({
                "index": slot.index,
                "content_type": slot.content_type,
                "type": slot.ty.as_ref().map(ToString::to_string),
            })),
            "form": self.has_form(),
            "expected_statuses": expected,
            "exceptions": exceptions,
            "default_exception": {
                "type": self.exceptions.default.name,
                "body": self.exceptions.default.body.to_string(),
            },
            "returns": {
                "declared": self.returns.declared.to_string(),
                "wrapped": self.returns.wrapped,
                "body": self.returns.body.to_string(),
                "decodable": self.returns.decodable,
                "wire_type": self.returns.wire_type.map(WireType::as_str),
            },
        })
    }
}

pub fn compile_method(
    service: &ServiceManifest,
    method: &MethodManifest,
) -> Result<ServiceMethodDescriptor, Error> {
    compile_inner(service, method)
        .map_err(|err| err.with_service(service.name.clone()).with_method(method.name.clone()))
}

fn compile_inner(
    service: &ServiceManifest,
    method: &MethodManifest,
) -> Result<ServiceMethodDescriptor, Error> {
    let http_method = method
        .http_method
        .ok_or_else(|| Error::configuration("missing http method"))?;
    let path_source = method
        .path
        .as_deref()
        .ok_or_else(|| Error::configuration("missing path template"))?;
    let host_source = service
        .host
        .as_deref()
        .ok_or_else(|| Error::configuration("missing host template"))?;

    let mut host_table = PlaceholderTable::new();
    let mut path_table = PlaceholderTable::new();
    let mut query = Vec::new();
    let mut headers = Vec::new();
    let mut form = Vec::new();
    let mut body = None;
    let mut context_index = None;
    let mut options_index = None;
    let mut listener_index = None;

    for (index, param) in method.params.iter().enumerate() {
        match param.role {
            ParamRole::Host => {
                let name = required_name(param, index)?;
                host_table.insert(
                    name.to_string(),
                    PlaceholderBinding {
                        index,
                        encode: param.encode.unwrap_or(false),
                    },
                );
            }
            ParamRole::Path => {
                let name = required_name(param, index)?;
                path_table.insert(
                    name.to_string(),
                    PlaceholderBinding {
                        index,
                        encode: param.encode.unwrap_or(true),
                    },
                );
            }
            ParamRole::Query => {
                let name = required_name(param, index)?.to_string();
                let encode = param.encode.unwrap_or(true);
                query.push(if param.multiple {
                    ParameterProcessor::ListQuery {
                        index,
                        name,
                        encode,
                    }
                } else {
                    ParameterProcessor::SingleQuery {
                        index,
                        name,
                        encode,
                    }
                });
            }
            ParamRole::Header => {
                let name = required_name(param, index)?.to_string();
                headers.push(ParameterProcessor::SimpleHeader { index, name });
            }
            ParamRole::HeaderMap => {
                let prefix = param.name.clone().unwrap_or_default();
                headers.push(ParameterProcessor::HeaderMap { index, prefix });
            }
            ParamRole::Body => {
                body = Some(BodySlot {
                    index,
                    content_type: param.content_type.clone(),
                    ty: param.ty.clone(),
                });
            }
            ParamRole::Form => {
                let name = required_name(param, index)?.to_string();
                form.push(ParameterProcessor::FormField {
                    index,
                    name,
                    encode: param.encode.unwrap_or(true),
                });
            }
            ParamRole::Context => context_index = Some(index),
            ParamRole::Options => options_index = Some(index),
            ParamRole::Listener => listener_index = Some(index),
        }
    }

    if !form.is_empty() {
        body = None;
    }

    let static_headers = parse_static_headers(&method.headers)?;
    let static_query = method.query.iter().map(|raw| parse_static_query(raw)).collect();

    let expected = if method.expected_statuses.is_empty() {
        ExpectedStatus::Below400
    } else {
        ExpectedStatus::Explicit(method.expected_statuses.clone())
    };

    Ok(ServiceMethodDescriptor {
        service: service.name.clone(),
        name: method.name.clone(),
        http_method,
        host: UrlTemplate::compile(host_source, &host_table),
        path: UrlTemplate::compile(path_source, &path_table),
        static_headers,
        static_query,
        query,
        headers,
        form,
        body,
        expected,
        exceptions: build_exception_table(method)?,
        returns: ReturnShape::resolve(&method.returns, method.wire_type),
        context_index,
        options_index,
        listener_index,
    })
}

fn required_name(param: &ParamManifest, index: usize) -> Result<&str, Error> {
    match param.name.as_deref() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(Error::configuration(format!(
            "{} parameter #{index} has no name",
            param.role.as_str()
        ))),
    }
}

fn parse_static_headers(raw: &[String]) -> Result<Headers, Error> {
    let mut headers = Headers::new();
    for declaration in raw {
        let Some((name, values)) = declaration.split_once(':') else {
            return Err(Error::configuration(format!(
                "static header `{declaration}` is missing `:`"
            )));
        };
        let values = values
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        headers.set_values(name.trim(), values);
    }
    Ok(headers)
}

fn parse_static_query(raw: &str) -> String {
    match raw.split_once('=') {
        Some((name, value)) => format!("{}={}", encode_component(name), encode_component(value)),
        None => encode_component(raw),
    }
}

fn build_exception_table(method: &MethodManifest) -> Result<ExceptionTable, Error> {
    let mut by_status = HashMap::new();
    let mut default = None;
    for entry in &method.exceptions {
        let ty = ExceptionType {
            name: entry.type_name.clone(),
            body: entry.body.clone().unwrap_or_else(|| TypeRef::named("Object")),
        };
        if entry.statuses.is_empty() {
            if default.is_some() {
                return Err(Error::configuration(
                    "more than one exception entry has no statuses",
                ));
            }
            default = Some(ty);
            continue;
        }
        for status in &entry.statuses {
            by_status.insert(*status, ty.clone());
        }
    }
    Ok(ExceptionTable {
        by_status,
        default: default.unwrap_or_else(ExceptionType::untyped),
    })
}
