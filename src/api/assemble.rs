//! Purpose: Turn a compiled descriptor plus call arguments into a wire request.
//! Exports: `Assembled`, `assemble`.
//! Role: Interpreter front half; runs before length enforcement and the transport send.
//! Invariants: Steps run in a fixed order: url, query, body, headers, then callbacks.
//! Invariants: A rendered path that is itself an absolute URL replaces host and path verbatim.
//! Invariants: Argument headers replace static headers; per-call headers replace both.
use tracing::trace;
use url::Url;

use crate::core::descriptor::{BodySlot, ServiceMethodDescriptor};
use crate::core::error::{Error, ErrorKind};
use crate::core::http::{Context, Headers, HttpRequest, RequestBody, RequestUrl};
use crate::core::options::{BodyMode, RequestOptions};
use crate::core::params::RequestParts;
use crate::core::serializer::{
    APPLICATION_FORM, APPLICATION_JSON, APPLICATION_OCTET_STREAM, Encoding, Serializer,
};
use crate::core::template::encode_component;
use crate::core::value::{Arg, ResponseListener};

const DEFAULT_SCHEME: &str = "https";

/// A request ready for the transport, plus the per-call state the dispatcher needs.
#[derive(Debug)]
pub struct Assembled {
    pub request: HttpRequest,
    pub listener: Option<ResponseListener>,
    pub body_mode: Option<BodyMode>,
}

pub fn assemble(
    descriptor: &ServiceMethodDescriptor,
    mut args: Vec<Arg>,
    call_options: Option<RequestOptions>,
    default_headers: &Headers,
    serializer: &dyn Serializer,
) -> Result<Assembled, Error> {
    let mut options = take_special(&mut args, descriptor.options_index, |arg| match arg {
        Arg::Options(options) => Some(options),
        _ => None,
    })
    .unwrap_or_default();
    if let Some(call_options) = call_options {
        options.merge(call_options);
    }
    let listener = take_special(&mut args, descriptor.listener_index, |arg| match arg {
        Arg::Listener(listener) => Some(listener),
        _ => None,
    });
    let mut context = take_special(&mut args, descriptor.context_index, |arg| match arg {
        Arg::Context(context) => Some(context),
        _ => None,
    })
    .unwrap_or_else(Context::new);
    context.merge(&options.context);

    let mut parts = RequestParts::default();
    for processor in &descriptor.query {
        processor.apply(&args, &mut parts);
    }
    for processor in &descriptor.headers {
        processor.apply(&args, &mut parts);
    }
    for processor in &descriptor.form {
        processor.apply(&args, &mut parts);
    }

    let mut query: Vec<String> = descriptor.static_query.clone();
    query.append(&mut parts.query);
    query.extend(
        options
            .query
            .iter()
            .map(|(name, value)| format!("{}={}", encode_component(name), encode_component(value))),
    );
    let url = build_url(descriptor, &args, &query)?;

    let mut request = HttpRequest::new(descriptor.http_method, url);
    request.context = context;
    request.headers.extend_replacing(default_headers);

    if descriptor.has_form() {
        if parts.form.is_empty() {
            request.set_body(RequestBody::Empty);
        } else {
            request.set_body(RequestBody::Bytes(parts.form.join("&").into()));
            request.headers.set("Content-Type", APPLICATION_FORM);
        }
    } else {
        let body = match &descriptor.body {
            Some(slot) => args
                .get_mut(slot.index)
                .map(|arg| std::mem::replace(arg, Arg::Null))
                .map(|arg| (slot, arg)),
            None => None,
        };
        match body {
            Some((slot, arg)) if !arg.is_null() => {
                let (body, content_type) = encode_body(slot, arg, serializer)?;
                request.set_body(body);
                request.headers.set("Content-Type", content_type);
            }
            _ => request.set_body(RequestBody::Empty),
        }
    }

    request.headers.extend_replacing(&descriptor.static_headers);
    request.headers.extend_replacing(&parts.headers);
    request.headers.extend_replacing(&options.headers);

    for callback in &options.callbacks {
        callback(&mut request)?;
    }

    trace!(
        service = %descriptor.service,
        method = %descriptor.name,
        http_method = request.method.as_str(),
        url = %request.url,
        headers = request.headers.len(),
        body = ?request.body,
        "assembled request"
    );

    Ok(Assembled {
        request,
        listener,
        body_mode: options.body_mode,
    })
}

fn take_special<T>(
    args: &mut [Arg],
    index: Option<usize>,
    pick: impl FnOnce(Arg) -> Option<T>,
) -> Option<T> {
    let slot = args.get_mut(index?)?;
    pick(std::mem::replace(slot, Arg::Null))
}

fn build_url(
    descriptor: &ServiceMethodDescriptor,
    args: &[Arg],
    query: &[String],
) -> Result<RequestUrl, Error> {
    let path = descriptor.path.render(args);
    let mut target = match absolute_target(&path) {
        Some(absolute) => absolute,
        None => {
            let host = descriptor.host.render(args);
            let (scheme, host) = host
                .split_once("://")
                .unwrap_or((DEFAULT_SCHEME, host.as_str()));
            let host = host.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{scheme}://{host}/{path}")
        }
    };
    if !query.is_empty() {
        target.push(if target.contains('?') { '&' } else { '?' });
        target.push_str(&query.join("&"));
    }
    RequestUrl::parse(target.as_str()).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to assemble request url `{target}`"))
            .with_source(err)
    })
}

fn absolute_target(path: &str) -> Option<String> {
    if !path.contains("://") {
        return None;
    }
    let parsed = Url::parse(path).ok()?;
    (!parsed.scheme().is_empty()).then(|| path.to_string())
}

fn encode_body(
    slot: &BodySlot,
    arg: Arg,
    serializer: &dyn Serializer,
) -> Result<(RequestBody, String), Error> {
    let content_type = slot.content_type.clone().unwrap_or_else(|| {
        if arg.is_binary_like() {
            APPLICATION_OCTET_STREAM.to_string()
        } else {
            APPLICATION_JSON.to_string()
        }
    });
    let encoding = Encoding::from_content_type(Some(&content_type));
    let body = match arg {
        Arg::Serializable(value) => RequestBody::Bytes(value.to_wire(encoding)?),
        Arg::Stream(stream) => RequestBody::Stream(stream),
        other if encoding == Encoding::Json => {
            RequestBody::Bytes(serializer.encode(&other.to_json()?, Encoding::Json)?)
        }
        Arg::Bytes(bytes) => RequestBody::Bytes(bytes),
        Arg::Str(text) => RequestBody::Bytes(text.into()),
        other => RequestBody::Bytes(serializer.encode(&other.to_json()?, encoding)?),
    };
    Ok((body, content_type))
}

#[cfg(test)]
mod tests {
    use super::assemble;
    use crate::core::descriptor::{ServiceMethodDescriptor, compile_method};
    use crate::core::error::ErrorKind;
    use crate::core::http::{BodyStream, Headers, HttpMethod, RequestBody};
    use crate::core::manifest::{MethodManifest, ParamManifest, ServiceManifest};
    use crate::core::options::RequestOptions;
    use crate::core::serializer::JsonSerializer;
    use crate::core::value::Arg;
    use bytes::Bytes;
    use serde_json::json;
    use std::io::Cursor;

    fn compile(method: MethodManifest) -> ServiceMethodDescriptor {
        let service = ServiceManifest::new("Widgets").with_host("https://api.example.com");
        compile_method(&service, &method).expect("compile")
    }

    fn run(
        descriptor: &ServiceMethodDescriptor,
        args: Vec<Arg>,
        options: Option<RequestOptions>,
    ) -> crate::core::http::HttpRequest {
        assemble(descriptor, args, options, &Headers::new(), &JsonSerializer)
            .expect("assemble")
            .request
    }

    #[test]
    fn joins_host_and_path_with_one_slash() {
        let service = ServiceManifest::new("S").with_host("api.example.com/");
        let method = MethodManifest::new("get", HttpMethod::Get, "/widgets/{id}")
            .with_param(ParamManifest::path("id"));
        let descriptor = compile_method(&service, &method).expect("compile");
        let request = assemble(
            &descriptor,
            vec![Arg::from("42")],
            None,
            &Headers::new(),
            &JsonSerializer,
        )
        .expect("assemble")
        .request;
        assert_eq!(request.url.as_str(), "https://api.example.com/widgets/42");
    }

    #[test]
    fn absolute_path_argument_is_used_verbatim() {
        let descriptor = compile(
            MethodManifest::new("next", HttpMethod::Get, "{next}")
                .with_param(ParamManifest::path("next").with_encode(false)),
        );
        let link = "https://other.example.net/page?token=abc";
        let request = run(&descriptor, vec![Arg::from(link)], None);
        assert_eq!(request.url.as_str(), link);
    }

    #[test]
    fn absolute_link_is_not_normalized() {
        let descriptor = compile(
            MethodManifest::new("next", HttpMethod::Get, "{next}")
                .with_param(ParamManifest::path("next").with_encode(false)),
        );
        for link in [
            "https://other.example.net",
            "https://other.example.net/a/../b?x=1",
            "https://other.example.net/./c/",
        ] {
            let request = run(&descriptor, vec![Arg::from(link)], None);
            assert_eq!(request.url.as_str(), link);
            assert_eq!(request.head().url.as_str(), link);
        }
    }

    #[test]
    fn query_order_is_static_then_params_then_overrides() {
        let descriptor = compile(
            MethodManifest::new("list", HttpMethod::Get, "/widgets")
                .with_query("api-version=1")
                .with_param(ParamManifest::query("filter")),
        );
        let request = run(
            &descriptor,
            vec![Arg::from("a b")],
            Some(RequestOptions::new().with_query("extra", "x&y")),
        );
        assert_eq!(
            request.url.query(),
            Some("api-version=1&filter=a%20b&extra=x%26y")
        );
    }

    #[test]
    fn null_body_sets_zero_length_without_content_type() {
        let descriptor = compile(
            MethodManifest::new("put", HttpMethod::Put, "/w").with_param(ParamManifest::body()),
        );
        let request = run(&descriptor, vec![Arg::Null], None);
        assert_eq!(request.headers.get("Content-Length"), Some("0"));
        assert!(!request.headers.contains("Content-Type"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn json_body_is_serialized_with_length() {
        let descriptor = compile(
            MethodManifest::new("put", HttpMethod::Put, "/w").with_param(ParamManifest::body()),
        );
        let request = run(&descriptor, vec![Arg::Json(json!({"name": "w"}))], None);
        assert_eq!(request.headers.get("Content-Type"), Some("application/json"));
        assert_eq!(request.headers.get("Content-Length"), Some("12"));
        let body = request.body.into_bytes().expect("bytes");
        assert_eq!(body.as_ref(), br#"{"name":"w"}"#);
    }

    #[test]
    fn binary_like_bodies_infer_octet_stream() {
        let descriptor = compile(
            MethodManifest::new("put", HttpMethod::Put, "/w").with_param(ParamManifest::body()),
        );
        let request = run(&descriptor, vec![Arg::Bytes(Bytes::from_static(b"raw"))], None);
        assert_eq!(
            request.headers.get("Content-Type"),
            Some("application/octet-stream")
        );

        let stream = BodyStream::new(Cursor::new(b"streamed".to_vec())).with_length(8);
        let request = run(&descriptor, vec![Arg::Stream(stream)], None);
        assert!(matches!(request.body, RequestBody::Stream(_)));
        assert_eq!(request.headers.get("Content-Length"), Some("8"));
    }

    #[test]
    fn form_fields_skip_nulls() {
        let descriptor = compile(
            MethodManifest::new("submit", HttpMethod::Post, "/forms")
                .with_param(ParamManifest::form("a"))
                .with_param(ParamManifest::form("b")),
        );
        let request = run(&descriptor, vec![Arg::from("x y"), Arg::Null], None);
        assert_eq!(
            request.headers.get("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(request.body.into_bytes().expect("bytes").as_ref(), b"a=x%20y");
    }

    #[test]
    fn header_precedence_is_static_then_argument_then_override() {
        let descriptor = compile(
            MethodManifest::new("get", HttpMethod::Get, "/w")
                .with_header("x-mode: static")
                .with_header("x-keep: kept")
                .with_param(ParamManifest::header("X-Mode"))
                .with_param(ParamManifest::header("x-other")),
        );
        let request = run(
            &descriptor,
            vec![Arg::from("argument"), Arg::from("value")],
            Some(RequestOptions::new().with_header("x-other", "override")),
        );
        assert_eq!(request.headers.get("x-mode"), Some("argument"));
        assert_eq!(request.headers.get("x-keep"), Some("kept"));
        assert_eq!(request.headers.get("x-other"), Some("override"));
    }

    #[test]
    fn per_call_query_encodes_name_and_value() {
        let descriptor = compile(MethodManifest::new("get", HttpMethod::Get, "/w"));
        let options = RequestOptions::new().with_query("sort by", "a&b");
        let request = run(&descriptor, Vec::new(), Some(options));
        assert_eq!(request.url.query(), Some("sort%20by=a%26b"));
    }

    #[test]
    fn callback_runs_last_and_may_replace_body() {
        let descriptor = compile(
            MethodManifest::new("put", HttpMethod::Put, "/w").with_param(ParamManifest::body()),
        );
        let options = RequestOptions::new().with_callback(|request| {
            assert_eq!(request.headers.get("Content-Type"), Some("application/json"));
            request.set_body(RequestBody::Bytes(Bytes::from_static(b"replaced")));
            Ok(())
        });
        let request = run(&descriptor, vec![Arg::Json(json!([1]))], Some(options));
        assert_eq!(request.headers.get("Content-Length"), Some("8"));
    }

    #[test]
    fn options_argument_is_consumed_not_rendered() {
        let descriptor = compile(
            MethodManifest::new("get", HttpMethod::Get, "/w")
                .with_param(ParamManifest::options())
                .with_param(ParamManifest::query("q")),
        );
        let request = run(
            &descriptor,
            vec![
                Arg::Options(RequestOptions::new().with_header("x-trace", "1")),
                Arg::from("v"),
            ],
            None,
        );
        assert_eq!(request.headers.get("x-trace"), Some("1"));
        assert_eq!(request.url.query(), Some("q=v"));
    }

    #[test]
    fn bad_url_is_io_error() {
        let service = ServiceManifest::new("S").with_host("https://exa mple.com");
        let descriptor =
            compile_method(&service, &MethodManifest::new("get", HttpMethod::Get, "/")).expect("compile");
        let err = assemble(&descriptor, Vec::new(), None, &Headers::new(), &JsonSerializer)
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
