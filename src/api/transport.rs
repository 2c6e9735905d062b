//! Purpose: Transport seam plus the blocking ureq-backed implementation.
//! Exports: `Transport`, `UreqTransport`.
//! Role: The only place a request leaves the process; owns retry/redirect/pooling policy.
//! Invariants: Non-2xx statuses come back as ordinary responses, never as errors.
//! Invariants: Network failures surface as `ErrorKind::Transport` with the cause as source.
use tracing::trace;

use crate::core::error::{Error, ErrorKind};
use crate::core::http::{Headers, HttpRequest, HttpResponse, RequestBody, ResponseBody};

pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}

impl<F> Transport for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse, Error> + Send + Sync,
{
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self(request)
    }
}

#[derive(Clone, Debug)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            context,
        } = request;
        trace!(
            method = method.as_str(),
            url = %url,
            context = ?context,
            "sending request"
        );
        let mut call = self.agent.request(method.as_str(), url.as_str());
        for (name, values) in headers.iter() {
            call = call.set(name, &values.join(","));
        }
        let result = match body {
            RequestBody::Empty => call.call(),
            RequestBody::Bytes(bytes) => call.send_bytes(&bytes),
            RequestBody::Stream(stream) => call.send(stream.reader),
            RequestBody::Deferred(realize) => {
                let bytes = realize()?;
                call.send_bytes(&bytes)
            }
        };
        match result {
            Ok(resp) | Err(ureq::Error::Status(_, resp)) => Ok(into_response(resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message(format!("{} {url} failed", method.as_str()))
                .with_source(err)),
        }
    }
}

fn into_response(resp: ureq::Response) -> HttpResponse {
    let status = resp.status();
    let mut headers = Headers::new();
    for name in resp.headers_names() {
        for value in resp.all(&name) {
            headers.add(name.clone(), value);
        }
    }
    HttpResponse {
        status,
        headers,
        body: ResponseBody::from_reader(resp.into_reader()),
    }
}

#[cfg(test)]
mod tests {
    use super::Transport;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::http::{HttpMethod, HttpRequest, HttpResponse};
    use url::Url;

    #[test]
    fn closures_act_as_transports() {
        let transport = |request: HttpRequest| -> Result<HttpResponse, Error> {
            Ok(HttpResponse::new(200).with_header("x-path", request.url.path()))
        };
        let url = Url::parse("https://example.com/ping").expect("url");
        let response = transport
            .send(HttpRequest::new(HttpMethod::Get, url))
            .expect("send");
        assert_eq!(response.headers.get("X-Path"), Some("/ping"));
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let transport = super::UreqTransport::new();
        let url = Url::parse("http://127.0.0.1:9/unreachable").expect("url");
        let err = transport
            .send(HttpRequest::new(HttpMethod::Get, url))
            .expect_err("refused");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_retryable());
    }
}
