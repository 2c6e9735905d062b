//! Purpose: `wirecall` CLI entry point: inspect manifests and invoke declared methods.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty on a TTY, compact otherwise).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::ffi::OsString;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use wirecall::api::{
    Arg, BodyMode, ClientOptions, Error, ErrorBody, ErrorKind, HttpRequest, Payload,
    RequestOptions, ReturnValue, ServiceClient, ServiceManifest, UreqTransport, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.verbose);
    let color_mode = cli.color;

    command_dispatch::dispatch_command(cli.command)
        .map_err(add_transport_hint)
        .map_err(add_status_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "wirecall",
    version,
    about = "Invoke REST methods described by JSON service manifests",
    long_about = None,
    after_help = r#"EXAMPLES
  $ wirecall describe widgets.json
  $ wirecall describe widgets.json --method get
  $ wirecall call widgets.json get --arg 42
  $ wirecall call widgets.json create --arg '{"name":"bolt"}' --dry-run

Arguments are matched to manifest parameters by position. Each --arg is
parsed as JSON when it parses, and taken as a plain string otherwise.
Use --arg @path to send a file's bytes."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, short = 'v', global = true, help = "Log engine activity to stderr")]
    verbose: bool,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BodyModeCli {
    Eager,
    Lazy,
    Stream,
    Ignore,
}

impl From<BodyModeCli> for BodyMode {
    fn from(value: BodyModeCli) -> Self {
        match value {
            BodyModeCli::Eager => BodyMode::Eager,
            BodyModeCli::Lazy => BodyMode::Lazy,
            BodyModeCli::Stream => BodyMode::Stream,
            BodyModeCli::Ignore => BodyMode::Ignore,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Compile a manifest and print its method descriptors")]
    Describe {
        #[arg(help = "Service manifest (JSON)", value_hint = ValueHint::FilePath)]
        manifest: PathBuf,
        #[arg(long, help = "Only describe this method")]
        method: Option<String>,
    },
    #[command(about = "Invoke one method of a manifest")]
    Call {
        #[arg(help = "Service manifest (JSON)", value_hint = ValueHint::FilePath)]
        manifest: PathBuf,
        #[arg(help = "Method name")]
        method: String,
        #[arg(long = "arg", help = "Positional argument (JSON, string, or @file)")]
        args: Vec<String>,
        #[arg(long, help = "Override the manifest host, e.g. https://api.example.com")]
        host: Option<String>,
        #[arg(long = "header", help = "Extra header `Name: value` (repeatable)")]
        headers: Vec<String>,
        #[arg(long = "query", help = "Extra query pair `name=value` (repeatable)")]
        query: Vec<String>,
        #[arg(long, value_enum, help = "Body mode for wrapped returns")]
        body_mode: Option<BodyModeCli>,
        #[arg(long, help = "Print the assembled request instead of sending it")]
        dry_run: bool,
        #[arg(long, help = "Characters of an error body quoted in status errors")]
        preview_limit: Option<usize>,
    },
}

fn load_manifest(path: &Path, host: Option<String>) -> Result<ServiceManifest, Error> {
    let mut manifest = ServiceManifest::from_path(path)?;
    if let Some(host) = host {
        manifest.host = Some(host);
    }
    Ok(manifest)
}

fn build_client(
    body_mode: Option<BodyModeCli>,
    preview_limit: Option<usize>,
) -> Result<ServiceClient, Error> {
    let mut options = ClientOptions::new();
    if let Some(mode) = body_mode {
        options = options.with_body_mode(mode.into());
    }
    if let Some(limit) = preview_limit {
        options = options.with_error_preview_limit(limit);
    }
    ServiceClient::with_options(UreqTransport::new(), options)
}

fn parse_cli_arg(raw: &str) -> Result<Arg, Error> {
    if let Some(path) = raw.strip_prefix('@') {
        let bytes = fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read argument file {path}"))
                .with_source(err)
        })?;
        return Ok(Arg::Bytes(bytes.into()));
    }
    Ok(match serde_json::from_str::<Value>(raw) {
        Ok(value) => Arg::Json(value),
        Err(_) => Arg::Str(raw.to_string()),
    })
}

fn parse_header_flag(raw: &str) -> Result<(String, String), Error> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid header `{raw}`"))
            .with_hint("Use --header 'Name: value'.")),
    }
}

fn parse_query_flag(raw: &str) -> Result<(String, String), Error> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid query pair `{raw}`"))
            .with_hint("Use --query name=value.")),
    }
}

fn call_options(
    headers: &[String],
    query: &[String],
    body_mode: Option<BodyModeCli>,
) -> Result<RequestOptions, Error> {
    let mut options = RequestOptions::new();
    for raw in headers {
        let (name, value) = parse_header_flag(raw)?;
        options = options.with_header(name, value);
    }
    for raw in query {
        let (name, value) = parse_query_flag(raw)?;
        options = options.with_query(name, value);
    }
    if let Some(mode) = body_mode {
        options = options.with_body_mode(mode.into());
    }
    Ok(options)
}

fn bytes_json(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => json!({ "text": text }),
        Err(_) => json!({
            "base64": base64::engine::general_purpose::STANDARD.encode(bytes),
            "len": bytes.len(),
        }),
    }
}

fn request_json(request: HttpRequest) -> Result<Value, Error> {
    let body = if request.body.is_empty() {
        Value::Null
    } else {
        bytes_json(&request.body.into_bytes()?)
    };
    Ok(json!({
        "method": request.method.as_str(),
        "url": request.url.as_str(),
        "headers": request.headers.to_json(),
        "context": request.context.to_json(),
        "body": body,
    }))
}

fn payload_json(payload: Payload) -> Result<Value, Error> {
    match payload {
        Payload::Empty => Ok(Value::Null),
        Payload::Value(value) => Ok(value),
        Payload::Lazy(lazy) => lazy.get().cloned(),
        raw => Ok(raw
            .into_bytes()?
            .map(|bytes| bytes_json(&bytes))
            .unwrap_or(Value::Null)),
    }
}

fn return_json(value: ReturnValue) -> Result<Value, Error> {
    match value {
        ReturnValue::None => Ok(Value::Null),
        ReturnValue::Bool(value) => Ok(Value::Bool(value)),
        ReturnValue::Body(payload) => payload_json(payload),
        ReturnValue::Wrapped(wrapped) => {
            let type_name = wrapped.type_name().to_string();
            let status = wrapped.status();
            let headers = wrapped.headers().to_json();
            let typed_headers = wrapped.typed_headers().cloned();
            let body = payload_json(wrapped.into_payload())?;
            let mut out = Map::new();
            out.insert("type".to_string(), json!(type_name));
            out.insert("status".to_string(), json!(status));
            out.insert("headers".to_string(), headers);
            if let Some(typed) = typed_headers {
                out.insert("typed_headers".to_string(), typed);
            }
            out.insert("body".to_string(), body);
            Ok(Value::Object(out))
        }
    }
}

fn add_transport_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Transport || err.hint().is_some() {
        return err;
    }
    err.with_hint("Request did not reach the server. Check the host, or override it with --host.")
}

fn add_status_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::UnexpectedStatus || err.hint().is_some() {
        return err;
    }
    err.with_hint("The server answered with an undeclared status. See `failure.body` for details.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Configuration => "invalid service configuration".to_string(),
        ErrorKind::BodyLengthMismatch => "request body length mismatch".to_string(),
        ErrorKind::UnexpectedStatus => "unexpected response status".to_string(),
        ErrorKind::Transport => "transport failure".to_string(),
        ErrorKind::Decode => "failed to decode response".to_string(),
        ErrorKind::Encode => "failed to encode request".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn failure_json(err: &Error) -> Option<Value> {
    let failure = err.failure()?;
    let body = match &failure.body {
        ErrorBody::Empty => Value::Null,
        ErrorBody::Decoded(value) => value.clone(),
        ErrorBody::Raw(raw) => bytes_json(raw),
        ErrorBody::Undecodable { raw, reason } => json!({
            "raw": bytes_json(raw),
            "decode_error": reason,
        }),
    };
    Some(json!({
        "status": failure.status,
        "exception": failure.exception_type,
        "request": {
            "method": failure.request.method.as_str(),
            "url": failure.request.url.as_str(),
        },
        "headers": failure.headers.to_json(),
        "body": body,
    }))
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(service) = err.service() {
        inner.insert("service".to_string(), json!(service));
    }
    if let Some(method) = err.method() {
        inner.insert("method".to_string(), json!(method));
    }
    if let Some(failure) = failure_json(err) {
        inner.insert("failure".to_string(), failure);
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    match (err.service(), err.method()) {
        (Some(service), Some(method)) => lines.push(format!(
            "{} {service}.{method}",
            colorize_label("method:", use_color, AnsiColor::Yellow)
        )),
        (Some(service), None) => lines.push(format!(
            "{} {service}",
            colorize_label("service:", use_color, AnsiColor::Yellow)
        )),
        _ => {}
    }
    if let Some(status) = err.status() {
        lines.push(format!(
            "{} {status}",
            colorize_label("status:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `wirecall --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "wirecall") else {
        return "Try `wirecall --help`.".to_string();
    };

    let mut parts = Vec::new();
    for token in tokens.iter().skip(pos + 1) {
        if token.starts_with('-') || token.starts_with('<') || token.starts_with('[') {
            break;
        }
        parts.push(*token);
    }

    if parts.is_empty() {
        return "Try `wirecall --help`.".to_string();
    }
    format!("Try `wirecall {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, error_json, parse_cli_arg, parse_header_flag, parse_query_flag, payload_json,
    };
    use clap::Parser;
    use serde_json::json;
    use wirecall::api::{Arg, Error, ErrorKind, Payload};

    #[test]
    fn cli_args_parse_as_json_then_string() {
        assert!(matches!(parse_cli_arg("42").expect("int"), Arg::Json(value) if value == json!(42)));
        assert!(matches!(parse_cli_arg("null").expect("null"), arg if arg.is_null()));
        assert!(matches!(parse_cli_arg("x y").expect("str"), Arg::Str(text) if text == "x y"));
    }

    #[test]
    fn cli_arg_file_reads_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0u8, 1, 2]).expect("write");
        let arg = parse_cli_arg(&format!("@{}", path.display())).expect("file arg");
        assert!(matches!(arg, Arg::Bytes(bytes) if bytes.as_ref() == [0u8, 1, 2]));
        let err = parse_cli_arg("@/definitely/missing").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn header_and_query_flags_validate() {
        assert_eq!(
            parse_header_flag("X-Trace:  abc").expect("header"),
            ("X-Trace".to_string(), "abc".to_string())
        );
        assert_eq!(
            parse_header_flag("broken").expect_err("usage").kind(),
            ErrorKind::Usage
        );
        assert_eq!(
            parse_query_flag("a=b=c").expect("query"),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_query_flag("=v").is_err());
    }

    #[test]
    fn error_json_carries_attribution() {
        let err = Error::new(ErrorKind::Configuration)
            .with_message("missing path template")
            .with_service("Widgets")
            .with_method("get");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Configuration");
        assert_eq!(value["error"]["service"], "Widgets");
        assert_eq!(value["error"]["method"], "get");
    }

    #[test]
    fn payload_json_renders_text_and_binary() {
        assert_eq!(
            payload_json(Payload::Bytes("hi".into())).expect("text"),
            json!({"text": "hi"})
        );
        let value = payload_json(Payload::Bytes(vec![0xffu8, 0xfe].into())).expect("binary");
        assert_eq!(value["len"], 2);
        assert_eq!(value["base64"], "//4=");
    }

    #[test]
    fn call_flags_parse() {
        let cli = Cli::try_parse_from([
            "wirecall", "call", "m.json", "get", "--arg", "1", "--arg", "two", "--dry-run",
            "--body-mode", "lazy",
        ])
        .expect("parse");
        match cli.command {
            super::Command::Call {
                args,
                dry_run,
                body_mode,
                ..
            } => {
                assert_eq!(args, vec!["1", "two"]);
                assert!(dry_run);
                assert_eq!(body_mode, Some(super::BodyModeCli::Lazy));
            }
            super::Command::Describe { .. } => panic!("expected call"),
        }
    }
}
