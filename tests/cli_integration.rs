// CLI integration tests for describe, dry-run call, and error envelopes.
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

const MANIFEST: &str = r#"{
  "name": "Widgets",
  "host": "https://api.example.com",
  "methods": [
    {
      "name": "get",
      "http_method": "GET",
      "path": "/widgets/{id}",
      "params": [{"role": "path", "name": "id"}],
      "expected_statuses": [200],
      "exceptions": [{"statuses": [404], "type": "WidgetNotFound", "body": "ApiError"}],
      "returns": "Widget"
    },
    {
      "name": "create",
      "http_method": "POST",
      "path": "/widgets",
      "headers": ["x-static: yes"],
      "query": ["api-version=1"],
      "params": [{"role": "body"}],
      "returns": "Response<Widget>"
    }
  ]
}"#;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_wirecall");
    Command::new(exe)
}

fn write_manifest(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write manifest");
    path
}

fn parse_stdout(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn parse_stderr(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text
        .lines()
        .find(|line| line.trim_start().starts_with('{'))
        .expect("json error line");
    serde_json::from_str(line).expect("stderr json")
}

#[test]
fn describe_lists_compiled_methods() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args(["describe", manifest.to_str().expect("path")])
        .output()
        .expect("describe");
    assert!(output.status.success());
    let value = parse_stdout(&output);
    assert_eq!(value["service"], "Widgets");
    let methods = value["methods"].as_array().expect("methods");
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[0]["method"], "get");
    assert_eq!(methods[0]["http_method"], "GET");
    assert_eq!(methods[0]["exceptions"][0]["type"], "WidgetNotFound");
    assert_eq!(methods[1]["returns"]["wrapped"], true);
    assert_eq!(methods[1]["returns"]["body"], "Widget");
}

#[test]
fn describe_single_method() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args([
            "describe",
            manifest.to_str().expect("path"),
            "--method",
            "create",
        ])
        .output()
        .expect("describe");
    assert!(output.status.success());
    let value = parse_stdout(&output);
    assert_eq!(value["method"], "create");
    assert_eq!(value["static_query"][0], "api-version=1");
}

#[test]
fn describe_unknown_method_is_configuration_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args(["describe", manifest.to_str().expect("path"), "--method", "nope"])
        .output()
        .expect("describe");
    assert_eq!(output.status.code(), Some(3));
    let err = parse_stderr(&output);
    assert_eq!(err["error"]["kind"], "Configuration");
    assert!(err["error"]["hint"].as_str().is_some());
}

#[test]
fn dry_run_prints_assembled_request() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args([
            "call",
            manifest.to_str().expect("path"),
            "create",
            "--arg",
            r#"{"name":"bolt"}"#,
            "--query",
            "trace=a b",
            "--header",
            "X-Request-Id: r-1",
            "--dry-run",
        ])
        .output()
        .expect("call");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let request = &parse_stdout(&output)["request"];
    assert_eq!(request["method"], "POST");
    assert_eq!(
        request["url"],
        "https://api.example.com/widgets?api-version=1&trace=a%20b"
    );
    assert_eq!(request["body"]["text"], r#"{"name":"bolt"}"#);
    let headers = request["headers"].to_string();
    assert!(headers.contains("r-1"));
    assert!(headers.contains("x-static"));
}

#[test]
fn dry_run_host_override_and_string_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args([
            "call",
            manifest.to_str().expect("path"),
            "get",
            "--arg",
            "a b",
            "--host",
            "http://localhost:8080",
            "--dry-run",
        ])
        .output()
        .expect("call");
    assert!(output.status.success());
    let request = &parse_stdout(&output)["request"];
    assert_eq!(request["url"], "http://localhost:8080/widgets/a%20b");
    assert_eq!(request["body"], Value::Null);
}

#[test]
fn invalid_manifest_is_usage_error_with_hint() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "broken.json", r#"{"name": "X", "bogus": 1}"#);

    let output = cmd()
        .args(["describe", manifest.to_str().expect("path")])
        .output()
        .expect("describe");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_stderr(&output);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(
        err["error"]["hint"]
            .as_str()
            .expect("hint")
            .contains("broken.json")
    );
}

#[test]
fn missing_manifest_is_io_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("absent.json");

    let output = cmd()
        .args(["describe", missing.to_str().expect("path")])
        .output()
        .expect("describe");
    assert_eq!(output.status.code(), Some(9));
    assert_eq!(parse_stderr(&output)["error"]["kind"], "Io");
}

#[test]
fn malformed_header_flag_is_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args([
            "call",
            manifest.to_str().expect("path"),
            "get",
            "--header",
            "no-colon",
            "--dry-run",
        ])
        .output()
        .expect("call");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_stderr(&output);
    assert_eq!(err["error"]["hint"], "Use --header 'Name: value'.");
}

#[test]
fn unreachable_host_is_transport_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let manifest = write_manifest(temp.path(), "widgets.json", MANIFEST);

    let output = cmd()
        .args([
            "call",
            manifest.to_str().expect("path"),
            "get",
            "--arg",
            "1",
            "--host",
            "http://127.0.0.1:9",
        ])
        .output()
        .expect("call");
    assert_eq!(output.status.code(), Some(6));
    let err = parse_stderr(&output);
    assert_eq!(err["error"]["kind"], "Transport");
    assert_eq!(err["error"]["service"], "Widgets");
    assert!(err["error"]["hint"].as_str().expect("hint").contains("--host"));
}

#[test]
fn unknown_subcommand_points_at_help() {
    let output = cmd().args(["explode"]).output().expect("run");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_stderr(&output);
    assert_eq!(err["error"]["kind"], "Usage");
    assert_eq!(err["error"]["hint"], "Try `wirecall --help`.");
}
