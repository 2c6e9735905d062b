//! Purpose: Per-argument strategies for query, header, and form roles.
//! Exports: `ParameterProcessor`, `RequestParts`.
//! Role: Chosen once at compile time; run in declaration order on every call.
//! Invariants: Null arguments contribute nothing; list nulls are skipped element-wise.
//! Invariants: Argument headers replace same-named headers already in `RequestParts`.
use serde_json::Value;

use crate::core::http::Headers;
use crate::core::template::encode_component;
use crate::core::value::Arg;

/// Accumulates what processors contribute to one request.
#[derive(Clone, Debug, Default)]
pub struct RequestParts {
    pub query: Vec<String>,
    pub headers: Headers,
    pub form: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParameterProcessor {
    SingleQuery {
        index: usize,
        name: String,
        encode: bool,
    },
    ListQuery {
        index: usize,
        name: String,
        encode: bool,
    },
    SimpleHeader {
        index: usize,
        name: String,
    },
    HeaderMap {
        index: usize,
        prefix: String,
    },
    FormField {
        index: usize,
        name: String,
        encode: bool,
    },
}

impl ParameterProcessor {
    pub fn index(&self) -> usize {
        match self {
            ParameterProcessor::SingleQuery { index, .. }
            | ParameterProcessor::ListQuery { index, .. }
            | ParameterProcessor::SimpleHeader { index, .. }
            | ParameterProcessor::HeaderMap { index, .. }
            | ParameterProcessor::FormField { index, .. } => *index,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParameterProcessor::SingleQuery { .. } => "query",
            ParameterProcessor::ListQuery { .. } => "query_list",
            ParameterProcessor::SimpleHeader { .. } => "header",
            ParameterProcessor::HeaderMap { .. } => "header_map",
            ParameterProcessor::FormField { .. } => "form",
        }
    }

    pub fn apply(&self, args: &[Arg], parts: &mut RequestParts) {
        let Some(arg) = args.get(self.index()) else {
            return;
        };
        match self {
            ParameterProcessor::SingleQuery { name, encode, .. } => {
                if let Some(value) = arg.to_param_string() {
                    parts.query.push(pair(name, &value, *encode));
                }
            }
            ParameterProcessor::ListQuery { name, encode, .. } => {
                for value in list_values(arg) {
                    parts.query.push(pair(name, &value, *encode));
                }
            }
            ParameterProcessor::SimpleHeader { name, .. } => {
                if let Some(value) = arg.to_param_string() {
                    parts.headers.set(name.clone(), value);
                }
            }
            ParameterProcessor::HeaderMap { prefix, .. } => {
                for (key, value) in map_entries(arg) {
                    parts.headers.set(format!("{prefix}{key}"), value);
                }
            }
            ParameterProcessor::FormField { name, encode, .. } => {
                if let Some(value) = arg.to_param_string() {
                    parts.form.push(pair(name, &value, *encode));
                }
            }
        }
    }
}

fn pair(name: &str, value: &str, encode: bool) -> String {
    if encode {
        format!("{}={}", encode_component(name), encode_component(value))
    } else {
        format!("{name}={value}")
    }
}

fn list_values(arg: &Arg) -> Vec<String> {
    match arg {
        Arg::List(items) => items.iter().filter_map(Arg::to_param_string).collect(),
        Arg::Json(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        other => other.to_param_string().into_iter().collect(),
    }
}

fn map_entries(arg: &Arg) -> Vec<(String, String)> {
    match arg {
        Arg::Map(entries) => entries
            .iter()
            .filter_map(|(key, value)| value.to_param_string().map(|value| (key.clone(), value)))
            .collect(),
        Arg::Json(Value::Object(entries)) => entries
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}
