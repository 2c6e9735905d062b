//! Purpose: Tokenize host/path templates once and render them per call.
//! Exports: `UrlTemplate`, `UrlSegment`, `PlaceholderBinding`, `PlaceholderTable`,
//! Exports: `encode_component`.
//! Role: Leaf of the descriptor compiler; rendering is plain iteration over segments.
//! Invariants: Only `{name}` pairs bound in the table become placeholders.
//! Invariants: An unterminated `{` turns the rest of the template into one literal.
//! Invariants: A placeholder whose argument is absent renders as its raw `{name}` text.
use std::collections::HashMap;

use url::form_urlencoded;

use crate::core::value::Arg;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UrlSegment {
    Static(String),
    Placeholder {
        index: usize,
        encode: bool,
        raw: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlaceholderBinding {
    pub index: usize,
    pub encode: bool,
}

pub type PlaceholderTable = HashMap<String, PlaceholderBinding>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UrlTemplate {
    source: String,
    segments: Vec<UrlSegment>,
}

impl UrlTemplate {
    pub fn compile(template: &str, bindings: &PlaceholderTable) -> Self {
        let mut segments = Vec::new();
        let mut rest = template;
        loop {
            let Some(open) = rest.find('{') else {
                push_static(&mut segments, rest);
                break;
            };
            push_static(&mut segments, &rest[..open]);
            let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
                push_static(&mut segments, &rest[open..]);
                break;
            };
            let raw = &rest[open..=close];
            let name = &rest[open + 1..close];
            match bindings.get(name) {
                Some(binding) => segments.push(UrlSegment::Placeholder {
                    index: binding.index,
                    encode: binding.encode,
                    raw: raw.to_string(),
                }),
                None => push_static(&mut segments, raw),
            }
            rest = &rest[close + 1..];
        }
        Self {
            source: template.to_string(),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[UrlSegment] {
        &self.segments
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, UrlSegment::Placeholder { .. }))
            .count()
    }

    pub fn render(&self, args: &[Arg]) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                UrlSegment::Static(text) => out.push_str(text),
                UrlSegment::Placeholder { index, encode, raw } => {
                    match args.get(*index).and_then(Arg::to_param_string) {
                        Some(value) if *encode => out.push_str(&encode_component(&value)),
                        Some(value) => out.push_str(&value),
                        None => out.push_str(raw),
                    }
                }
            }
        }
        out
    }
}

fn push_static(segments: &mut Vec<UrlSegment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(UrlSegment::Static(last)) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(UrlSegment::Static(text.to_string()));
    }
}

/// Percent-encodes a single path, query, or form component; spaces become `%20`.
pub fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
