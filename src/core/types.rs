//! Purpose: Describe declared return/body types well enough to plan decoding.
//! Exports: `TypeRef`, `Shape`.
//! Role: Stand-in for runtime reflection: names, type arguments, and supertypes.
//! Invariants: `TypeRef` values are immutable once built and cheap to clone.
//! Invariants: Parsing accepts `Name<Arg, ...>` with nesting; unknown names are structured.
//! Invariants: `Name extends Super<...>` declares a supertype; chains nest to the right.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Shape {
    Void,
    Bool,
    Bytes,
    ByteStream,
    Binary,
    Text,
    Structured,
    /// Directly realizes the wrapped-response capability (status, headers, value).
    Response,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TypeRef {
    name: Arc<str>,
    args: Vec<TypeRef>,
    shape: Shape,
    supertype: Option<Box<TypeRef>>,
}

pub const RESPONSE: &str = "Response";
pub const RESPONSE_BASE: &str = "ResponseBase";
const EXTENDS: &str = "extends";

impl TypeRef {
    fn leaf(name: &str, shape: Shape) -> Self {
        Self {
            name: Arc::from(name),
            args: Vec::new(),
            shape,
            supertype: None,
        }
    }

    pub fn void() -> Self {
        Self::leaf("void", Shape::Void)
    }

    pub fn boolean() -> Self {
        Self::leaf("bool", Shape::Bool)
    }

    pub fn bytes() -> Self {
        Self::leaf("bytes", Shape::Bytes)
    }

    pub fn stream() -> Self {
        Self::leaf("stream", Shape::ByteStream)
    }

    pub fn binary() -> Self {
        Self::leaf("binary", Shape::Binary)
    }

    pub fn string() -> Self {
        Self::leaf("string", Shape::Text)
    }

    pub fn named(name: &str) -> Self {
        Self::leaf(name, Shape::Structured)
    }

    pub fn list(element: TypeRef) -> Self {
        Self::named("List").with_args(vec![element])
    }

    /// The generic wrapped response, `Response<body>`.
    pub fn response(body: TypeRef) -> Self {
        Self::leaf(RESPONSE, Shape::Response).with_args(vec![body])
    }

    /// `ResponseBase<headers, body>`: a concrete wrapper extending `Response<body>`.
    pub fn response_base(headers: TypeRef, body: TypeRef) -> Self {
        Self::named(RESPONSE_BASE)
            .with_args(vec![headers, body.clone()])
            .extends(Self::response(body))
    }

    pub fn with_args(mut self, args: Vec<TypeRef>) -> Self {
        self.args = args;
        self
    }

    pub fn extends(mut self, supertype: TypeRef) -> Self {
        self.supertype = Some(Box::new(supertype));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[TypeRef] {
        &self.args
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn supertype(&self) -> Option<&TypeRef> {
        self.supertype.as_deref()
    }

    pub fn is_void(&self) -> bool {
        self.shape == Shape::Void
    }

    /// True when this type or any supertype directly realizes `Shape::Response`.
    pub fn is_wrapped_response(&self) -> bool {
        self.response_ancestor().is_some()
    }

    /// Walks the supertype chain to the first type that directly realizes the capability.
    pub fn response_ancestor(&self) -> Option<&TypeRef> {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.shape == Shape::Response {
                return Some(ty);
            }
            current = ty.supertype.as_deref();
        }
        None
    }

    /// Raw bytes, binary data, byte streams, and void are passed through, not decoded.
    pub fn is_decodable(&self) -> bool {
        !matches!(
            self.shape,
            Shape::Bytes | Shape::Binary | Shape::ByteStream | Shape::Void
        )
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            f.write_str("<")?;
            for (index, arg) in self.args.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str(">")?;
        }
        if let Some(supertype) = &self.supertype
            && &*self.name != RESPONSE_BASE
        {
            write!(f, " {EXTENDS} {supertype}")?;
        }
        Ok(())
    }
}

impl FromStr for TypeRef {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            input,
            chars: input.char_indices().peekable(),
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if let Some((offset, _)) = parser.chars.peek() {
            return Err(parse_error(input, *offset, "trailing input"));
        }
        Ok(ty)
    }
}

impl<'de> Deserialize<'de> for TypeRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl Parser<'_> {
    fn parse_type(&mut self) -> Result<TypeRef, Error> {
        self.skip_ws();
        let start = self.chars.peek().map(|(offset, _)| *offset).unwrap_or(self.input.len());
        let mut end = start;
        while let Some((offset, ch)) = self.chars.peek().copied() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                end = offset + ch.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        if start == end {
            return Err(parse_error(self.input, start, "expected a type name"));
        }
        let name = &self.input[start..end];
        let mut args = Vec::new();
        self.skip_ws();
        if matches!(self.chars.peek(), Some((_, '<'))) {
            self.chars.next();
            loop {
                args.push(self.parse_type()?);
                self.skip_ws();
                match self.chars.next() {
                    Some((_, ',')) => continue,
                    Some((_, '>')) => break,
                    Some((offset, _)) => {
                        return Err(parse_error(self.input, offset, "expected `,` or `>`"));
                    }
                    None => {
                        return Err(parse_error(self.input, self.input.len(), "unclosed `<`"));
                    }
                }
            }
        }
        let ty = resolve_name(name, args);
        if self.keyword(EXTENDS) {
            let supertype = self.parse_type()?;
            return Ok(ty.extends(supertype));
        }
        Ok(ty)
    }

    /// Consumes `word` when it comes next and is followed by whitespace.
    fn keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let Some((offset, _)) = self.chars.peek().copied() else {
            return false;
        };
        let rest = &self.input[offset..];
        if !rest.starts_with(word) || !rest[word.len()..].starts_with(char::is_whitespace) {
            return false;
        }
        for _ in 0..word.chars().count() {
            self.chars.next();
        }
        true
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, ch)) if ch.is_whitespace()) {
            self.chars.next();
        }
    }
}

fn resolve_name(name: &str, args: Vec<TypeRef>) -> TypeRef {
    match (name, args.len()) {
        ("void" | "none", 0) => TypeRef::void(),
        ("bool" | "boolean", 0) => TypeRef::boolean(),
        ("bytes", 0) => TypeRef::bytes(),
        ("stream", 0) => TypeRef::stream(),
        ("binary", 0) => TypeRef::binary(),
        ("string" | "String", 0) => TypeRef::string(),
        (RESPONSE, 1) => TypeRef::response(args.into_iter().next().unwrap_or_else(TypeRef::void)),
        (RESPONSE_BASE, 2) => {
            let mut args = args.into_iter();
            let headers = args.next().unwrap_or_else(TypeRef::void);
            let body = args.next().unwrap_or_else(TypeRef::void);
            TypeRef::response_base(headers, body)
        }
        _ => TypeRef::named(name).with_args(args),
    }
}

fn parse_error(input: &str, offset: usize, reason: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid type `{input}` at offset {offset}: {reason}"))
}
