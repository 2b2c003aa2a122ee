//! `@name value` annotations in doc comments.
//!
//! ```text
//! // @service users
//! // @title User directory
//! // @openapi >>>
//! //   tags: [users]
//! // <<<
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

const FENCE_OPEN: &str = ">>>";
const FENCE_CLOSE: &str = "<<<";

/// Annotation names with meaning to the engine or its emitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationName {
    Service,
    Title,
    Description,
    Terms,
    Internal,
    Fn,
    Validate,
    Authorization,
    Permission,
    Openapi,
    Proxy,
}

impl AnnotationName {
    pub const ALL: [AnnotationName; 11] = [
        Self::Service,
        Self::Title,
        Self::Description,
        Self::Terms,
        Self::Internal,
        Self::Fn,
        Self::Validate,
        Self::Authorization,
        Self::Permission,
        Self::Openapi,
        Self::Proxy,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Title => "title",
            Self::Description => "description",
            Self::Terms => "terms",
            Self::Internal => "internal",
            Self::Fn => "fn",
            Self::Validate => "validate",
            Self::Authorization => "authorization",
            Self::Permission => "permission",
            Self::Openapi => "openapi",
            Self::Proxy => "proxy",
        }
    }
}

impl FromStr for AnnotationName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|a| a.as_str() == s).ok_or(())
    }
}

impl fmt::Display for AnnotationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.as_str())
    }
}

/// Annotation name to value, in first-seen order.
///
/// Unrecognized names are kept so emitters can define their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(IndexMap<String, String>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: AnnotationName) -> Option<&str> {
        self.get_raw(name.as_str())
    }

    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: AnnotationName) -> bool {
        self.0.contains_key(name.as_str())
    }

    /// Presence flag: set unless the value is `false`.
    pub fn flag(&self, name: AnnotationName) -> bool {
        self.get(name).is_some_and(|v| v != "false")
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Overlays `other`; its values win.
    pub fn merge(&mut self, other: &Annotations) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Splits `@name rest` into its parts.
fn split_annotation(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('@')?;
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_alphabetic() || c == '_' => {}
        _ => return None,
    }
    let end = chars
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
        .map_or(rest.len(), |(i, _)| i);
    let (name, tail) = rest.split_at(end);
    // `@foo.bar` or `user@host` are prose, not annotations
    if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
        return None;
    }
    Some((name, tail.trim()))
}

/// Extracts annotations from comment text (markers already stripped).
pub fn extract(text: &str) -> Annotations {
    let mut out = Annotations::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some((name, value)) = split_annotation(line.trim()) else {
            continue;
        };

        let value = if value == FENCE_OPEN {
            let mut body: Vec<&str> = Vec::new();
            let mut closed = false;
            for inner in lines.by_ref() {
                if inner.trim() == FENCE_CLOSE {
                    closed = true;
                    break;
                }
                body.push(inner);
            }
            if !closed {
                warn!(annotation = name, "fenced annotation has no closing `<<<`");
            }
            body.join("\n")
        } else {
            value.to_owned()
        };

        if name.parse::<AnnotationName>().is_err() {
            debug!(annotation = name, "unrecognized annotation kept");
        }
        out.insert(name, value);
    }

    out
}
