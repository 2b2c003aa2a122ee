//! Struct tag parsing.
//!
//! A tag is a sequence of `key:"v1,v2"` pairs separated by spaces, the
//! convention `reflect.StructTag` uses.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Tag key to its comma-separated values, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(IndexMap<String, Vec<String>>);

impl Tags {
    pub fn parse(tag: &str) -> Self {
        parse_tags(tag)
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// First `json` value; `None` when absent or empty.
    pub fn json_name(&self) -> Option<&str> {
        self.get("json")
            .and_then(|v| v.first())
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }

    /// `json:"-"` drops the field; `json:"-,"` names it `-`.
    pub fn json_skip(&self) -> bool {
        matches!(self.get("json"), Some([only]) if only == "-")
    }

    /// Values after the JSON name: `omitempty`, `string`, ...
    pub fn json_options(&self) -> &[String] {
        match self.get("json") {
            Some([_, rest @ ..]) => rest,
            _ => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Vec<V>)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, Vec<V>)>>(iter: I) -> Self {
        Tags(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

/// Parses an unquoted tag value.
///
/// Malformed trailing input is ignored, as `reflect.StructTag.Lookup`
/// does. A repeated key keeps its first occurrence.
pub fn parse_tags(tag: &str) -> Tags {
    let mut out = IndexMap::new();
    let mut rest = tag;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        // key: any run of non-space, non-control, non-quote, non-colon chars
        let key_len = rest
            .bytes()
            .take_while(|&b| b > b' ' && b != b':' && b != b'"' && b != 0x7f)
            .count();
        if key_len == 0 || !rest[key_len..].starts_with(":\"") {
            break;
        }
        let key = &rest[..key_len];
        rest = &rest[key_len + 1..];

        let Some(end) = closing_quote(rest) else {
            break;
        };
        let quoted = &rest[..=end];
        rest = &rest[end + 1..];

        let Ok(value) = svcgen_syntax::literal::unquote(quoted) else {
            break;
        };
        out.entry(key.to_owned())
            .or_insert_with(|| value.split(',').map(str::to_owned).collect());
    }

    Tags(out)
}

/// Index of the quote closing the string that starts at `s[0]`.
fn closing_quote(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    let mut i = 1;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_and_validate() {
        let tags = parse_tags(r#"json:"x,omitempty" validate:"required""#);
        let expected: Tags = [("json", vec!["x", "omitempty"]), ("validate", vec!["required"])]
            .into_iter()
            .collect();
        assert_eq!(tags, expected);
        assert_eq!(tags.json_name(), Some("x"));
        assert_eq!(tags.json_options(), ["omitempty".to_owned()]);
    }

    #[test]
    fn dash_rules() {
        assert!(parse_tags(r#"json:"-""#).json_skip());
        let named_dash = parse_tags(r#"json:"-,""#);
        assert!(!named_dash.json_skip());
        assert_eq!(named_dash.json_name(), Some("-"));
    }

    #[test]
    fn empty_name_falls_back() {
        let tags = parse_tags(r#"json:",omitempty""#);
        assert_eq!(tags.json_name(), None);
        assert_eq!(tags.json_options(), ["omitempty".to_owned()]);
    }

    #[test]
    fn escapes_and_garbage() {
        let tags = parse_tags(r#"doc:"say \"hi\"" bad"#);
        assert_eq!(tags.get("doc"), Some(&["say \"hi\"".to_owned()][..]));
        assert_eq!(tags.len(), 1);
        assert!(parse_tags("json:x").is_empty());
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn first_duplicate_wins() {
        let tags = parse_tags(r#"json:"a" json:"b""#);
        assert_eq!(tags.json_name(), Some("a"));
    }
}
