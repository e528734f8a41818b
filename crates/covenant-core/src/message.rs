//! Tag-delimited payload extraction
//!
//! Transaction outputs carry free-form messages made of `<tag>value</tag>`
//! fields. `extract_field` is the single primitive every record decoder is
//! built on; `FieldReader` layers a typed, issue-collecting pass over it so a
//! decoder can report exactly which fields were missing or malformed instead
//! of carrying empty strings into arithmetic.

use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};

/// Text between the first `open` and the following `close`, or `""`.
///
/// No escaping and no nesting awareness. Never panics.
pub fn extract_field<'a>(text: &'a str, open: &str, close: &str) -> &'a str {
    let Some(start) = text.find(open) else {
        return "";
    };
    let body = start + open.len();
    match text[body..].find(close) {
        Some(end) => &text[body..body + end],
        None => "",
    }
}

/// Extract `<tag>..</tag>`
pub fn extract_tag<'a>(text: &'a str, tag: &str) -> &'a str {
    extract_field(text, &format!("<{tag}>"), &format!("</{tag}>"))
}

/// Message envelope carried by an output: type, key and value
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMessage {
    /// `<MT>`, upper-cased
    pub kind: String,
    /// `<MK>`, upper-cased
    pub key: String,
    /// `<MV>`, verbatim
    pub value: String,
}

impl TxMessage {
    pub fn decode(message: &str) -> Self {
        Self {
            kind: extract_field(message, "<MT>", "</MT>").to_uppercase(),
            key: extract_field(message, "<MK>", "</MK>").to_uppercase(),
            value: extract_field(message, "<MV>", "</MV>").to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.key.is_empty() && self.value.is_empty()
    }

    pub fn encode(kind: &str, key: &str, value: &str) -> String {
        format!("<MT>{kind}</MT><MK>{key}</MK><MV>{value}</MV>")
    }
}

/// Problem found while decoding one field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldIssue {
    Missing(&'static str),
    Malformed(&'static str),
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(tag) => write!(f, "missing <{tag}>"),
            Self::Malformed(tag) => write!(f, "malformed <{tag}>"),
        }
    }
}

/// Typed reader over a tagged payload that records every issue it meets
pub struct FieldReader<'a> {
    payload: &'a str,
    issues: Vec<FieldIssue>,
}

impl<'a> FieldReader<'a> {
    pub fn new(payload: &'a str) -> Self {
        Self {
            payload,
            issues: Vec::new(),
        }
    }

    /// Required text field
    pub fn text(&mut self, tag: &'static str) -> Option<&'a str> {
        let value = extract_tag(self.payload, tag);
        if value.is_empty() {
            self.issues.push(FieldIssue::Missing(tag));
            return None;
        }
        Some(value)
    }

    /// Optional text field; empty when absent
    pub fn optional_text(&self, tag: &'static str) -> &'a str {
        extract_tag(self.payload, tag)
    }

    /// Required integer. Decimal input is truncated toward zero.
    pub fn integer(&mut self, tag: &'static str) -> Option<i64> {
        let raw = self.text(tag)?;
        match Fixed::parse(raw) {
            Some(v) => Some(v.trunc_int()),
            None => {
                self.issues.push(FieldIssue::Malformed(tag));
                None
            }
        }
    }

    /// Required decimal rounded to `places`
    pub fn decimal(&mut self, tag: &'static str, places: u32) -> Option<Fixed> {
        let raw = self.text(tag)?;
        match Fixed::parse_dp(raw, places) {
            Some(v) => Some(v),
            None => {
                self.issues.push(FieldIssue::Malformed(tag));
                None
            }
        }
    }

    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    pub fn finish(self) -> Vec<FieldIssue> {
        self.issues
    }
}

/// Builder for tagged payloads, in field insertion order
#[derive(Default)]
pub struct PayloadBuilder {
    body: String,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, tag: &str, value: impl std::fmt::Display) -> Self {
        self.body.push_str(&format!("<{tag}>{value}</{tag}>"));
        self
    }

    /// Wrap the fields collected so far in `<tag>..</tag>`
    pub fn wrap(self, tag: &str) -> String {
        format!("<{tag}>{}</{tag}>", self.body)
    }

    pub fn build(self) -> String {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field_basic() {
        let text = "<a>1</a><b>two</b>";
        assert_eq!(extract_field(text, "<b>", "</b>"), "two");
        assert_eq!(extract_tag(text, "a"), "1");
    }

    #[test]
    fn test_extract_field_tolerates_missing_tags() {
        assert_eq!(extract_field("<a>1", "<a>", "</a>"), "");
        assert_eq!(extract_field("", "<a>", "</a>"), "");
        assert_eq!(extract_field("</a>1<a>", "<a>", "</a>"), "");
    }

    #[test]
    fn test_extract_field_takes_first_occurrence() {
        let text = "<k>first</k><k>second</k>";
        assert_eq!(extract_tag(text, "k"), "first");
    }

    #[test]
    fn test_extract_field_multibyte_text() {
        let text = "<name>Überweisung ✓</name>";
        assert_eq!(extract_tag(text, "name"), "Überweisung ✓");
    }

    #[test]
    fn test_envelope_decode_uppercases_kind_and_key() {
        let msg = TxMessage::encode("dws", "dws-abc", "<dws><x>1</x></dws>");
        let decoded = TxMessage::decode(&msg);
        assert_eq!(decoded.kind, "DWS");
        assert_eq!(decoded.key, "DWS-ABC");
        assert_eq!(decoded.value, "<dws><x>1</x></dws>");
        assert!(TxMessage::decode("plain text").is_empty());
    }

    #[test]
    fn test_field_reader_collects_issues() {
        let payload = PayloadBuilder::new()
            .field("duration", 30)
            .field("dwu", "abc")
            .wrap("dws");
        let mut reader = FieldReader::new(&payload);
        assert_eq!(reader.integer("duration"), Some(30));
        assert_eq!(reader.decimal("dwu", 4), None);
        assert_eq!(reader.integer("burnheight"), None);
        assert_eq!(reader.optional_text("cpk"), "");
        assert_eq!(
            reader.finish(),
            vec![FieldIssue::Malformed("dwu"), FieldIssue::Missing("burnheight")]
        );
    }

    #[test]
    fn test_field_reader_rounds_decimals() {
        let payload = "<dwu>0.123456</dwu><height>12.9</height>";
        let mut reader = FieldReader::new(payload);
        assert_eq!(reader.decimal("dwu", 4), Fixed::parse("0.1235"));
        assert_eq!(reader.integer("height"), Some(12));
        assert!(reader.issues().is_empty());
    }
}
