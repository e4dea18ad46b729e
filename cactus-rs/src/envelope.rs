//! The result envelope: outcome of a server-side test execution, as sent in
//! the body of a `GET_RESULTS` response.
//!
//! ```text
//! <webresult>
//!   <exception classname="...">
//!     <message><![CDATA[...]]></message>
//!     <stacktrace><![CDATA[...]]></stacktrace>
//!   </exception>
//! </webresult>
//! ```
//!
//! The exception element is absent on success, and the message element is
//! absent when the failure has no message. Carriage returns are sent as
//! character references because a parser normalises them inside CDATA. Text
//! holding characters XML cannot carry, such as terminal colour codes, is
//! sent base64 encoded, marked with `encoding="base64"`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CactusError, Result};
use crate::failure::TestFailure;

const ROOT_ELEMENT: &str = "webresult";
const EXCEPTION_ELEMENT: &str = "exception";
const CLASS_NAME_ATTRIBUTE: &str = "classname";
const MESSAGE_ELEMENT: &str = "message";
const STACK_TRACE_ELEMENT: &str = "stacktrace";
const ENCODING_ATTRIBUTE: &str = "encoding";
const BASE64_ENCODING: &str = "base64";

pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultEnvelope {
    failure: Option<TestFailure>,
}

impl ResultEnvelope {
    pub fn success() -> Self {
        Self { failure: None }
    }

    pub fn failure(failure: TestFailure) -> Self {
        Self {
            failure: Some(failure),
        }
    }

    pub fn has_exception(&self) -> bool {
        self.failure.is_some()
    }

    pub fn exception(&self) -> Option<&TestFailure> {
        self.failure.as_ref()
    }

    pub fn exception_class_name(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.class_name.as_str())
    }

    pub fn exception_message(&self) -> Option<&str> {
        self.failure.as_ref().and_then(|failure| failure.message.as_deref())
    }

    pub fn into_result(self) -> std::result::Result<(), TestFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = format!("<{ROOT_ELEMENT}>");
        if let Some(failure) = &self.failure {
            out.push_str(&format!(
                "<{EXCEPTION_ELEMENT} {CLASS_NAME_ATTRIBUTE}=\"{}\">",
                escape_attribute(&failure.class_name)
            ));
            if let Some(message) = &failure.message {
                out.push_str(&text_element(MESSAGE_ELEMENT, message));
            }
            out.push_str(&text_element(STACK_TRACE_ELEMENT, &failure.stack_trace));
            out.push_str(&format!("</{EXCEPTION_ELEMENT}>"));
        }
        out.push_str(&format!("</{ROOT_ELEMENT}>"));
        out
    }

    pub fn decode(text: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|err| CactusError::ProtocolDecoding(err.to_string()))?;
        let root = doc.root_element();
        if !root.has_tag_name(ROOT_ELEMENT) {
            return Err(CactusError::ProtocolDecoding(format!(
                "expected <{ROOT_ELEMENT}> root element, found <{}>",
                root.tag_name().name()
            )));
        }

        let Some(exception) = child_element(root, EXCEPTION_ELEMENT) else {
            return Ok(Self::success());
        };
        let class_name = exception.attribute(CLASS_NAME_ATTRIBUTE).ok_or_else(|| {
            CactusError::ProtocolDecoding(format!(
                "<{EXCEPTION_ELEMENT}> lacks the {CLASS_NAME_ATTRIBUTE} attribute"
            ))
        })?;
        let message = child_element(exception, MESSAGE_ELEMENT)
            .map(element_text)
            .transpose()?;
        let stack_trace = child_element(exception, STACK_TRACE_ELEMENT)
            .map(element_text)
            .transpose()?
            .unwrap_or_default();

        Ok(Self::failure(TestFailure {
            class_name: class_name.to_string(),
            message,
            stack_trace,
        }))
    }
}

impl From<std::result::Result<(), TestFailure>> for ResultEnvelope {
    fn from(outcome: std::result::Result<(), TestFailure>) -> Self {
        match outcome {
            Ok(()) => Self::success(),
            Err(failure) => Self::failure(failure),
        }
    }
}

fn child_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// Concatenates every text and CDATA child; an empty element yields "".
/// Base64 content is decoded back to the original text.
fn element_text(node: roxmltree::Node<'_, '_>) -> Result<String> {
    let text: String = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    match node.attribute(ENCODING_ATTRIBUTE) {
        None => Ok(text),
        Some(BASE64_ENCODING) => {
            let bytes = STANDARD.decode(text.trim()).map_err(|err| {
                CactusError::ProtocolDecoding(format!(
                    "<{}> holds invalid base64: {err}",
                    node.tag_name().name()
                ))
            })?;
            String::from_utf8(bytes).map_err(|err| {
                CactusError::ProtocolDecoding(format!(
                    "<{}> does not decode to UTF-8: {err}",
                    node.tag_name().name()
                ))
            })
        }
        Some(other) => Err(CactusError::ProtocolDecoding(format!(
            "unknown {ENCODING_ATTRIBUTE} `{other}` on <{}>",
            node.tag_name().name()
        ))),
    }
}

/// `<name>text</name>`, with the text base64 encoded when XML cannot carry
/// it as is.
fn text_element(name: &str, text: &str) -> String {
    if text.chars().all(is_xml_char) {
        format!("<{name}>{}</{name}>", cdata(text))
    } else {
        format!(
            "<{name} {ENCODING_ATTRIBUTE}=\"{BASE64_ENCODING}\">{}</{name}>",
            STANDARD.encode(text)
        )
    }
}

/// The `Char` production of XML 1.0.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Wraps `text` in CDATA sections. `]]>` is split across two sections and
/// carriage returns are emitted as character references between sections.
fn cdata(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 12);
    out.push_str("<![CDATA[");
    let mut rest = text;
    while let Some(index) = rest.find(|c| c == '\r' || c == ']') {
        let (head, tail) = rest.split_at(index);
        out.push_str(head);
        if tail.starts_with('\r') {
            out.push_str("]]>&#13;<![CDATA[");
            rest = &tail[1..];
        } else if tail.starts_with("]]>") {
            out.push_str("]]]]><![CDATA[>");
            rest = &tail[3..];
        } else {
            out.push(']');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out.push_str("]]>");
    out
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(class_name: &str, message: Option<&str>, trace: &str) -> ResultEnvelope {
        ResultEnvelope::failure(TestFailure {
            class_name: class_name.to_string(),
            message: message.map(str::to_string),
            stack_trace: trace.to_string(),
        })
    }

    #[test]
    fn test_success_encoding() {
        let envelope = ResultEnvelope::success();
        assert_eq!(envelope.encode(), "<webresult></webresult>");
        assert_eq!(ResultEnvelope::decode(&envelope.encode()).unwrap(), envelope);
        assert!(!envelope.has_exception());
        assert_eq!(envelope.exception_class_name(), None);
    }

    #[test]
    fn test_failure_round_trip() {
        let cases = [
            failure(
                "junit.framework.AssertionFailedError",
                Some("expected 1, got 2"),
                "panicked at src/lib.rs:10:5\n   0: backtrace\n   1: more",
            ),
            failure("io::Error", None, ""),
            failure("io::Error", Some(""), "trace"),
            failure("a<b>&\"c'\td\ne", Some("nested ]]> terminator ]] ]> ]]]>"), "]]>"),
            failure("kind", Some("windows\r\nline\rends"), "x\r\n\r\ny"),
            failure("kind", Some("<tag attr=\"v\">&amp;</tag> ünïcödé"), "\t indented\n"),
            failure(
                "junit.framework.AssertionFailedError",
                Some("assertion failed: \u{1b}[31mleft\u{1b}[0m != right\u{0}"),
                "panicked at src/lib.rs:3:1\u{1b}[0m\n\u{fffe}",
            ),
        ];
        for envelope in cases {
            let text = envelope.encode();
            assert_eq!(ResultEnvelope::decode(&text).unwrap(), envelope, "{text}");
        }
    }

    #[test]
    fn test_decoded_accessors() {
        let envelope = ResultEnvelope::decode(
            "<webresult><exception classname=\"Foo\">\
             <message><![CDATA[boom]]></message>\
             <stacktrace><![CDATA[at foo]]></stacktrace></exception></webresult>",
        )
        .unwrap();
        assert!(envelope.has_exception());
        assert_eq!(envelope.exception_class_name(), Some("Foo"));
        assert_eq!(envelope.exception_message(), Some("boom"));
        assert_eq!(envelope.exception().unwrap().stack_trace, "at foo");
    }

    #[test]
    fn test_malformed_envelopes() {
        for text in [
            "",
            "not xml at all",
            "<webresult><exception classname=\"x\">",
            "<result></result>",
            "<webresult><exception><message>m</message></exception></webresult>",
            "<webresult><exception classname=\"x\"><message encoding=\"base64\">!!</message>\
             </exception></webresult>",
            "<webresult><exception classname=\"x\"><message encoding=\"rot13\">z</message>\
             </exception></webresult>",
        ] {
            assert!(
                matches!(
                    ResultEnvelope::decode(text),
                    Err(CactusError::ProtocolDecoding(_))
                ),
                "{text:?} should not decode"
            );
        }
    }

    #[test]
    fn test_plain_text_stays_readable() {
        let text = failure("kind", Some("plain message"), "trace").encode();
        assert!(text.contains("<message><![CDATA[plain message]]></message>"), "{text}");

        let text = failure("kind", Some("colour \u{1b}[0m"), "trace").encode();
        assert!(text.contains("<message encoding=\"base64\">"), "{text}");
        assert!(text.contains("<stacktrace><![CDATA[trace]]></stacktrace>"), "{text}");
    }
}
