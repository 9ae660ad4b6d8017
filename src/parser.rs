//! Timed-text XML to transcript lines.

use regex::{Captures, Regex};
use roxmltree::{Document, Node};

use crate::error::ParseError;
use crate::models::TranscriptLine;

/// Inline tags kept when formatting is preserved.
pub const FORMATTING_TAGS: [&str; 10] = [
    "strong", "em", "b", "i", "mark", "small", "del", "ins", "sub", "sup",
];

#[derive(Debug, Clone)]
pub struct CaptionParser {
    tag: Regex,
}

impl CaptionParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tag: Regex::new(r"<(/?)\s*([a-zA-Z][a-zA-Z0-9]*)?[^>]*>")?,
        })
    }

    /// Parses a `<transcript>` document into lines, in document order.
    pub fn parse(&self, xml: &str, preserve_formatting: bool) -> Result<Vec<TranscriptLine>, ParseError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "transcript" {
            return Err(ParseError::UnexpectedRoot(root.tag_name().name().to_string()));
        }

        let lines = root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "text")
            .map(|text| {
                let mut markup = String::new();
                collect_markup(text, &mut markup);
                let cleaned = self.strip_tags(&markup, preserve_formatting);
                TranscriptLine {
                    text: html_escape::decode_html_entities(&cleaned).into_owned(),
                    start: seconds(text.attribute("start")),
                    duration: seconds(text.attribute("dur")),
                }
            })
            .collect();
        Ok(lines)
    }

    /// Removes markup; with `preserve_formatting` the whitelisted tags
    /// survive without their attributes.
    pub fn strip_tags(&self, text: &str, preserve_formatting: bool) -> String {
        if !preserve_formatting {
            return self.tag.replace_all(text, "").into_owned();
        }
        self.tag
            .replace_all(text, |caps: &Captures| {
                let name = caps.get(2).map(|m| m.as_str().to_ascii_lowercase());
                match name {
                    Some(name) if FORMATTING_TAGS.contains(&name.as_str()) => {
                        format!("<{}{}>", &caps[1], name)
                    }
                    _ => String::new(),
                }
            })
            .into_owned()
    }
}

/// Rebuilds the content of `node` as markup. Caption payloads usually carry
/// their tags entity-escaped inside text nodes, which the XML parser has
/// already decoded; literal child elements are written back as tags so both
/// forms go through the same filter.
fn collect_markup(node: Node, out: &mut String) {
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or_default());
        } else if child.is_element() {
            let name = child.tag_name().name();
            out.push('<');
            out.push_str(name);
            out.push('>');
            collect_markup(child, out);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn seconds(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
