//! XML cue parser.
//!
//! Handles the analysis tool's XML export:
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <rhubarbResult>
//!   <metadata>
//!     <soundFile>hello.wav</soundFile>
//!     <duration>1.20</duration>
//!   </metadata>
//!   <mouthCues>
//!     <mouthCue start="0.00" end="0.50">A</mouthCue>
//!     <mouthCue start="0.50" end="1.20">B</mouthCue>
//!   </mouthCues>
//! </rhubarbResult>
//! ```
//!
//! Each of `start`, `end` and `shape` may be an attribute or a child
//! element; the shape may also be the cue element's own text.

use roxmltree::{Document, Node};

use super::error::{ParseError, ParseResult};
use crate::timeline::{Cue, MouthShape, Timeline, TimelineMetadata};

const CUE_ELEMENT: &str = "mouthCue";

/// Parse an XML document into a Timeline.
pub fn parse_xml(content: &str) -> ParseResult<Timeline> {
    let doc = Document::parse(content)
        .map_err(|e| ParseError::MalformedXml(format!("XML parse error: {}", e)))?;

    let mut cues = Vec::new();
    for node in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == CUE_ELEMENT)
    {
        cues.push(parse_cue(&doc, &node)?);
    }

    let metadata = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "metadata")
        .map(|meta| TimelineMetadata {
            sound_file: child_text(&meta, "soundFile").map(str::to_string),
            duration: child_text(&meta, "duration").and_then(|d| d.parse().ok()),
            source_path: None,
        })
        .unwrap_or_default();

    Ok(Timeline::new(cues)?.with_metadata(metadata))
}

/// Parse a single cue element.
fn parse_cue(doc: &Document, node: &Node) -> ParseResult<Cue> {
    let line = doc.text_pos_at(node.range().start).row as usize;

    let start = field(node, "start").ok_or_else(|| ParseError::missing_field(line, "start"))?;
    let end = field(node, "end").ok_or_else(|| ParseError::missing_field(line, "end"))?;
    let shape_text = field(node, "shape")
        .or_else(|| field(node, "value"))
        .or_else(|| own_text(node))
        .ok_or_else(|| ParseError::missing_field(line, "shape"))?;

    let start = parse_seconds(line, start)?;
    let end = parse_seconds(line, end)?;
    let shape = MouthShape::from_letter(shape_text)
        .ok_or_else(|| ParseError::unknown_shape(line, shape_text))?;

    Ok(Cue::new(start, end, shape))
}

/// Attribute value or child element text.
fn field<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name)
        .or_else(|| child_text(node, name))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn child_text<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Direct text content of the element, ignoring child elements.
fn own_text<'a>(node: &Node<'a, '_>) -> Option<&'a str> {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .map(str::trim)
        .find(|t| !t.is_empty())
}

fn parse_seconds(line: usize, value: &str) -> ParseResult<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::invalid_time(line, value))
}
