//! Cue file parsers.
//!
//! Each parser is a pure function that takes content and returns a
//! validated [`Timeline`]. Overlapping or out-of-order cues are reported
//! as [`ParseError`], never silently dropped or reordered.
//!
//! # Usage
//!
//! ```no_run
//! use lipsync_core::parsers::{parse_file, ParseOptions};
//!
//! let timeline = parse_file("hello.json", &ParseOptions::default())?;
//! println!("{} cues", timeline.len());
//! # Ok::<(), lipsync_core::parsers::ParseError>(())
//! ```

mod dat;
mod error;
mod json;
mod tsv;
mod types;
mod xml;

pub use dat::parse_dat;
pub use error::{ParseError, ParseResult};
pub use json::parse_json;
pub use tsv::parse_tsv;
pub use types::{DatNaming, ExportFormat, ParseOptions};
pub use xml::parse_xml;

use std::fs;
use std::path::Path;

use crate::timeline::{Timeline, TimelineMetadata};

/// Parse cue content in the given format.
///
/// Detects the format from content when `format` is `None`.
pub fn parse_content(
    content: &str,
    format: Option<ExportFormat>,
    options: &ParseOptions,
) -> ParseResult<Timeline> {
    let format = format.unwrap_or_else(|| detect_format(content));

    let timeline = match format {
        ExportFormat::Tsv => parse_tsv(content)?,
        ExportFormat::Json => parse_json(content)?,
        ExportFormat::Xml => parse_xml(content)?,
        ExportFormat::Dat => parse_dat(content, options)?,
    };

    tracing::debug!("Parsed {} cues as {}", timeline.len(), format);
    Ok(timeline)
}

/// Parse raw bytes; content must be UTF-8 (a leading BOM is ignored).
pub fn parse_bytes(
    bytes: &[u8],
    format: Option<ExportFormat>,
    options: &ParseOptions,
) -> ParseResult<Timeline> {
    let content = std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))?;
    parse_content(content.trim_start_matches('\u{feff}'), format, options)
}

/// Parse a cue file from disk.
///
/// The format is taken from the file extension.
pub fn parse_file(path: impl AsRef<Path>, options: &ParseOptions) -> ParseResult<Timeline> {
    let path = path.as_ref();
    parse_file_as(path, ExportFormat::from_extension(path), options)
}

/// Parse a cue file from disk in an explicit format.
pub fn parse_file_as(
    path: impl AsRef<Path>,
    format: ExportFormat,
    options: &ParseOptions,
) -> ParseResult<Timeline> {
    let path = path.as_ref();

    let bytes = fs::read(path).map_err(|e| ParseError::read(path, e))?;
    let timeline = parse_bytes(&bytes, Some(format), options)?;

    let metadata = TimelineMetadata {
        source_path: Some(path.to_path_buf()),
        ..timeline.metadata().clone()
    };
    Ok(timeline.with_metadata(metadata))
}

/// Detect cue format from content.
fn detect_format(content: &str) -> ExportFormat {
    let trimmed = content.trim_start();

    if trimmed.starts_with('{') {
        return ExportFormat::Json;
    }
    if trimmed.starts_with('<') {
        return ExportFormat::Xml;
    }

    let first_line = trimmed.lines().next().unwrap_or_default().to_ascii_lowercase();
    if first_line.starts_with("mohoswitch")
        || first_line.starts_with("framerate")
        || first_line.starts_with("fps")
    {
        return ExportFormat::Dat;
    }

    ExportFormat::Tsv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Cue, MouthShape};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TSV: &str = "0.00\t0.50\tA\n0.50\t1.20\tB\n1.20\t1.45\tX\n";
    const JSON: &str = r#"{"mouthCues": [
        {"start": 0.00, "end": 0.50, "value": "A"},
        {"start": 0.50, "end": 1.20, "value": "B"},
        {"start": 1.20, "end": 1.45, "value": "X"}
    ]}"#;
    const XML: &str = r#"<rhubarbResult><mouthCues>
        <mouthCue start="0.00" end="0.50">A</mouthCue>
        <mouthCue start="0.50" end="1.20">B</mouthCue>
        <mouthCue start="1.20" end="1.45">X</mouthCue>
    </mouthCues></rhubarbResult>"#;

    #[test]
    fn formats_yield_equal_cues() {
        let options = ParseOptions::default();
        let tsv = parse_content(TSV, Some(ExportFormat::Tsv), &options).unwrap();
        let json = parse_content(JSON, Some(ExportFormat::Json), &options).unwrap();
        let xml = parse_content(XML, Some(ExportFormat::Xml), &options).unwrap();

        assert_eq!(tsv.cues(), json.cues());
        assert_eq!(json.cues(), xml.cues());
        assert_eq!(tsv.cues()[2], Cue::new(1.2, 1.45, MouthShape::X));
    }

    #[test]
    fn detects_format_from_content() {
        assert_eq!(detect_format(TSV), ExportFormat::Tsv);
        assert_eq!(detect_format(JSON), ExportFormat::Json);
        assert_eq!(detect_format(XML), ExportFormat::Xml);
        assert_eq!(detect_format("MohoSwitch1\n1 X\n"), ExportFormat::Dat);
    }

    #[test]
    fn parse_bytes_rejects_invalid_utf8() {
        let err = parse_bytes(&[0xff, 0xfe, 0x00], None, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Encoding(_)));
    }

    #[test]
    fn parse_file_uses_extension_and_records_source() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(JSON.as_bytes()).unwrap();

        let timeline = parse_file(file.path(), &ParseOptions::default()).unwrap();
        assert_eq!(timeline.len(), 3);
        assert_eq!(
            timeline.metadata().source_path.as_deref(),
            Some(file.path())
        );
    }

    #[test]
    fn parse_file_as_ignores_extension() {
        let mut file = NamedTempFile::with_suffix(".out").unwrap();
        file.write_all(XML.as_bytes()).unwrap();

        let timeline =
            parse_file_as(file.path(), ExportFormat::Xml, &ParseOptions::default()).unwrap();
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn parse_file_missing_is_read_error() {
        let err = parse_file("/nonexistent/cues.tsv", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Read { .. }));
    }
}
