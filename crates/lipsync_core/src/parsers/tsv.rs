//! Tab-separated cue parser.
//!
//! One cue per line:
//! ```text
//! 0.00	0.05	X
//! 0.05	0.27	D
//! ```
//!
//! Fields are `start`, `end` and `shape`; extra fields are ignored and
//! blank lines are skipped.

use super::error::{ParseError, ParseResult};
use crate::timeline::{Cue, MouthShape, Timeline};

/// Parse tab-separated content into a Timeline.
pub fn parse_tsv(content: &str) -> ParseResult<Timeline> {
    let mut cues = Vec::new();

    for (line_idx, raw) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            let missing = ["start", "end", "shape"][fields.len()];
            return Err(ParseError::missing_field(line_num, missing));
        }

        let start = parse_seconds(line_num, fields[0])?;
        let end = parse_seconds(line_num, fields[1])?;
        let shape = MouthShape::from_letter(fields[2])
            .ok_or_else(|| ParseError::unknown_shape(line_num, fields[2].trim()))?;

        cues.push(Cue::new(start, end, shape));
    }

    Ok(Timeline::new(cues)?)
}

fn parse_seconds(line: usize, field: &str) -> ParseResult<f64> {
    let value = field.trim();
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::invalid_time(line, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_cues() {
        let timeline = parse_tsv("0.0\t0.5\tA\n0.5\t1.2\tB\n").unwrap();
        assert_eq!(
            timeline.cues(),
            &[
                Cue::new(0.0, 0.5, MouthShape::A),
                Cue::new(0.5, 1.2, MouthShape::B)
            ]
        );
        assert_eq!(timeline.cue_at(0.6).map(|c| c.shape), Some(MouthShape::B));
    }

    #[test]
    fn tolerates_crlf_and_blank_lines() {
        let timeline = parse_tsv("0.00\t0.10\tX\r\n\r\n0.10\t0.20\tG\r\n").unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.cues()[1].shape, MouthShape::G);
    }

    #[test]
    fn empty_content_is_empty_timeline() {
        assert!(parse_tsv("").unwrap().is_empty());
    }

    #[test]
    fn rejects_short_lines() {
        let err = parse_tsv("0.0\t0.5\tA\n0.5\t1.0\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingField { line: 2, ref field } if field == "shape"
        ));
    }

    #[test]
    fn rejects_non_numeric_time() {
        let err = parse_tsv("zero\t0.5\tA\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidTime { line: 1, .. }));
    }

    #[test]
    fn rejects_unknown_shape() {
        let err = parse_tsv("0.0\t0.5\tQ\n").unwrap_err();
        assert!(matches!(err, ParseError::UnknownShape { line: 1, .. }));
    }

    #[test]
    fn rejects_overlapping_cues() {
        let err = parse_tsv("0.0\t0.6\tA\n0.5\t1.0\tB\n").unwrap_err();
        assert!(matches!(err, ParseError::Timeline(_)));
    }
}
