//! Frame-based (DAT) cue parser.
//!
//! Switch data for animation packages such as Moho and OpenToonz:
//! ```text
//! MohoSwitch1
//! FrameRate 24
//! 0 X
//! 1 X
//! 2 A
//! ```
//!
//! - An optional `MohoSwitch1` marker and an optional frame rate
//!   declaration (`FrameRate 24`, `fps: 24`, `fps=24`) precede the frames.
//! - Each frame line is `index shape` or `index:shape`.
//! - Frame `i` covers `[i / rate, (i + 1) / rate)`.
//! - Indices must increase strictly; gaps between indices stay gaps.
//! - Adjacent frames with the same shape are merged into one cue when
//!   [`ParseOptions::coalesce_frames`] is set.

use super::error::{ParseError, ParseResult};
use super::types::{DatNaming, ParseOptions};
use crate::timeline::{Cue, MouthShape, Timeline};

const MOHO_MARKER: &str = "MohoSwitch1";

/// One parsed frame line.
#[derive(Debug, Clone, Copy)]
struct Frame {
    index: u64,
    shape: MouthShape,
}

/// Parse frame-based content into a Timeline.
pub fn parse_dat(content: &str, options: &ParseOptions) -> ParseResult<Timeline> {
    let mut declared_rate: Option<f64> = None;
    let mut frames: Vec<Frame> = Vec::new();

    for (line_idx, raw) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if frames.is_empty() {
            if line.eq_ignore_ascii_case(MOHO_MARKER) {
                continue;
            }
            if let Some(value) = frame_rate_declaration(line) {
                declared_rate = Some(parse_rate(line_num, value)?);
                continue;
            }
        }

        let frame = parse_frame_line(line_num, line, options.dat_naming)?;
        if let Some(previous) = frames.last() {
            if frame.index <= previous.index {
                return Err(ParseError::FrameOutOfOrder {
                    line: line_num,
                    frame: frame.index,
                    previous: previous.index,
                });
            }
        }
        frames.push(frame);
    }

    let rate = match declared_rate.or(options.dat_frame_rate) {
        Some(rate) if rate.is_finite() && rate > 0.0 => rate,
        Some(rate) => {
            return Err(ParseError::InvalidFrameRate {
                line: 0,
                value: rate.to_string(),
            })
        }
        None if frames.is_empty() => return Ok(Timeline::empty()),
        None => return Err(ParseError::MissingFrameRate),
    };

    Ok(Timeline::new(frames_to_cues(&frames, rate, options.coalesce_frames))?)
}

/// Convert frames to cues, optionally merging adjacent equal shapes.
fn frames_to_cues(frames: &[Frame], rate: f64, coalesce: bool) -> Vec<Cue> {
    let mut cues: Vec<Cue> = Vec::with_capacity(frames.len());
    let mut last_index: Option<u64> = None;

    for frame in frames {
        let start = frame.index as f64 / rate;
        let end = (frame.index as f64 + 1.0) / rate;

        let adjacent = last_index.is_some_and(|prev| prev + 1 == frame.index);
        match cues.last_mut() {
            Some(cue) if coalesce && adjacent && cue.shape == frame.shape => cue.end = end,
            _ => cues.push(Cue::new(start, end, frame.shape)),
        }
        last_index = Some(frame.index);
    }

    cues
}

/// Return the value part of a frame rate declaration line, if it is one.
fn frame_rate_declaration(line: &str) -> Option<&str> {
    let split_at = line.find(|c: char| c.is_whitespace() || c == ':' || c == '=')?;
    let (key, rest) = line.split_at(split_at);
    let key = key.to_ascii_lowercase();
    if key != "framerate" && key != "fps" {
        return None;
    }
    Some(rest.trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '=').trim())
}

fn parse_rate(line: usize, value: &str) -> ParseResult<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite() && *r > 0.0)
        .ok_or_else(|| ParseError::InvalidFrameRate {
            line,
            value: value.to_string(),
        })
}

/// Largest frame index whose start and end times are still distinct `f64`s.
const MAX_FRAME_INDEX: u64 = (1 << 53) - 2;

fn parse_frame_line(line: usize, text: &str, naming: DatNaming) -> ParseResult<Frame> {
    let (index_str, shape_str) = text
        .split_once(':')
        .or_else(|| text.split_once(char::is_whitespace))
        .ok_or_else(|| ParseError::missing_field(line, "shape"))?;

    let index_str = index_str.trim();
    let shape_str = shape_str.trim();
    if shape_str.is_empty() {
        return Err(ParseError::missing_field(line, "shape"));
    }

    let index = index_str
        .parse::<u64>()
        .ok()
        .filter(|index| *index <= MAX_FRAME_INDEX)
        .ok_or_else(|| ParseError::InvalidFrame {
            line,
            value: index_str.to_string(),
        })?;

    let shape = match naming {
        DatNaming::PrestonBlair => MouthShape::from_preston_blair(shape_str),
        DatNaming::Numeric => match shape_str.parse::<u32>() {
            Ok(code) => MouthShape::from_code(code),
            Err(_) => MouthShape::from_letter(shape_str),
        },
    }
    .ok_or_else(|| ParseError::unknown_shape(line, shape_str))?;

    Ok(Frame { index, shape })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 1.0 / 24.0;

    #[test]
    fn coalesces_adjacent_equal_frames() {
        let content = "MohoSwitch1\nFrameRate 24\n0 X\n1 X\n2 A\n";
        let timeline = parse_dat(content, &ParseOptions::default()).unwrap();

        assert_eq!(
            timeline.cues(),
            &[
                Cue::new(0.0, 2.0 / 24.0, MouthShape::X),
                Cue::new(2.0 / 24.0, 3.0 / 24.0, MouthShape::A)
            ]
        );
        assert!((timeline.cues()[0].end - 0.0833).abs() < 1e-3);
        assert!((timeline.cues()[1].end - 0.125).abs() < 1e-9);
    }

    #[test]
    fn one_cue_per_frame_without_coalescing() {
        let options = ParseOptions {
            coalesce_frames: false,
            ..ParseOptions::dat(24, DatNaming::Numeric)
        };
        let timeline = parse_dat("0:X\n1:X\n2:A\n", &options).unwrap();
        assert_eq!(timeline.len(), 3);
        assert!((timeline.cues()[0].end - FRAME).abs() < 1e-12);
        assert_eq!(timeline.cues()[1].shape, MouthShape::X);
    }

    #[test]
    fn huge_frame_index_is_invalid_frame() {
        let options = ParseOptions::dat(24, DatNaming::Numeric);
        let content = format!("0 A\n{} B\n", u64::MAX);
        match parse_dat(&content, &options) {
            Err(ParseError::InvalidFrame { line, value }) => {
                assert_eq!(line, 2);
                assert_eq!(value, u64::MAX.to_string());
            }
            other => panic!("expected invalid frame, got {:?}", other),
        }

        let last = format!("{} A\n", MAX_FRAME_INDEX);
        let timeline = parse_dat(&last, &options).unwrap();
        assert!(timeline.cues()[0].end > timeline.cues()[0].start);
    }

    #[test]
    fn rate_falls_back_to_options() {
        let timeline = parse_dat("0 A\n1 B\n", &ParseOptions::dat(10, DatNaming::Numeric)).unwrap();
        assert!((timeline.cues()[1].start - 0.1).abs() < 1e-12);
    }

    #[test]
    fn header_rate_overrides_options() {
        let timeline =
            parse_dat("fps: 12\n0 A\n", &ParseOptions::dat(24, DatNaming::Numeric)).unwrap();
        assert!((timeline.cues()[0].end - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn numeric_codes_map_to_shapes() {
        let timeline = parse_dat("fps=24\n0 8\n1 0\n2 6\n", &ParseOptions::default()).unwrap();
        let shapes: Vec<_> = timeline.iter().map(|c| c.shape).collect();
        assert_eq!(shapes, vec![MouthShape::X, MouthShape::A, MouthShape::G]);
    }

    #[test]
    fn preston_blair_names_map_to_shapes() {
        let options = ParseOptions::dat(24, DatNaming::PrestonBlair);
        let timeline = parse_dat("MohoSwitch1\n0 rest\n1 MBP\n2 E\n", &options).unwrap();
        let shapes: Vec<_> = timeline.iter().map(|c| c.shape).collect();
        assert_eq!(shapes, vec![MouthShape::X, MouthShape::A, MouthShape::C]);
    }

    #[test]
    fn gaps_between_frames_are_kept() {
        let timeline = parse_dat("fps 24\n0 A\n2 A\n", &ParseOptions::default()).unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.cue_index_at(1.5 * FRAME), None);
    }

    #[test]
    fn out_of_order_frames_fail() {
        let err = parse_dat("fps 24\n0 A\n2 B\n1 C\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::FrameOutOfOrder {
                line: 4,
                frame: 1,
                previous: 2
            }
        ));
    }

    #[test]
    fn duplicate_frames_fail() {
        let err = parse_dat("fps 24\n0 A\n0 B\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::FrameOutOfOrder { .. }));
    }

    #[test]
    fn missing_rate_fails() {
        let err = parse_dat("0 A\n", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::MissingFrameRate));
    }

    #[test]
    fn bad_rate_and_frame_fail() {
        assert!(matches!(
            parse_dat("fps zero\n0 A\n", &ParseOptions::default()),
            Err(ParseError::InvalidFrameRate { line: 1, .. })
        ));
        assert!(matches!(
            parse_dat("fps 24\nfirst A\n", &ParseOptions::default()),
            Err(ParseError::InvalidFrame { line: 2, .. })
        ));
        assert!(matches!(
            parse_dat("fps 24\n0 rest\n", &ParseOptions::default()),
            Err(ParseError::UnknownShape { line: 2, .. })
        ));
    }
}
