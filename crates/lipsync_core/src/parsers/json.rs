//! JSON cue parser.
//!
//! ```json
//! {
//!   "metadata": { "soundFile": "hello.wav", "duration": 1.2 },
//!   "mouthCues": [
//!     { "start": 0.00, "end": 0.50, "value": "A" },
//!     { "start": 0.50, "end": 1.20, "value": "B" }
//!   ]
//! }
//! ```

use serde::Deserialize;
use serde_json::Value;

use super::error::{ParseError, ParseResult};
use crate::timeline::{Cue, MouthShape, Timeline, TimelineMetadata};

const CUES_KEY: &str = "mouthCues";

#[derive(Debug, Deserialize)]
struct JsonCue {
    start: f64,
    end: f64,
    #[serde(alias = "shape")]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonMetadata {
    sound_file: Option<String>,
    duration: Option<f64>,
}

/// Parse a JSON document into a Timeline.
pub fn parse_json(content: &str) -> ParseResult<Timeline> {
    let root: Value =
        serde_json::from_str(content).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

    let object = root
        .as_object()
        .ok_or_else(|| ParseError::MalformedJson("root is not an object".to_string()))?;

    let raw_cues = object
        .get(CUES_KEY)
        .filter(|v| v.is_array())
        .ok_or_else(|| ParseError::MissingKey(CUES_KEY.to_string()))?;

    let json_cues: Vec<JsonCue> = serde_json::from_value(raw_cues.clone())
        .map_err(|e| ParseError::MalformedJson(format!("{}: {}", CUES_KEY, e)))?;

    let metadata: JsonMetadata = match object.get("metadata") {
        Some(meta) => serde_json::from_value(meta.clone())
            .map_err(|e| ParseError::MalformedJson(format!("metadata: {}", e)))?,
        None => JsonMetadata::default(),
    };

    // JSON has no line structure; report the cue's position (1-based)
    let mut cues = Vec::with_capacity(json_cues.len());
    for (i, cue) in json_cues.into_iter().enumerate() {
        let shape = MouthShape::from_letter(&cue.value)
            .ok_or_else(|| ParseError::unknown_shape(i + 1, cue.value.clone()))?;
        cues.push(Cue::new(cue.start, cue.end, shape));
    }

    Ok(Timeline::new(cues)?.with_metadata(TimelineMetadata {
        sound_file: metadata.sound_file,
        duration: metadata.duration,
        source_path: None,
    }))
}
