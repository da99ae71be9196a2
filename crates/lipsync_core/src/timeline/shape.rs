//! Mouth shape symbols.
//!
//! The analysis tool emits six basic shapes (A-F) and up to three
//! extended shapes (G, H, X). Frame-based exports may name them with
//! numeric codes or Preston-Blair names instead; everything is mapped
//! onto [`MouthShape`] on ingestion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::TimelineError;

/// A mouth shape symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MouthShape {
    /// Closed mouth for "P", "B" and "M".
    A,
    /// Slightly open mouth with clenched teeth.
    B,
    /// Open mouth for vowels like "EH" and "AE".
    C,
    /// Wide open mouth for "AA".
    D,
    /// Slightly rounded mouth for "AO" and "ER".
    E,
    /// Puckered lips for "UW", "OW" and "W".
    F,
    /// Upper teeth touching the lower lip for "F" and "V".
    G,
    /// Tongue raised behind the upper teeth for long "L".
    H,
    /// Idle position, used for pauses.
    X,
}

impl MouthShape {
    /// All shapes in code order.
    pub const ALL: [MouthShape; 9] = [
        MouthShape::A,
        MouthShape::B,
        MouthShape::C,
        MouthShape::D,
        MouthShape::E,
        MouthShape::F,
        MouthShape::G,
        MouthShape::H,
        MouthShape::X,
    ];

    /// Single-letter symbol.
    pub fn letter(self) -> char {
        match self {
            MouthShape::A => 'A',
            MouthShape::B => 'B',
            MouthShape::C => 'C',
            MouthShape::D => 'D',
            MouthShape::E => 'E',
            MouthShape::F => 'F',
            MouthShape::G => 'G',
            MouthShape::H => 'H',
            MouthShape::X => 'X',
        }
    }

    /// Parse a single-letter symbol (case-insensitive).
    pub fn from_letter(s: &str) -> Option<Self> {
        let mut chars = s.trim().chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|shape| shape.letter() == c.to_ascii_uppercase())
    }

    /// Numeric code used by frame-based exports (A = 0 ... X = 8).
    pub fn code(self) -> u32 {
        Self::ALL
            .iter()
            .position(|shape| *shape == self)
            .map(|i| i as u32)
            .unwrap_or_default()
    }

    /// Look up a shape by numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Preston-Blair phoneme group name for this shape.
    pub fn preston_blair_name(self) -> &'static str {
        match self {
            MouthShape::A => "MBP",
            MouthShape::B => "etc",
            MouthShape::C => "E",
            MouthShape::D => "AI",
            MouthShape::E => "O",
            MouthShape::F => "U",
            MouthShape::G => "FV",
            MouthShape::H => "L",
            MouthShape::X => "rest",
        }
    }

    /// Look up a shape by Preston-Blair name (case-insensitive).
    ///
    /// `WQ` is accepted as an alias for the puckered shape.
    pub fn from_preston_blair(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("WQ") {
            return Some(MouthShape::F);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|shape| shape.preston_blair_name().eq_ignore_ascii_case(name))
    }

    /// Whether this is one of the optional extended shapes.
    pub fn is_extended(self) -> bool {
        matches!(self, MouthShape::G | MouthShape::H | MouthShape::X)
    }
}

impl fmt::Display for MouthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for MouthShape {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_letter(s).ok_or_else(|| TimelineError::UnknownShape(s.to_string()))
    }
}

/// The set of extended shapes the analysis tool is allowed to use.
///
/// Serialized as the letter string the tool expects (`"GHX"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtendedShapes {
    shapes: Vec<MouthShape>,
}

impl ExtendedShapes {
    /// All extended shapes (the tool's default).
    pub fn all() -> Self {
        Self {
            shapes: vec![MouthShape::G, MouthShape::H, MouthShape::X],
        }
    }

    /// Basic shapes only.
    pub fn none() -> Self {
        Self { shapes: Vec::new() }
    }

    /// Parse a letter string such as `"GX"`. Whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, TimelineError> {
        let mut shapes = Vec::new();
        for c in s.chars().filter(|c| !c.is_whitespace()) {
            let shape = MouthShape::from_letter(&c.to_string())
                .filter(|shape| shape.is_extended())
                .ok_or_else(|| TimelineError::UnknownShape(c.to_string()))?;
            shapes.push(shape);
        }
        shapes.sort();
        shapes.dedup();
        Ok(Self { shapes })
    }

    /// Whether the set contains the given shape.
    pub fn contains(&self, shape: MouthShape) -> bool {
        self.shapes.contains(&shape)
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Whether this is the full G/H/X set.
    pub fn is_all(&self) -> bool {
        self.shapes.len() == 3
    }
}

impl Default for ExtendedShapes {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for ExtendedShapes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for shape in &self.shapes {
            write!(f, "{}", shape.letter())?;
        }
        Ok(())
    }
}

impl TryFrom<String> for ExtendedShapes {
    type Error = TimelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExtendedShapes> for String {
    fn from(value: ExtendedShapes) -> Self {
        value.to_string()
    }
}
