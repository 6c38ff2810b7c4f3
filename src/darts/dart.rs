use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumString, FromRepr};

/// Bullseye segment value. A double bull scores 50.
pub const BULL: u8 = 25;

/// Clockwise segment order starting at the top of the board.
pub const BOARD_ORDER: [u8; 20] = [
    20, 1, 18, 4, 13, 6, 10, 15, 2, 17, 3, 19, 7, 16, 8, 11, 14, 9, 12, 5,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DartError {
    #[error("Invalid dart value: {0}")]
    InvalidValue(u8),
    #[error("Invalid multiplier: {0}")]
    InvalidMultiplier(u8),
    #[error("Bull cannot be a triple")]
    TripleBull,
    #[error("Cannot parse dart notation: {0}")]
    Notation(String),
}

/// Rule deciding which dart may legally zero out a countdown score.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    FromRepr,
)]
#[repr(i16)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutshotType {
    Any = 1,
    #[default]
    Double = 2,
    /// Double or triple.
    Master = 3,
}

impl OutshotType {
    pub fn id(self) -> i16 {
        self as i16
    }
}

/// A single thrown dart.
///
/// `value` is `None` when the dart was never thrown (voided after a bust or a
/// checkout) and `Some(0)` when it was thrown and missed the board. The two
/// must stay distinguishable because only thrown darts count towards
/// darts-thrown totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dart {
    pub value: Option<u8>,
    pub multiplier: u8,
}

impl Default for Dart {
    fn default() -> Self {
        Self::not_thrown()
    }
}

impl Dart {
    /// Creates a validated dart. A miss always carries multiplier 1.
    pub fn new(value: Option<u8>, multiplier: u8) -> Result<Self, DartError> {
        let dart = Self { value, multiplier };
        dart.validate()?;
        Ok(dart.normalized())
    }

    pub const fn not_thrown() -> Self {
        Self {
            value: None,
            multiplier: 1,
        }
    }

    pub const fn miss() -> Self {
        Self {
            value: Some(0),
            multiplier: 1,
        }
    }

    /// Checks a dart that arrived without going through [`Dart::new`], e.g. a
    /// deserialized request body.
    pub fn validate(&self) -> Result<(), DartError> {
        if !(1..=3).contains(&self.multiplier) {
            return Err(DartError::InvalidMultiplier(self.multiplier));
        }
        match self.value {
            None | Some(0) => Ok(()),
            Some(v) if v <= 20 => Ok(()),
            Some(BULL) if self.multiplier == 3 => Err(DartError::TripleBull),
            Some(BULL) => Ok(()),
            Some(v) => Err(DartError::InvalidValue(v)),
        }
    }

    /// Same dart with the miss invariant enforced.
    pub fn normalized(self) -> Self {
        match self.value {
            None | Some(0) => Self {
                value: self.value,
                multiplier: 1,
            },
            Some(_) => self,
        }
    }

    pub fn score(&self) -> i32 {
        i32::from(self.value.unwrap_or(0)) * i32::from(self.multiplier)
    }

    pub fn is_thrown(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_hit(&self) -> bool {
        matches!(self.value, Some(v) if v > 0)
    }

    pub fn is_miss(&self) -> bool {
        self.value == Some(0)
    }

    pub fn is_single(&self) -> bool {
        self.is_hit() && self.multiplier == 1
    }

    pub fn is_double(&self) -> bool {
        self.is_hit() && self.multiplier == 2
    }

    pub fn is_triple(&self) -> bool {
        self.is_hit() && self.multiplier == 3
    }

    pub fn is_bull(&self) -> bool {
        self.value == Some(BULL)
    }

    pub fn hits(&self, target: u8) -> bool {
        target > 0 && self.value == Some(target)
    }

    /// Marks scored on `target`: the multiplier when the segment is hit.
    pub fn marks(&self, target: u8) -> u32 {
        if self.hits(target) {
            u32::from(self.multiplier)
        } else {
            0
        }
    }

    /// Whether zeroing a score with this dart satisfies `outshot`.
    pub fn is_valid_finish(&self, outshot: OutshotType) -> bool {
        match outshot {
            OutshotType::Any => self.is_hit(),
            OutshotType::Double => self.is_double(),
            OutshotType::Master => self.is_double() || self.is_triple(),
        }
    }

    /// True when the dart, thrown at `remaining`, could have finished the leg
    /// under `outshot`. Only used for attempt counting.
    pub fn is_checkout_attempt(&self, remaining: i32, outshot: OutshotType) -> bool {
        self.is_thrown() && is_single_dart_finish(remaining, outshot)
    }

    /// True when throwing this dart at `remaining` busts under `outshot`.
    pub fn is_bust(&self, remaining: i32, outshot: OutshotType) -> bool {
        let after = remaining - self.score();
        if after < 0 {
            return true;
        }
        match outshot {
            OutshotType::Any => false,
            OutshotType::Double | OutshotType::Master => {
                after == 1 || (after == 0 && !self.is_valid_finish(outshot))
            }
        }
    }
}

/// Scores that a single dart can finish under `outshot`.
pub fn is_single_dart_finish(remaining: i32, outshot: OutshotType) -> bool {
    let double = remaining == 50 || ((2..=40).contains(&remaining) && remaining % 2 == 0);
    let triple = (3..=60).contains(&remaining) && remaining % 3 == 0;
    match outshot {
        OutshotType::Double => double,
        OutshotType::Master => double || triple,
        OutshotType::Any => {
            double || triple || (1..=20).contains(&remaining) || remaining == i32::from(BULL)
        }
    }
}

/// Number of board segments between two numbers, going the short way round.
pub fn segment_distance(a: u8, b: u8) -> Option<usize> {
    let ia = BOARD_ORDER.iter().position(|&v| v == a)?;
    let ib = BOARD_ORDER.iter().position(|&v| v == b)?;
    let diff = ia.abs_diff(ib);
    Some(diff.min(BOARD_ORDER.len() - diff))
}

impl fmt::Display for Dart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value, self.multiplier) {
            (None, _) => write!(f, "-"),
            (Some(0), _) => write!(f, "MISS"),
            (Some(BULL), 2) => write!(f, "DBULL"),
            (Some(BULL), _) => write!(f, "BULL"),
            (Some(v), 2) => write!(f, "D{}", v),
            (Some(v), 3) => write!(f, "T{}", v),
            (Some(v), _) => write!(f, "S{}", v),
        }
    }
}

impl FromStr for Dart {
    type Err = DartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let notation = s.trim().to_ascii_uppercase();
        match notation.as_str() {
            "" | "-" => return Ok(Self::not_thrown()),
            "0" | "MISS" => return Ok(Self::miss()),
            "BULL" => return Self::new(Some(BULL), 1),
            "DBULL" => return Self::new(Some(BULL), 2),
            _ => {}
        }

        let (multiplier, digits) = if let Some(rest) = notation.strip_prefix('S') {
            (1, rest)
        } else if let Some(rest) = notation.strip_prefix('D') {
            (2, rest)
        } else if let Some(rest) = notation.strip_prefix('T') {
            (3, rest)
        } else {
            (1, notation.as_str())
        };
        let value = digits
            .parse::<u8>()
            .map_err(|_| DartError::Notation(s.to_string()))?;
        Self::new(Some(value), multiplier)
    }
}
