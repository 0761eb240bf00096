//! Age groups, content types and validation direction
//!
//! The age group decides which policy thresholds and rule subsets apply.
//! Unknown or malformed identities always resolve to [`AgeGroup::Child`].

use serde::{Deserialize, Serialize};

/// Age bucket for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    /// Youngest users, strictest policy
    Child,
    /// Teenagers
    Teen,
    /// Adults (parents, guardians)
    Adult,
}

impl AgeGroup {
    /// All age groups, most restrictive first
    pub const ALL: [AgeGroup; 3] = [AgeGroup::Child, AgeGroup::Teen, AgeGroup::Adult];

    /// The group used when a user's age cannot be determined
    pub fn most_restrictive() -> Self {
        Self::Child
    }

    /// Restrictiveness rank (higher = stricter)
    pub fn restrictiveness(&self) -> u8 {
        match self {
            Self::Child => 2,
            Self::Teen => 1,
            Self::Adult => 0,
        }
    }

    /// True when `other` is stricter than `self`
    pub fn is_less_restrictive_than(&self, other: AgeGroup) -> bool {
        self.restrictiveness() < other.restrictiveness()
    }
}

impl Default for AgeGroup {
    fn default() -> Self {
        Self::most_restrictive()
    }
}

impl std::fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Child => write!(f, "child"),
            Self::Teen => write!(f, "teen"),
            Self::Adult => write!(f, "adult"),
        }
    }
}

impl std::str::FromStr for AgeGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "child" => Ok(Self::Child),
            "teen" => Ok(Self::Teen),
            "adult" => Ok(Self::Adult),
            _ => Err(format!("Unknown age group: {}", s)),
        }
    }
}

/// Where a piece of content sits in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    /// Transcribed speech from the child
    VoiceInput,
    /// Text the device is about to speak
    TextOutput,
    /// Device command (e.g. "play music")
    Command,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::VoiceInput,
        ContentType::TextOutput,
        ContentType::Command,
    ];
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VoiceInput => write!(f, "voice-input"),
            Self::TextOutput => write!(f, "text-output"),
            Self::Command => write!(f, "command"),
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "voice-input" => Ok(Self::VoiceInput),
            "text-output" => Ok(Self::TextOutput),
            "command" => Ok(Self::Command),
            _ => Err(format!("Unknown content type: {}", s)),
        }
    }
}

/// Direction of a validation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Produced by the child; may be hard-blocked
    Input,
    /// Produced by the device; always yields speakable text
    Output,
}

impl Direction {
    /// Content type the pipeline sees for this direction
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Input => ContentType::VoiceInput,
            Self::Output => ContentType::TextOutput,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "input" | "in" => Ok(Self::Input),
            "output" | "out" => Ok(Self::Output),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}
