//! Quiz score to XP conversion

use crate::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Quiz mode
///
/// Test mode pays out 2.5× practice mode for the same score ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizMode {
    /// Untimed practice round
    #[default]
    Practice,
    /// Graded test round
    Test,
}

impl QuizMode {
    /// XP awarded for a perfect score
    pub fn multiplier(&self) -> u64 {
        match self {
            QuizMode::Practice => 100,
            QuizMode::Test => 250,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizMode::Practice => "practice",
            QuizMode::Test => "test",
        }
    }
}

impl FromStr for QuizMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "practice" => Ok(QuizMode::Practice),
            "test" => Ok(QuizMode::Test),
            other => Err(Error::InvalidInput(format!(
                "unknown quiz mode '{}' (expected 'practice' or 'test')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for QuizMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// XP granted for a finished quiz: floor(score / max_questions × multiplier)
///
/// A quiz with no questions grants nothing. Scores above `max_questions`
/// are clamped to a perfect score.
pub fn quiz_xp(score: u32, max_questions: u32, mode: QuizMode) -> u64 {
    if max_questions == 0 {
        return 0;
    }
    let score = score.min(max_questions) as u64;
    // Integer form of the floor keeps 1/3-style ratios exact
    score * mode.multiplier() / max_questions as u64
}
