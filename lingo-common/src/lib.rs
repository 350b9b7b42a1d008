//! # Lingo Common Library
//!
//! Shared code for the Lingo language-learning crates including:
//! - XP curve and level-up resolution
//! - Quiz score to XP conversion
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod leveling;
pub mod scoring;

pub use error::{Error, Result};
pub use leveling::{apply_xp, required_xp, LevelProgress, XpState};
pub use scoring::{quiz_xp, QuizMode};
