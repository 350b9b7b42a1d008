//! XP curve and level-up resolution
//!
//! Two curves live here and they are not the same:
//! - `required_xp(level)` = 100 × level × 1.25, used for progress display
//! - the resolution curve inside `apply_xp`, which starts at
//!   `required_xp(level)` and then grows by floor(× 1.25) per level gained
//!
//! The curves agree on the first requirement and diverge after the first
//! level-up. Level-up resolution must use the iterative curve.

use serde::{Deserialize, Serialize};

/// Base XP unit per level before the curve multiplier
const XP_PER_LEVEL: f64 = 100.0;

/// Growth factor applied to the requirement
const CURVE_FACTOR: f64 = 1.25;

/// XP needed to advance from `level` to `level + 1` (display curve)
///
/// Strictly increasing in `level`. `required_xp(1) == 125.0`.
pub fn required_xp(level: u32) -> f64 {
    XP_PER_LEVEL * level as f64 * CURVE_FACTOR
}

/// Normalize an XP pool against the iterative requirement curve
///
/// Repeatedly subtracts the current requirement and increments the level
/// while the pool covers it. The first requirement is `required_xp(level)`;
/// every following one is `floor(previous × 1.25)`.
///
/// # Arguments
/// * `xp` - Residual XP plus any new deposit
/// * `level` - Current level (1-based)
///
/// # Returns
/// `(new_level, new_xp)` where `new_xp` is below the iterative requirement
/// for `new_level`
pub fn apply_xp(xp: u64, level: u32) -> (u32, u64) {
    let mut xp = xp;
    let mut level = level;
    let mut req = required_xp(level).floor() as u64;

    // A zero requirement would never terminate
    if req == 0 {
        return (level, xp);
    }

    while xp >= req {
        xp -= req;
        level = level.saturating_add(1);
        // floor(req × 1.25) on integers, without overflowing req × 5
        req = req.saturating_add(req / 4);
    }

    (level, xp)
}

/// Result of crediting XP to an `XpState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelProgress {
    /// Level before the deposit
    pub previous_level: u32,
    /// Level after normalization
    pub level: u32,
    /// Residual XP after normalization
    pub xp: u64,
    /// Number of levels gained by this deposit
    pub levels_gained: u32,
}

impl LevelProgress {
    /// True if the deposit crossed at least one level boundary
    pub fn leveled_up(&self) -> bool {
        self.levels_gained > 0
    }
}

/// Per-user progression state
///
/// Persisted by callers after every mutation. Only the Leveling Engine
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpState {
    /// Residual experience within the current level
    pub xp: u64,
    /// Current level, starts at 1
    pub level: u32,
}

impl XpState {
    /// Fresh state for a new account or language
    pub fn new() -> Self {
        Self { xp: 0, level: 1 }
    }

    /// Restore a persisted state, normalizing it on the way in
    pub fn from_parts(xp: u64, level: u32) -> Self {
        let level = level.max(1);
        let (level, xp) = apply_xp(xp, level);
        Self { xp, level }
    }

    /// Deposit XP and resolve any level-up cascade
    ///
    /// Zero-point deposits are skipped and leave the state untouched.
    pub fn credit(&mut self, points: u64) -> LevelProgress {
        let previous_level = self.level;

        if points > 0 {
            let (level, xp) = apply_xp(self.xp.saturating_add(points), self.level);
            self.level = level;
            self.xp = xp;
            tracing::debug!(points, previous_level, level, xp, "XP credited");
        }

        LevelProgress {
            previous_level,
            level: self.level,
            xp: self.xp,
            levels_gained: self.level - previous_level,
        }
    }

    /// Progress-bar fill for the current level, 0.0 to 1.0
    ///
    /// Uses the display curve `required_xp`, so after a cascade the bar can
    /// read slightly lower than the resolution curve would suggest.
    pub fn progress_fraction(&self) -> f64 {
        let req = required_xp(self.level);
        if req <= 0.0 {
            return 0.0;
        }
        (self.xp as f64 / req).clamp(0.0, 1.0)
    }
}

impl Default for XpState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for XpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "level {} ({} / {} XP)",
            self.level,
            self.xp,
            required_xp(self.level)
        )
    }
}
