//! Penalty precedence for a single assessment.
//!
//! A copy penalty forfeits the whole assignment and wins over everything
//! else; a late submission loses 5% of the obtained mark; otherwise the
//! teacher's mark stands. No mark entered means no final mark, whatever the
//! flags say.

/// Share of the obtained mark kept for a late submission.
pub const LATE_PENALTY_FACTOR: f64 = 0.95;

pub fn resolve(
    teacher_mark: Option<f64>,
    full_mark: f64,
    copy_penalty_applied: bool,
    is_late: bool,
) -> Option<f64> {
    let mark = teacher_mark?;
    if copy_penalty_applied {
        Some(-full_mark)
    } else if is_late {
        Some(mark * LATE_PENALTY_FACTOR)
    } else {
        Some(mark)
    }
}

/// `final_mark / full_mark * 100`, or `None` when the ratio is undefined.
pub fn percentage(final_mark: f64, full_mark: f64) -> Option<f64> {
    if full_mark == 0.0 {
        return None;
    }
    Some(final_mark / full_mark * 100.0)
}

/// Per-assignment display tier, relative to the assignment's full mark.
/// Independent of the course-wide letter bands in [`crate::bands`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceTier {
    Penalty,
    Excellent,
    Good,
    Poor,
}

impl PerformanceTier {
    pub fn classify(final_mark: f64, full_mark: f64) -> Self {
        if final_mark < 0.0 {
            PerformanceTier::Penalty
        } else if final_mark >= 0.8 * full_mark {
            PerformanceTier::Excellent
        } else if final_mark >= 0.6 * full_mark {
            PerformanceTier::Good
        } else {
            PerformanceTier::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTier::Penalty => "penalty",
            PerformanceTier::Excellent => "excellent",
            PerformanceTier::Good => "good",
            PerformanceTier::Poor => "poor",
        }
    }
}
