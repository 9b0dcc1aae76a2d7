//! Course-level banding tables. Lower bounds are inclusive, so a value on a
//! boundary lands in the higher band.

/// Attendance contributes this many marks to the overall total.
pub const MAX_ATTENDANCE_MARKS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeBand {
    pub min_percentage: f64,
    pub letter: &'static str,
    pub gpa: f64,
    pub description: &'static str,
}

const GRADE_BANDS: [GradeBand; 10] = [
    GradeBand { min_percentage: 80.0, letter: "A+", gpa: 4.00, description: "Outstanding" },
    GradeBand { min_percentage: 75.0, letter: "A", gpa: 3.75, description: "Excellent" },
    GradeBand { min_percentage: 70.0, letter: "A-", gpa: 3.50, description: "Very Good" },
    GradeBand { min_percentage: 65.0, letter: "B+", gpa: 3.25, description: "Good" },
    GradeBand { min_percentage: 60.0, letter: "B", gpa: 3.00, description: "Above Average" },
    GradeBand { min_percentage: 55.0, letter: "B-", gpa: 2.75, description: "Average" },
    GradeBand { min_percentage: 50.0, letter: "C", gpa: 2.50, description: "Below Average" },
    GradeBand { min_percentage: 45.0, letter: "D", gpa: 2.25, description: "Poor" },
    GradeBand { min_percentage: 40.0, letter: "E", gpa: 2.00, description: "Very Poor" },
    GradeBand { min_percentage: f64::NEG_INFINITY, letter: "F", gpa: 0.00, description: "Fail" },
];

const ATTENDANCE_BANDS: [(f64, f64); 4] = [
    (75.0, 30.0),
    (50.0, 20.0),
    (25.0, 10.0),
    (f64::NEG_INFINITY, 0.0),
];

/// Letter grade and GPA for an overall percentage. Anything below 40,
/// including negative totals from copy penalties, is an F.
pub fn grade_for_percentage(percentage: f64) -> &'static GradeBand {
    GRADE_BANDS
        .iter()
        .find(|band| percentage >= band.min_percentage)
        .unwrap_or(&GRADE_BANDS[GRADE_BANDS.len() - 1])
}

pub fn attendance_marks(attendance_percentage: f64) -> f64 {
    ATTENDANCE_BANDS
        .iter()
        .find(|(min, _)| attendance_percentage >= *min)
        .map(|(_, marks)| *marks)
        .unwrap_or(0.0)
}

pub fn grade_bands() -> &'static [GradeBand] {
    &GRADE_BANDS
}
