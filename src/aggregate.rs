//! Course-level totals built from per-assignment final marks.
//!
//! Two views exist: an assignments-only total for the grading grid, and an
//! attendance-inclusive overall grade for the student. Letter and GPA always
//! come from the same band lookup on the attendance-inclusive percentage.

use serde::Serialize;

use crate::bands::{self, GradeBand, MAX_ATTENDANCE_MARKS};
use crate::grading::{GradeSheetEntry, StudentGradeSheet};
use crate::grid::GridModel;
use crate::model::{AssignmentId, AttendanceSummary, StudentId};
use crate::penalty::{self, PerformanceTier};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CourseTotals {
    pub obtained: f64,
    pub possible: f64,
    /// `None` when no marks are possible at all.
    pub percentage: Option<f64>,
    pub graded_count: usize,
    pub total_count: usize,
}

/// Sum `(full_mark, final_mark)` pairs. Ungraded items still count towards
/// the possible total.
pub fn assignments_total<I>(items: I) -> CourseTotals
where
    I: IntoIterator<Item = (f64, Option<f64>)>,
{
    let mut obtained = 0.0;
    let mut possible = 0.0;
    let mut graded_count = 0;
    let mut total_count = 0;

    for (full_mark, final_mark) in items {
        total_count += 1;
        possible += full_mark;
        if let Some(mark) = final_mark {
            obtained += mark;
            graded_count += 1;
        }
    }

    let percentage = if possible > 0.0 {
        Some(obtained / possible * 100.0)
    } else {
        None
    };

    CourseTotals {
        obtained,
        possible,
        percentage,
        graded_count,
        total_count,
    }
}

/// In-progress total for one student straight from the grid.
pub fn grid_total(grid: &GridModel, student_id: StudentId) -> CourseTotals {
    assignments_total(
        grid.row_for(student_id)
            .into_iter()
            .map(|(assignment, record)| (assignment.full_mark, record.and_then(|r| r.final_mark()))),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverallGrade {
    pub obtained: f64,
    pub possible: f64,
    pub attendance_marks: f64,
    pub percentage: f64,
    pub letter: &'static str,
    pub gpa: f64,
}

pub fn attendance_inclusive(totals: &CourseTotals, attendance: &AttendanceSummary) -> OverallGrade {
    let attendance_marks = bands::attendance_marks(attendance.attendance_percentage);
    let obtained = totals.obtained + attendance_marks;
    let possible = totals.possible + MAX_ATTENDANCE_MARKS;
    let percentage = obtained / possible * 100.0;
    let band = bands::grade_for_percentage(percentage);
    OverallGrade {
        obtained,
        possible,
        attendance_marks,
        percentage,
        letter: band.letter,
        gpa: band.gpa,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentGrade {
    /// Grades not released for this assignment yet.
    Hidden,
    NotGraded,
    Graded {
        final_mark: f64,
        percentage: Option<f64>,
        tier: PerformanceTier,
        band: Option<&'static GradeBand>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentLine {
    pub assignment_id: AssignmentId,
    pub title: String,
    pub full_mark: f64,
    pub grade: AssignmentGrade,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentReport {
    pub lines: Vec<AssignmentLine>,
    pub totals: CourseTotals,
    pub overall: OverallGrade,
    pub attendance: AttendanceSummary,
}

fn visible_final_mark(entry: &GradeSheetEntry) -> Option<f64> {
    if !entry.grades_visible {
        return None;
    }
    penalty::resolve(
        entry.teacher_mark,
        entry.max_marks,
        entry.copy_penalty_applied.unwrap_or(false),
        entry.is_late_submission.unwrap_or(false),
    )
}

/// Student-facing summary. Nothing about an assignment whose grades are not
/// visible is computed, but its full mark still counts as possible.
pub fn student_report(sheet: &StudentGradeSheet) -> StudentReport {
    let lines: Vec<AssignmentLine> = sheet
        .assignments
        .iter()
        .map(|entry| {
            let grade = if !entry.grades_visible {
                AssignmentGrade::Hidden
            } else {
                match visible_final_mark(entry) {
                    None => AssignmentGrade::NotGraded,
                    Some(final_mark) => {
                        let percentage = penalty::percentage(final_mark, entry.max_marks);
                        AssignmentGrade::Graded {
                            final_mark,
                            percentage,
                            tier: PerformanceTier::classify(final_mark, entry.max_marks),
                            band: percentage.map(bands::grade_for_percentage),
                        }
                    }
                }
            };
            AssignmentLine {
                assignment_id: entry.assignment_id,
                title: entry.assignment_title.clone(),
                full_mark: entry.max_marks,
                grade,
            }
        })
        .collect();

    let totals = assignments_total(
        sheet
            .assignments
            .iter()
            .map(|entry| (entry.max_marks, visible_final_mark(entry))),
    );
    let overall = attendance_inclusive(&totals, &sheet.attendance);

    StudentReport {
        lines,
        totals,
        overall,
        attendance: sheet.attendance,
    }
}
