use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{
    AssignmentId, AttendanceSummary, CourseId, FieldName, FieldValue, StudentId, SubmissionStatus,
};

/// One flattened (student, assignment) row of the course grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRow {
    #[serde(default)]
    pub id: Option<i64>,
    pub assignment_id: AssignmentId,
    #[serde(default)]
    pub assignment_title: String,
    pub max_marks: f64,
    #[serde(default)]
    pub assignment_deadline: Option<NaiveDateTime>,
    #[serde(default)]
    pub late_submission_deadline: Option<NaiveDateTime>,
    pub student_id: StudentId,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub student_email: String,
    #[serde(default)]
    pub submission_status: Option<SubmissionStatus>,
    #[serde(default)]
    pub is_late_submission: Option<bool>,
    #[serde(default)]
    pub teacher_mark: Option<f64>,
    #[serde(default)]
    pub copy_penalty_applied: Option<bool>,
    #[serde(default)]
    pub final_mark: Option<f64>,
    #[serde(default)]
    pub grading_notes: Option<String>,
    #[serde(default)]
    pub is_processed: Option<bool>,
    #[serde(default)]
    pub grades_visible: Option<bool>,
}

/// Single-field write sent when a debounce timer fires.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPatch {
    pub course_id: CourseId,
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    pub field: FieldName,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvUpload {
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CopyCheckReport {
    pub total_flagged: usize,
    #[serde(default)]
    pub flagged_identifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetEntry {
    pub assignment_id: AssignmentId,
    #[serde(default)]
    pub assignment_title: String,
    pub max_marks: f64,
    #[serde(default)]
    pub grades_visible: bool,
    #[serde(default)]
    pub teacher_mark: Option<f64>,
    #[serde(default)]
    pub final_mark: Option<f64>,
    #[serde(default)]
    pub is_late_submission: Option<bool>,
    #[serde(default)]
    pub copy_penalty_applied: Option<bool>,
}

/// What the grades endpoint returns for one student in one course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradeSheet {
    #[serde(default)]
    pub course_id: CourseId,
    #[serde(default)]
    pub assignments: Vec<GradeSheetEntry>,
    #[serde(default)]
    pub attendance: AttendanceSummary,
}
