use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::penalty;

pub type CourseId = i64;
pub type StudentId = i64;
pub type AssignmentId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    OnTime,
    Late,
    Submitted,
    #[default]
    NotSubmitted,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::OnTime => "ON_TIME",
            SubmissionStatus::Late => "LATE",
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::NotSubmitted => "NOT_SUBMITTED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub title: String,
    pub full_mark: f64,
    pub deadline: Option<NaiveDateTime>,
    pub late_submission_deadline: Option<NaiveDateTime>,
    pub grades_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: String,
}

/// Teacher-editable inputs of an assessment record. The final mark is never
/// part of this set; it is derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordInputs {
    pub teacher_mark: Option<f64>,
    pub grading_notes: String,
    pub submission_status: SubmissionStatus,
    pub is_late_submission: bool,
    pub copy_penalty_applied: bool,
    pub is_processed: bool,
}

/// One (student, assignment) cell of the assessment grid.
///
/// `final_mark` is recomputed through [`penalty::resolve`] whenever one of
/// its inputs changes and cannot be written directly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRecord {
    student_id: StudentId,
    assignment_id: AssignmentId,
    inputs: RecordInputs,
    final_mark: Option<f64>,
}

impl AssessmentRecord {
    pub fn new(
        student_id: StudentId,
        assignment_id: AssignmentId,
        inputs: RecordInputs,
        full_mark: f64,
    ) -> Self {
        let mut record = Self {
            student_id,
            assignment_id,
            inputs,
            final_mark: None,
        };
        record.rederive(full_mark);
        record
    }

    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    pub fn assignment_id(&self) -> AssignmentId {
        self.assignment_id
    }

    pub fn teacher_mark(&self) -> Option<f64> {
        self.inputs.teacher_mark
    }

    pub fn grading_notes(&self) -> &str {
        &self.inputs.grading_notes
    }

    pub fn submission_status(&self) -> SubmissionStatus {
        self.inputs.submission_status
    }

    pub fn is_late_submission(&self) -> bool {
        self.inputs.is_late_submission
    }

    pub fn copy_penalty_applied(&self) -> bool {
        self.inputs.copy_penalty_applied
    }

    pub fn is_processed(&self) -> bool {
        self.inputs.is_processed
    }

    pub fn final_mark(&self) -> Option<f64> {
        self.final_mark
    }

    /// Late by explicit flag or by submission status.
    pub fn is_late(&self) -> bool {
        self.inputs.is_late_submission || self.inputs.submission_status == SubmissionStatus::Late
    }

    pub fn grade_status(&self) -> GradeStatus {
        if self.inputs.is_processed && self.final_mark.is_some() {
            GradeStatus::Graded
        } else if self.inputs.teacher_mark.is_some() {
            GradeStatus::NeedsReview
        } else {
            GradeStatus::NotGraded
        }
    }

    /// Write one field and recompute the final mark in the same step.
    /// Returns false when the value does not fit the field.
    pub(crate) fn apply(&mut self, field: FieldName, value: &FieldValue, full_mark: f64) -> bool {
        match (field, value) {
            (FieldName::TeacherMark, FieldValue::Mark(mark)) => self.inputs.teacher_mark = *mark,
            (FieldName::GradingNotes, FieldValue::Text(text)) => {
                self.inputs.grading_notes = text.clone()
            }
            (FieldName::LatePenaltyApplied, FieldValue::Flag(on)) => {
                self.inputs.is_late_submission = *on
            }
            (FieldName::CopyPenaltyApplied, FieldValue::Flag(on)) => {
                self.inputs.copy_penalty_applied = *on
            }
            _ => return false,
        }
        self.rederive(full_mark);
        true
    }

    fn rederive(&mut self, full_mark: f64) {
        self.final_mark = penalty::resolve(
            self.inputs.teacher_mark,
            full_mark,
            self.inputs.copy_penalty_applied,
            self.is_late(),
        );
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeStatus {
    NotGraded,
    Graded,
    NeedsReview,
}

impl GradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeStatus::NotGraded => "NOT_GRADED",
            GradeStatus::Graded => "GRADED",
            GradeStatus::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub present_count: u32,
    pub total_sessions: u32,
    pub attendance_percentage: f64,
}

impl AttendanceSummary {
    pub fn from_counts(present_count: u32, total_sessions: u32) -> Self {
        let attendance_percentage = if total_sessions > 0 {
            f64::from(present_count) / f64::from(total_sessions) * 100.0
        } else {
            0.0
        };
        Self {
            present_count,
            total_sessions,
            attendance_percentage,
        }
    }
}

/// Editable fields of an assessment record, named as on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    TeacherMark,
    GradingNotes,
    LatePenaltyApplied,
    CopyPenaltyApplied,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::TeacherMark => "teacherMark",
            FieldName::GradingNotes => "gradingNotes",
            FieldName::LatePenaltyApplied => "latePenaltyApplied",
            FieldName::CopyPenaltyApplied => "copyPenaltyApplied",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "teacherMark" => Some(FieldName::TeacherMark),
            "gradingNotes" => Some(FieldName::GradingNotes),
            "latePenaltyApplied" => Some(FieldName::LatePenaltyApplied),
            "copyPenaltyApplied" => Some(FieldName::CopyPenaltyApplied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Mark(Option<f64>),
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Mark(Some(mark)) => Value::from(*mark),
            FieldValue::Mark(None) => Value::Null,
            FieldValue::Text(text) => Value::from(text.as_str()),
            FieldValue::Flag(flag) => Value::from(*flag),
        }
    }
}

/// One independent debounce and save-status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub student_id: StudentId,
    pub assignment_id: AssignmentId,
    pub field: FieldName,
}

impl FieldKey {
    pub fn new(student_id: StudentId, assignment_id: AssignmentId, field: FieldName) -> Self {
        Self {
            student_id,
            assignment_id,
            field,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.student_id,
            self.assignment_id,
            self.field.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

impl SaveStatus {
    pub fn label(&self) -> Option<&'static str> {
        match self {
            SaveStatus::Idle => None,
            SaveStatus::Saving => Some("Saving..."),
            SaveStatus::Saved => Some("Saved"),
            SaveStatus::Error => Some("Error saving"),
        }
    }
}
