//! In-memory assessment grid: students x assignments, one record per cell.
//!
//! The grid is the only copy of the data. Filtered views are derived from it
//! on demand and cached against the grid revision, so an edit can never land
//! in one copy and miss another.

use std::collections::HashMap;
use tracing::debug;

use crate::grading::AssessmentRow;
use crate::model::{
    Assignment, AssessmentRecord, AssignmentId, FieldKey, FieldValue, RecordInputs, Student,
    StudentId,
};
use crate::penalty;
use crate::validate::{self, ValidationError};

#[derive(Debug, Clone, PartialEq)]
struct FilteredView {
    term: String,
    revision: u64,
    students: Vec<StudentId>,
}

#[derive(Debug, Clone, Default)]
pub struct GridModel {
    assignments: Vec<Assignment>,
    students: Vec<Student>,
    records: HashMap<(StudentId, AssignmentId), AssessmentRecord>,
    revision: u64,
    view: Option<FilteredView>,
}

impl GridModel {
    /// Group flattened rows into a grid. Assignments and students keep the
    /// order in which they first appear.
    pub fn from_rows(rows: &[AssessmentRow]) -> Self {
        let mut grid = GridModel::default();
        for row in rows {
            if grid.assignment(row.assignment_id).is_none() {
                grid.assignments.push(Assignment {
                    id: row.assignment_id,
                    title: row.assignment_title.clone(),
                    full_mark: row.max_marks,
                    deadline: row.assignment_deadline,
                    late_submission_deadline: row.late_submission_deadline,
                    grades_visible: row.grades_visible.unwrap_or(false),
                });
            }
            if grid.student(row.student_id).is_none() {
                grid.students.push(Student {
                    id: row.student_id,
                    name: row.student_name.clone(),
                    email: row.student_email.clone(),
                });
            }

            let inputs = RecordInputs {
                teacher_mark: row.teacher_mark,
                grading_notes: row.grading_notes.clone().unwrap_or_default(),
                submission_status: row.submission_status.unwrap_or_default(),
                is_late_submission: row.is_late_submission.unwrap_or(false),
                copy_penalty_applied: row.copy_penalty_applied.unwrap_or(false),
                is_processed: row.is_processed.unwrap_or(false),
            };
            let record = AssessmentRecord::new(row.student_id, row.assignment_id, inputs, row.max_marks);
            if row.final_mark.is_some() && row.final_mark != record.final_mark() {
                debug!(
                    student_id = row.student_id,
                    assignment_id = row.assignment_id,
                    server = ?row.final_mark,
                    derived = ?record.final_mark(),
                    "server final mark differs from derived value"
                );
            }
            grid.records.insert((row.student_id, row.assignment_id), record);
        }
        grid
    }

    /// Replace the whole grid after a refetch. Unconfirmed local edits are
    /// overwritten.
    pub fn replace_with(&mut self, fresh: GridModel) {
        let revision = self.revision + 1;
        *self = fresh;
        self.revision = revision;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn assignment(&self, id: AssignmentId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id == id)
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, id: StudentId) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn record(&self, student_id: StudentId, assignment_id: AssignmentId) -> Option<&AssessmentRecord> {
        self.records.get(&(student_id, assignment_id))
    }

    /// Final mark as a share of the assignment's full mark.
    pub fn obtained_percentage(&self, student_id: StudentId, assignment_id: AssignmentId) -> Option<f64> {
        let full_mark = self.assignment(assignment_id)?.full_mark;
        let final_mark = self.record(student_id, assignment_id)?.final_mark()?;
        penalty::percentage(final_mark, full_mark)
    }

    /// Every assignment of the course paired with the student's record, if any.
    pub fn row_for(&self, student_id: StudentId) -> Vec<(&Assignment, Option<&AssessmentRecord>)> {
        self.assignments
            .iter()
            .map(|a| (a, self.records.get(&(student_id, a.id))))
            .collect()
    }

    /// Optimistic single-field write. The dependent final mark is recomputed
    /// in the same call, before anything is sent to the server.
    pub fn apply_edit(&mut self, key: FieldKey, value: &FieldValue) -> Result<(), ValidationError> {
        let unknown = ValidationError::UnknownRecord {
            student_id: key.student_id,
            assignment_id: key.assignment_id,
        };
        let full_mark = self
            .assignment(key.assignment_id)
            .map(|a| a.full_mark)
            .ok_or_else(|| unknown.clone())?;
        validate::check_value(key.field, value, full_mark)?;
        let record = self
            .records
            .get_mut(&(key.student_id, key.assignment_id))
            .ok_or(unknown)?;
        if !record.apply(key.field, value, full_mark) {
            return Err(ValidationError::WrongValueType {
                field: key.field.as_str(),
                expected: "matching",
            });
        }
        self.revision += 1;
        Ok(())
    }

    /// Students matching `term` (case-insensitive) by name, email, any
    /// assignment title, or the submission status of one of their records.
    /// An empty term matches everyone. Cached until the grid changes.
    pub fn filtered_students(&mut self, term: &str) -> &[StudentId] {
        let term = term.trim().to_lowercase();
        let fresh = match &self.view {
            Some(view) => view.term != term || view.revision != self.revision,
            None => true,
        };
        if fresh {
            let students = self.compute_filter(&term);
            self.view = Some(FilteredView {
                term,
                revision: self.revision,
                students,
            });
        }
        match &self.view {
            Some(view) => &view.students,
            None => &[],
        }
    }

    fn compute_filter(&self, term: &str) -> Vec<StudentId> {
        if term.is_empty() {
            return self.students.iter().map(|s| s.id).collect();
        }
        let title_hit = self
            .assignments
            .iter()
            .any(|a| a.title.to_lowercase().contains(term));
        self.students
            .iter()
            .filter(|s| {
                title_hit
                    || s.name.to_lowercase().contains(term)
                    || s.email.to_lowercase().contains(term)
                    || self.assignments.iter().any(|a| {
                        self.record(s.id, a.id)
                            .map(|r| r.submission_status().as_str().to_lowercase().contains(term))
                            .unwrap_or(false)
                    })
            })
            .map(|s| s.id)
            .collect()
    }
}
