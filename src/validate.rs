//! Input checks applied before an edit enters the autosave pipeline.
use thiserror::Error;

use crate::model::{AssignmentId, FieldName, FieldValue, StudentId};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be a number, got {raw:?}")]
    NotNumeric { field: &'static str, raw: String },
    #[error("{field} must be between 0 and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        max: f64,
    },
    #[error("{field} expects a {expected} value")]
    WrongValueType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("no assessment record for student {student_id} and assignment {assignment_id}")]
    UnknownRecord {
        student_id: StudentId,
        assignment_id: AssignmentId,
    },
}

/// Parse raw UI input for `field`. An empty mark clears it.
pub fn parse_field(field: FieldName, raw: &str, full_mark: f64) -> Result<FieldValue, ValidationError> {
    let value = match field {
        FieldName::TeacherMark => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                FieldValue::Mark(None)
            } else {
                let mark: f64 = trimmed.parse().map_err(|_| ValidationError::NotNumeric {
                    field: field.as_str(),
                    raw: raw.to_string(),
                })?;
                FieldValue::Mark(Some(mark))
            }
        }
        FieldName::GradingNotes => FieldValue::Text(raw.to_string()),
        FieldName::LatePenaltyApplied | FieldName::CopyPenaltyApplied => {
            match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => FieldValue::Flag(true),
                "false" | "0" | "no" | "off" => FieldValue::Flag(false),
                _ => {
                    return Err(ValidationError::WrongValueType {
                        field: field.as_str(),
                        expected: "boolean",
                    })
                }
            }
        }
    };
    check_value(field, &value, full_mark)?;
    Ok(value)
}

/// Check an already-typed value against `field`.
pub fn check_value(field: FieldName, value: &FieldValue, full_mark: f64) -> Result<(), ValidationError> {
    match (field, value) {
        (FieldName::TeacherMark, FieldValue::Mark(None)) => Ok(()),
        (FieldName::TeacherMark, FieldValue::Mark(Some(mark))) => {
            if !mark.is_finite() {
                return Err(ValidationError::NotNumeric {
                    field: field.as_str(),
                    raw: mark.to_string(),
                });
            }
            if *mark < 0.0 || *mark > full_mark {
                return Err(ValidationError::OutOfRange {
                    field: field.as_str(),
                    value: *mark,
                    max: full_mark,
                });
            }
            Ok(())
        }
        (FieldName::TeacherMark, _) => Err(ValidationError::WrongValueType {
            field: field.as_str(),
            expected: "numeric",
        }),
        (FieldName::GradingNotes, FieldValue::Text(_)) => Ok(()),
        (FieldName::GradingNotes, _) => Err(ValidationError::WrongValueType {
            field: field.as_str(),
            expected: "text",
        }),
        (FieldName::LatePenaltyApplied | FieldName::CopyPenaltyApplied, FieldValue::Flag(_)) => Ok(()),
        (FieldName::LatePenaltyApplied | FieldName::CopyPenaltyApplied, _) => {
            Err(ValidationError::WrongValueType {
                field: field.as_str(),
                expected: "boolean",
            })
        }
    }
}
