//! A teacher's grading session for one course: the grid, its autosave
//! pipeline, and the service both talk to.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::aggregate::{self, CourseTotals, StudentReport};
use crate::autosave::{AutosaveCoordinator, EditError, StatusEvent};
use crate::config::Autosave;
use crate::grading::GradingService;
use crate::grid::GridModel;
use crate::model::{AssignmentId, CourseId, FieldKey, FieldName, FieldValue, SaveStatus, StudentId};
use crate::validate::{self, ValidationError};

pub struct GradingSession {
    course_id: CourseId,
    service: Arc<dyn GradingService>,
    grid: Arc<Mutex<GridModel>>,
    autosave: AutosaveCoordinator,
}

impl GradingSession {
    /// Session with an empty grid. Call [`GradingSession::refetch`] to load it.
    pub fn new(service: Arc<dyn GradingService>, course_id: CourseId, settings: Autosave) -> Self {
        let grid = Arc::new(Mutex::new(GridModel::default()));
        let autosave =
            AutosaveCoordinator::new(Arc::clone(&service), Arc::clone(&grid), course_id, settings);
        Self {
            course_id,
            service,
            grid,
            autosave,
        }
    }

    pub async fn open(
        service: Arc<dyn GradingService>,
        course_id: CourseId,
        settings: Autosave,
    ) -> Result<Self> {
        let session = Self::new(service, course_id, settings);
        session.refetch().await?;
        Ok(session)
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn service(&self) -> &Arc<dyn GradingService> {
        &self.service
    }

    /// Current grid. Do not hold the guard across an `.await`.
    pub fn grid(&self) -> MutexGuard<'_, GridModel> {
        self.grid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the grid with the server's copy. On failure the grid is left
    /// as it was.
    #[instrument(skip_all, fields(course_id = self.course_id))]
    pub async fn refetch(&self) -> Result<()> {
        let rows = self
            .service
            .fetch_grid(self.course_id)
            .await
            .context("failed to fetch assessment grid")?;
        let fresh = GridModel::from_rows(&rows);
        self.grid().replace_with(fresh);
        self.autosave.forget_settled();
        info!(rows = rows.len(), "grid refreshed");
        Ok(())
    }

    pub fn edit(
        &self,
        student_id: StudentId,
        assignment_id: AssignmentId,
        field: FieldName,
        value: FieldValue,
    ) -> Result<(), EditError> {
        self.autosave
            .edit(FieldKey::new(student_id, assignment_id, field), value)
    }

    /// Parse raw input the way the grid cell would and feed it to
    /// [`GradingSession::edit`].
    pub fn edit_raw(
        &self,
        student_id: StudentId,
        assignment_id: AssignmentId,
        field: FieldName,
        raw: &str,
    ) -> Result<(), EditError> {
        let full_mark = self
            .grid()
            .assignment(assignment_id)
            .map(|a| a.full_mark)
            .ok_or(ValidationError::UnknownRecord {
                student_id,
                assignment_id,
            })?;
        let value = validate::parse_field(field, raw, full_mark)?;
        self.edit(student_id, assignment_id, field, value)
    }

    pub fn status(&self, key: &FieldKey) -> SaveStatus {
        self.autosave.status(key)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.autosave.subscribe()
    }

    pub fn autosave(&self) -> &AutosaveCoordinator {
        &self.autosave
    }

    pub fn totals(&self, student_id: StudentId) -> CourseTotals {
        aggregate::grid_total(&self.grid(), student_id)
    }

    /// Stop all pending and running writes.
    pub fn teardown(&self) {
        self.autosave.cancel_all();
    }
}

/// Fetch and summarise one student's grades for a course.
pub async fn student_report(
    service: &dyn GradingService,
    student_id: StudentId,
    course_id: CourseId,
) -> Result<StudentReport> {
    let sheet = service
        .fetch_student_grades(student_id, course_id)
        .await
        .context("failed to fetch student grades")?;
    Ok(aggregate::student_report(&sheet))
}
