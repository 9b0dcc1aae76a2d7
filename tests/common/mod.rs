#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use gradesync::grading::{
    AssessmentRow, CopyCheckReport, CsvUpload, FieldPatch, GradingService, StudentGradeSheet,
};
use gradesync::model::{AssignmentId, CourseId, StudentId};

pub const COURSE: CourseId = 3;

#[derive(Clone, Default)]
pub struct RecordingGrading {
    rows: Arc<Mutex<Vec<AssessmentRow>>>,
    fetches: Arc<Mutex<usize>>,
    fail_fetch: Arc<Mutex<bool>>,
    patches: Arc<Mutex<Vec<FieldPatch>>>,
    patch_results: Arc<Mutex<VecDeque<Result<()>>>>,
    patch_delays: Arc<Mutex<VecDeque<Duration>>>,
    debug_reports: Arc<Mutex<VecDeque<Result<CopyCheckReport>>>>,
    debug_calls: Arc<Mutex<Vec<(AssignmentId, String)>>>,
    apply_results: Arc<Mutex<VecDeque<Result<()>>>>,
    apply_calls: Arc<Mutex<Vec<AssignmentId>>>,
    late_results: Arc<Mutex<VecDeque<Result<()>>>>,
    late_calls: Arc<Mutex<Vec<CourseId>>>,
    sheet: Arc<Mutex<StudentGradeSheet>>,
}

impl RecordingGrading {
    pub fn with_rows(rows: Vec<AssessmentRow>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            ..Default::default()
        }
    }

    pub async fn set_rows(&self, rows: Vec<AssessmentRow>) {
        *self.rows.lock().await = rows;
    }

    pub async fn fail_fetches(&self) {
        *self.fail_fetch.lock().await = true;
    }

    pub async fn push_patch_result(&self, result: Result<()>) {
        self.patch_results.lock().await.push_back(result);
    }

    pub async fn push_patch_delay(&self, delay: Duration) {
        self.patch_delays.lock().await.push_back(delay);
    }

    pub async fn push_debug_report(&self, report: Result<CopyCheckReport>) {
        self.debug_reports.lock().await.push_back(report);
    }

    pub async fn push_apply_result(&self, result: Result<()>) {
        self.apply_results.lock().await.push_back(result);
    }

    pub async fn push_late_result(&self, result: Result<()>) {
        self.late_results.lock().await.push_back(result);
    }

    pub async fn set_sheet(&self, sheet: StudentGradeSheet) {
        *self.sheet.lock().await = sheet;
    }

    pub async fn fetches(&self) -> usize {
        *self.fetches.lock().await
    }

    pub async fn patches(&self) -> Vec<FieldPatch> {
        self.patches.lock().await.clone()
    }

    pub async fn debug_calls(&self) -> Vec<(AssignmentId, String)> {
        self.debug_calls.lock().await.clone()
    }

    pub async fn apply_calls(&self) -> Vec<AssignmentId> {
        self.apply_calls.lock().await.clone()
    }

    pub async fn late_calls(&self) -> Vec<CourseId> {
        self.late_calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl GradingService for RecordingGrading {
    async fn fetch_grid(&self, _course_id: CourseId) -> Result<Vec<AssessmentRow>> {
        *self.fetches.lock().await += 1;
        if *self.fail_fetch.lock().await {
            return Err(anyhow!("grid unavailable"));
        }
        Ok(self.rows.lock().await.clone())
    }

    async fn patch_field(&self, patch: &FieldPatch) -> Result<()> {
        self.patches.lock().await.push(patch.clone());
        let result = self.patch_results.lock().await.pop_front().unwrap_or(Ok(()));
        let delay = self.patch_delays.lock().await.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn debug_copy_checker(
        &self,
        assignment_id: AssignmentId,
        csv: &CsvUpload,
    ) -> Result<CopyCheckReport> {
        self.debug_calls
            .lock()
            .await
            .push((assignment_id, csv.file_name.clone()));
        self.debug_reports
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(CopyCheckReport::default()))
    }

    async fn apply_copy_checker(&self, assignment_id: AssignmentId, _csv: &CsvUpload) -> Result<()> {
        self.apply_calls.lock().await.push(assignment_id);
        self.apply_results.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn update_late_penalties(&self, course_id: CourseId) -> Result<()> {
        self.late_calls.lock().await.push(course_id);
        self.late_results.lock().await.pop_front().unwrap_or(Ok(()))
    }

    async fn fetch_student_grades(
        &self,
        _student_id: StudentId,
        course_id: CourseId,
    ) -> Result<StudentGradeSheet> {
        let mut sheet = self.sheet.lock().await.clone();
        sheet.course_id = course_id;
        Ok(sheet)
    }
}

pub fn row(student: StudentId, assignment: AssignmentId, mark: Option<f64>) -> AssessmentRow {
    AssessmentRow {
        assignment_id: assignment,
        assignment_title: format!("Assignment {}", assignment),
        max_marks: 100.0,
        student_id: student,
        student_name: format!("Student {}", student),
        student_email: format!("s{}@uni.edu", student),
        teacher_mark: mark,
        ..Default::default()
    }
}

pub fn csv() -> CsvUpload {
    CsvUpload {
        file_name: "copies.csv".into(),
        content: b"email\ns1@uni.edu\n".to_vec(),
    }
}
