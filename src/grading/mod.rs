use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::model::{AssignmentId, CourseId, StudentId};

pub mod model;

pub use model::{
    AssessmentRow, CopyCheckReport, CsvUpload, FieldPatch, GradeSheetEntry, StudentGradeSheet,
};

/// The backend that owns assessment data. Writes must be idempotent: sending
/// the same patch twice is harmless.
#[async_trait]
pub trait GradingService: Send + Sync {
    async fn fetch_grid(&self, course_id: CourseId) -> Result<Vec<AssessmentRow>>;

    async fn patch_field(&self, patch: &FieldPatch) -> Result<()>;

    /// Dry run: reports who would be flagged, changes nothing.
    async fn debug_copy_checker(
        &self,
        assignment_id: AssignmentId,
        csv: &CsvUpload,
    ) -> Result<CopyCheckReport>;

    async fn apply_copy_checker(&self, assignment_id: AssignmentId, csv: &CsvUpload) -> Result<()>;

    async fn update_late_penalties(&self, course_id: CourseId) -> Result<()>;

    async fn fetch_student_grades(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<StudentGradeSheet>;
}

#[derive(Clone)]
pub struct GradingClient {
    http: Client,
    base_url: Url,
    token: String,
    teacher_id: i64,
}

impl fmt::Debug for GradingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingClient")
            .field("base_url", &self.base_url)
            .field("teacher_id", &self.teacher_id)
            .finish_non_exhaustive()
    }
}

impl GradingClient {
    pub fn new(base_url: Url, token: String, teacher_id: i64) -> Self {
        let http = Client::builder()
            .user_agent("gradesync/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            teacher_id,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = cfg.base_url()?;
        Ok(Self::new(
            base_url,
            cfg.service.token.clone(),
            cfg.service.teacher_id,
        ))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path {}", path))?;
        url.query_pairs_mut()
            .append_pair("teacherId", &self.teacher_id.to_string());
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    pub fn build_patch_request(&self, patch: &FieldPatch) -> Result<reqwest::Request> {
        let url = self.endpoint("assessment-grid/assessment")?;
        self.request(Method::PUT, url)
            .json(&build_patch_body(patch))
            .build()
            .context("failed to build patch request")
    }

    fn csv_form(csv: &CsvUpload) -> Result<reqwest::multipart::Form> {
        let part = reqwest::multipart::Part::bytes(csv.content.clone())
            .file_name(csv.file_name.clone())
            .mime_str("text/csv")?;
        Ok(reqwest::multipart::Form::new().part("file", part))
    }

    async fn execute(&self, request: reqwest::Request) -> Result<Response> {
        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!(%method, %path, "grading request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach grading service for {} {}", method, path))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%method, %path, %status, "grading service error");
            return Err(anyhow!("grading service error {}: {}", status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl GradingService for GradingClient {
    #[instrument(skip_all, fields(course_id = %course_id))]
    async fn fetch_grid(&self, course_id: CourseId) -> Result<Vec<AssessmentRow>> {
        let url = self.endpoint(&format!("assessment-grid/course/{}", course_id))?;
        let request = self.request(Method::GET, url).build()?;
        let res = self.execute(request).await?;
        let rows: Vec<AssessmentRow> = res.json().await.context("invalid grid response JSON")?;
        info!(rows = rows.len(), "fetched assessment grid");
        Ok(rows)
    }

    #[instrument(skip_all, fields(student_id = patch.student_id, assignment_id = patch.assignment_id, field = patch.field.as_str()))]
    async fn patch_field(&self, patch: &FieldPatch) -> Result<()> {
        let request = self.build_patch_request(patch)?;
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(assignment_id = %assignment_id))]
    async fn debug_copy_checker(
        &self,
        assignment_id: AssignmentId,
        csv: &CsvUpload,
    ) -> Result<CopyCheckReport> {
        let url = self.endpoint(&format!("assessment-grid/debug-copy-checker/{}", assignment_id))?;
        let request = self
            .request(Method::POST, url)
            .multipart(Self::csv_form(csv)?)
            .build()?;
        let res = self.execute(request).await?;
        res.json().await.context("invalid copy checker report JSON")
    }

    #[instrument(skip_all, fields(assignment_id = %assignment_id))]
    async fn apply_copy_checker(&self, assignment_id: AssignmentId, csv: &CsvUpload) -> Result<()> {
        let url = self.endpoint(&format!("assessment-grid/copy-checker/{}", assignment_id))?;
        let request = self
            .request(Method::POST, url)
            .multipart(Self::csv_form(csv)?)
            .build()?;
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(course_id = %course_id))]
    async fn update_late_penalties(&self, course_id: CourseId) -> Result<()> {
        let url = self.endpoint(&format!("assessment-grid/update-late-penalties/{}", course_id))?;
        let request = self.request(Method::POST, url).build()?;
        self.execute(request).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(student_id = %student_id, course_id = %course_id))]
    async fn fetch_student_grades(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<StudentGradeSheet> {
        let url = self
            .base_url
            .join(&format!("grades/student/{}/course/{}", student_id, course_id))?;
        let request = self.request(Method::GET, url).build()?;
        let res = self.execute(request).await?;
        res.json().await.context("invalid grade sheet JSON")
    }
}

/// `{courseId, assignmentId, studentId, <field>: value}`
pub fn build_patch_body(patch: &FieldPatch) -> Value {
    let mut body = Map::new();
    body.insert("courseId".into(), Value::from(patch.course_id));
    body.insert("assignmentId".into(), Value::from(patch.assignment_id));
    body.insert("studentId".into(), Value::from(patch.student_id));
    body.insert(patch.field.as_str().into(), patch.value.to_json());
    Value::Object(body)
}
