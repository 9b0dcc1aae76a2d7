//! Course-wide actions that go around the autosave pipeline: copy-checker
//! penalties and the late-penalty batch recompute. Both end with a refetch,
//! and both report through a transient [`Banner`].

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::grading::{CopyCheckReport, CsvUpload};
use crate::model::AssignmentId;
use crate::session::GradingSession;

/// How many flagged identifiers the confirmation prompt lists.
const PROMPT_PREVIEW_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

impl Banner {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Error,
            message: message.into(),
        }
    }
}

/// Asks the user to approve an irreversible action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyCheckOutcome {
    NothingFlagged,
    Cancelled { flagged: usize },
    Applied { flagged: usize },
    /// Penalties are on the server but the grid still shows the old data.
    AppliedReloadFailed { flagged: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatePenaltyOutcome {
    Updated,
    UpdatedReloadFailed { reason: String },
}

/// Reload after a server-side change that already happened. A failure here
/// must not be reported as a failure of the change itself.
async fn reload_after_change(session: &GradingSession) -> Option<String> {
    match session.refetch().await {
        Ok(()) => None,
        Err(err) => {
            warn!(?err, "grid reload failed after server-side change");
            Some(format!("{:#}", err))
        }
    }
}

pub fn confirmation_prompt(report: &CopyCheckReport) -> String {
    let mut listed = report
        .flagged_identifiers
        .iter()
        .take(PROMPT_PREVIEW_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if report.flagged_identifiers.len() > PROMPT_PREVIEW_LIMIT {
        listed.push_str("...");
    }
    format!(
        "Found {} flagged student(s): {}\n\nDo you want to apply copy penalties to these students?",
        report.total_flagged, listed
    )
}

/// Dry run, confirm, apply, refetch. The apply endpoint is never called
/// unless the dry run flagged someone and the user agreed.
#[instrument(skip_all, fields(assignment_id = %assignment_id))]
pub async fn run_copy_check(
    session: &GradingSession,
    assignment_id: AssignmentId,
    csv: &CsvUpload,
    confirm: &dyn Confirm,
) -> Result<CopyCheckOutcome> {
    let report = session
        .service()
        .debug_copy_checker(assignment_id, csv)
        .await
        .context("copy checker dry run failed")?;
    info!(total_flagged = report.total_flagged, "copy checker dry run");

    if report.total_flagged == 0 {
        return Ok(CopyCheckOutcome::NothingFlagged);
    }
    if !confirm.confirm(&confirmation_prompt(&report)) {
        return Ok(CopyCheckOutcome::Cancelled {
            flagged: report.total_flagged,
        });
    }

    session
        .service()
        .apply_copy_checker(assignment_id, csv)
        .await
        .context("applying copy penalties failed")?;
    let flagged = report.total_flagged;
    info!(flagged, "copy penalties applied");
    Ok(match reload_after_change(session).await {
        None => CopyCheckOutcome::Applied { flagged },
        Some(reason) => CopyCheckOutcome::AppliedReloadFailed { flagged, reason },
    })
}

pub async fn copy_check(
    session: &GradingSession,
    assignment_id: AssignmentId,
    csv: &CsvUpload,
    confirm: &dyn Confirm,
) -> Banner {
    match run_copy_check(session, assignment_id, csv, confirm).await {
        Ok(CopyCheckOutcome::NothingFlagged) => Banner::error(
            "No students were flagged for copying in this CSV file. Please check the file format.",
        ),
        Ok(CopyCheckOutcome::Cancelled { .. }) => Banner::info("Copy checker upload cancelled"),
        Ok(CopyCheckOutcome::Applied { flagged }) => Banner::success(format!(
            "Copy checker processed successfully. {} student(s) flagged for copying and penalties applied.",
            flagged
        )),
        Ok(CopyCheckOutcome::AppliedReloadFailed { flagged, reason }) => Banner::error(format!(
            "Copy penalties applied to {} student(s), but reloading the grid failed: {}",
            flagged, reason
        )),
        Err(err) => {
            warn!(?err, "copy checker failed");
            Banner::error(format!("Error uploading copy checker: {:#}", err))
        }
    }
}

/// Ask the server to re-derive late penalties, then reload the grid rather
/// than trusting local derived values.
#[instrument(skip_all, fields(course_id = session.course_id()))]
pub async fn recompute_late_penalties(session: &GradingSession) -> Result<LatePenaltyOutcome> {
    session
        .service()
        .update_late_penalties(session.course_id())
        .await
        .context("late penalty recompute failed")?;
    Ok(match reload_after_change(session).await {
        None => LatePenaltyOutcome::Updated,
        Some(reason) => LatePenaltyOutcome::UpdatedReloadFailed { reason },
    })
}

pub async fn late_penalties(session: &GradingSession) -> Banner {
    match recompute_late_penalties(session).await {
        Ok(LatePenaltyOutcome::Updated) => Banner::success("Late penalties updated successfully"),
        Ok(LatePenaltyOutcome::UpdatedReloadFailed { reason }) => Banner::error(format!(
            "Late penalties updated, but reloading the grid failed: {}",
            reason
        )),
        Err(err) => {
            warn!(?err, "late penalty update failed");
            Banner::error(format!("Error updating late penalties: {:#}", err))
        }
    }
}
