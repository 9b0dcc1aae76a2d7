use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use gradesync::aggregate::{AssignmentGrade, StudentReport};
use gradesync::autosave::StatusEvent;
use gradesync::config;
use gradesync::course_ops::{self, BannerKind};
use gradesync::grading::{CsvUpload, GradingClient, GradingService};
use gradesync::model::{FieldKey, FieldName, SaveStatus};
use gradesync::session::{self, GradingSession};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "gradesync.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the assessment grid with derived final marks and totals
    Grid {
        #[arg(long)]
        course: i64,
        /// Only show students matching this term
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Print a student's grade summary as the student sees it
    Summary {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        course: i64,
    },
    /// Edit one field through the autosave pipeline and wait for the result
    Set {
        #[arg(long)]
        course: i64,
        #[arg(long)]
        student: i64,
        #[arg(long)]
        assignment: i64,
        /// teacherMark, gradingNotes, latePenaltyApplied or copyPenaltyApplied
        #[arg(long)]
        field: String,
        #[arg(long)]
        value: String,
    },
    /// Upload a copy-checker CSV and apply penalties after confirmation
    CopyCheck {
        #[arg(long)]
        course: i64,
        #[arg(long)]
        assignment: i64,
        #[arg(long)]
        csv: PathBuf,
        /// Apply without asking
        #[arg(long)]
        yes: bool,
    },
    /// Recompute late penalties on the server and reload the grid
    LatePenalties {
        #[arg(long)]
        course: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(args.config.as_path()))?;
    let service: Arc<dyn GradingService> = Arc::new(GradingClient::from_config(&cfg)?);

    match args.command {
        Command::Grid { course, search } => {
            let session = GradingSession::open(service, course, cfg.autosave.clone()).await?;
            print_grid(&session, &search);
        }
        Command::Summary { student, course } => {
            let report = session::student_report(service.as_ref(), student, course).await?;
            print_report(&report);
        }
        Command::Set {
            course,
            student,
            assignment,
            field,
            value,
        } => {
            let field = FieldName::parse(&field).ok_or_else(|| anyhow!("unknown field {}", field))?;
            let session = GradingSession::open(service, course, cfg.autosave.clone()).await?;
            let mut events = session.subscribe();
            session.edit_raw(student, assignment, field, &value)?;

            let key = FieldKey::new(student, assignment, field);
            let wait = cfg.autosave.debounce() + Duration::from_secs(30);
            let status = tokio::time::timeout(wait, wait_for_result(&mut events, key))
                .await
                .unwrap_or(SaveStatus::Saving);
            session.teardown();
            match status {
                SaveStatus::Saved => info!(%key, "saved"),
                SaveStatus::Error => return Err(anyhow!("saving {} failed", key)),
                other => warn!(%key, ?other, "no result before timeout"),
            }
            let grid = session.grid();
            if let Some(record) = grid.record(student, assignment) {
                println!(
                    "teacherMark={} finalMark={} ({}) status={}",
                    fmt_mark(record.teacher_mark()),
                    fmt_mark(record.final_mark()),
                    grid.obtained_percentage(student, assignment)
                        .map(|p| format!("{:.1}%", p))
                        .unwrap_or_else(|| "n/a".into()),
                    record.grade_status().as_str()
                );
            }
        }
        Command::CopyCheck {
            course,
            assignment,
            csv,
            yes,
        } => {
            let content = tokio::fs::read(&csv).await?;
            let file_name = csv
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("copy_checker.csv")
                .to_string();
            let upload = CsvUpload { file_name, content };
            let session = GradingSession::open(service, course, cfg.autosave.clone()).await?;
            let confirm = move |prompt: &str| yes || ask(prompt);
            let banner = course_ops::copy_check(&session, assignment, &upload, &confirm).await;
            println!("{}", banner.message);
            if banner.kind == BannerKind::Error {
                std::process::exit(1);
            }
        }
        Command::LatePenalties { course } => {
            let session = GradingSession::open(service, course, cfg.autosave.clone()).await?;
            let banner = course_ops::late_penalties(&session).await;
            println!("{}", banner.message);
            if banner.kind == BannerKind::Error {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn wait_for_result(
    events: &mut tokio::sync::broadcast::Receiver<StatusEvent>,
    key: FieldKey,
) -> SaveStatus {
    loop {
        match events.recv().await {
            Ok(event) if event.key == key && event.status != SaveStatus::Saving => {
                return event.status
            }
            Ok(_) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return SaveStatus::Idle,
        }
    }
}

fn ask(prompt: &str) -> bool {
    println!("{}", prompt);
    print!("[y/N] ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn fmt_mark(mark: Option<f64>) -> String {
    mark.map(|m| format!("{:.2}", m)).unwrap_or_else(|| "-".into())
}

fn print_grid(session: &GradingSession, search: &str) {
    let mut grid = session.grid();
    let students = grid.filtered_students(search).to_vec();
    let header: Vec<String> = grid
        .assignments()
        .iter()
        .map(|a| format!("{} (/{})", a.title, a.full_mark))
        .collect();
    println!("student\t{}\ttotal", header.join("\t"));
    for student_id in students {
        let name = grid
            .student(student_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let cells: Vec<String> = grid
            .row_for(student_id)
            .into_iter()
            .map(|(_, record)| fmt_mark(record.and_then(|r| r.final_mark())))
            .collect();
        let totals = gradesync::aggregate::grid_total(&grid, student_id);
        println!(
            "{}\t{}\t{}/{} ({})",
            name,
            cells.join("\t"),
            fmt_mark(Some(totals.obtained)),
            totals.possible,
            totals
                .percentage
                .map(|p| format!("{:.1}%", p))
                .unwrap_or_else(|| "n/a".into())
        );
    }
}

fn print_report(report: &StudentReport) {
    for line in &report.lines {
        let shown = match &line.grade {
            AssignmentGrade::Hidden => "pending".to_string(),
            AssignmentGrade::NotGraded => "not graded".to_string(),
            AssignmentGrade::Graded {
                final_mark,
                percentage,
                tier,
                band,
            } => match (percentage, band) {
                (Some(p), Some(b)) => format!(
                    "{:.2}/{} {} ({:.1}%) GPA {:.2} [{}]",
                    final_mark,
                    line.full_mark,
                    b.letter,
                    p,
                    b.gpa,
                    tier.as_str()
                ),
                _ => format!("{:.2}/{} [{}]", final_mark, line.full_mark, tier.as_str()),
            },
        };
        println!("{}\t{}", line.title, shown);
    }
    println!(
        "attendance {:.1}% ({}/{}) = {}/30 marks",
        report.attendance.attendance_percentage,
        report.attendance.present_count,
        report.attendance.total_sessions,
        report.overall.attendance_marks
    );
    println!(
        "overall {:.1}% {} GPA {:.2} ({}/{} graded)",
        report.overall.percentage,
        report.overall.letter,
        report.overall.gpa,
        report.totals.graded_count,
        report.totals.total_count
    );
}
