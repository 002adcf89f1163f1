use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod clock;
mod db;
mod eligibility;
mod error;
mod graduation;
mod models;
mod params;
mod seed;
mod semester;
mod specialization;
mod windows;

use clock::SystemClock;
use error::CoreError;
use models::{AdminContext, WindowKind};
use specialization::{Combination, Decision};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Parser)]
#[command(name = "registrar-progression")]
#[command(about = "Academic progression engine: windows, semester lifecycle, eligibility", long_about = None)]
struct Cli {
    /// Admin identity recorded on every mutating operation
    #[arg(long, global = true, default_value = "registrar")]
    admin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import the course catalog from a CSV file
    ImportCourses {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import historical course attempts from a CSV file
    ImportAttempts {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Manage registration, specialization and makeup windows
    Window {
        #[command(subcommand)]
        action: WindowAction,
    },
    /// Start or close a semester
    Semester {
        #[command(subcommand)]
        action: SemesterAction,
    },
    /// Resolve a student's registration eligibility
    Eligibility {
        #[arg(long)]
        student: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Submit or decide major/minor combinations
    Specialization {
        #[command(subcommand)]
        action: SpecializationAction,
    },
    /// Inspect or override progression thresholds
    Param {
        #[command(subcommand)]
        action: ParamAction,
    },
    /// Review probation board requests
    Probation {
        #[command(subcommand)]
        action: ProbationAction,
    },
}

#[derive(Subcommand)]
enum ProbationAction {
    /// List students awaiting a board extension decision
    List,
}

#[derive(Subcommand)]
enum WindowAction {
    /// Schedule or open a window; replaces any live window of the same kind
    Start {
        #[arg(long, value_parser = parse_kind)]
        kind: WindowKind,
        #[arg(long, value_parser = parse_timestamp)]
        start: DateTime<Utc>,
        #[arg(long, value_parser = parse_timestamp)]
        end: DateTime<Utc>,
    },
    /// Close the open window of this kind
    Close {
        #[arg(long, value_parser = parse_kind)]
        kind: WindowKind,
    },
    /// Cancel the scheduled window of this kind
    Cancel {
        #[arg(long, value_parser = parse_kind)]
        kind: WindowKind,
    },
    /// Report the current window state
    Status {
        #[arg(long, value_parser = parse_kind)]
        kind: WindowKind,
    },
}

#[derive(Subcommand)]
enum SemesterAction {
    Start,
    End,
}

#[derive(Subcommand)]
enum SpecializationAction {
    /// File a pending request for a student
    Submit {
        #[arg(long)]
        student: String,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        second_major: Option<String>,
        #[arg(long)]
        minor: Option<String>,
        #[arg(long)]
        second_minor: Option<String>,
    },
    /// Apply a decision to every request sharing the combination
    Decide {
        #[arg(long, value_parser = parse_decision)]
        decision: Decision,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        second_major: Option<String>,
        #[arg(long)]
        minor: Option<String>,
        #[arg(long)]
        second_minor: Option<String>,
    },
    /// Clear a recorded rejection so the combination may be resubmitted
    RemoveRejection {
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        second_major: Option<String>,
        #[arg(long)]
        minor: Option<String>,
        #[arg(long)]
        second_minor: Option<String>,
    },
}

#[derive(Subcommand)]
enum ParamAction {
    /// Set a system-wide threshold, or a per-student override with --student
    Set {
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: f64,
        #[arg(long)]
        student: Option<String>,
    },
    List,
}

fn parse_kind(raw: &str) -> Result<WindowKind, String> {
    WindowKind::parse(raw).ok_or_else(|| {
        format!("unknown window kind {raw}; expected registration, specialization or makeup")
    })
}

fn parse_decision(raw: &str) -> Result<Decision, String> {
    Decision::parse(raw)
        .ok_or_else(|| format!("unknown decision {raw}; expected accept, reject or pending"))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid timestamp {raw}; expected {TIMESTAMP_FORMAT}"))
}

fn report_core_error(err: &CoreError) {
    match err {
        CoreError::Precondition { message, blocking } => {
            eprintln!("Blocked: {message}");
            for entity in blocking {
                eprintln!(
                    "- student {} course {}: {:?}",
                    entity.student_id, entity.course_code, entity.issue
                );
            }
        }
        other => eprintln!("Error: {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AdminContext::new(cli.admin.clone());
    let clock = SystemClock;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    if let Err(err) = run(cli.command, &pool, &clock, &ctx).await {
        match err.downcast_ref::<CoreError>() {
            Some(core) => {
                report_core_error(core);
                std::process::exit(1);
            }
            None => return Err(err),
        }
    }
    Ok(())
}

async fn run(
    command: Commands,
    pool: &sqlx::PgPool,
    clock: &SystemClock,
    ctx: &AdminContext,
) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            seed::seed(pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportCourses { csv } => {
            let inserted = seed::import_courses_csv(pool, &csv).await?;
            println!("Inserted {inserted} courses from {}.", csv.display());
        }
        Commands::ImportAttempts { csv } => {
            let inserted = seed::import_attempts_csv(pool, &csv).await?;
            println!("Inserted {inserted} attempts from {}.", csv.display());
        }
        Commands::Window { action } => match action {
            WindowAction::Start { kind, start, end } => {
                let window = windows::start(pool, clock, ctx, kind, start, end).await?;
                println!(
                    "{} window {} ({} to {}).",
                    kind.as_str(),
                    window.status.as_str(),
                    window.start_at.format(TIMESTAMP_FORMAT),
                    window.end_at.format(TIMESTAMP_FORMAT),
                );
            }
            WindowAction::Close { kind } => {
                windows::close(pool, clock, ctx, kind).await?;
                println!("{} window closed.", kind.as_str());
            }
            WindowAction::Cancel { kind } => {
                windows::cancel(pool, clock, ctx, kind).await?;
                println!("Scheduled {} window cancelled.", kind.as_str());
            }
            WindowAction::Status { kind } => {
                let view = windows::status(pool, clock, kind).await?;
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        },
        Commands::Semester { action } => match action {
            SemesterAction::Start => {
                let report = semester::start_semester(pool, clock, ctx).await?;
                println!(
                    "Semester {}/{} started: {} summaries rolled, {} extension requests filed{}.",
                    report.slot.year,
                    report.slot.semester,
                    report.summaries_rolled,
                    report.extension_requests_created,
                    if report.years_promoted {
                        ", years promoted"
                    } else {
                        ""
                    },
                );
            }
            SemesterAction::End => {
                let report = semester::end_semester(pool, clock, ctx).await?;
                println!(
                    "Semester {}/{} closed: {} graduated, {} level changes.",
                    report.slot.year,
                    report.slot.semester,
                    report.graduated.len(),
                    report.level_changes.len(),
                );
                for code in &report.graduated {
                    println!("- graduated {code}");
                }
                for (code, level) in &report.level_changes {
                    println!("- {code} now {}", level.as_str());
                }
            }
        },
        Commands::Eligibility { student, json } => {
            let report = eligibility::resolve_for_student(pool, clock, &student).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Eligible: {}", report.eligible.join(", "));
                println!("Failed carry-over: {}", report.failed_carryover.join(", "));
                println!(
                    "Not-enrolled carry-over: {}",
                    report.not_enrolled_carryover.join(", ")
                );
                println!("Retake eligible: {}", report.retake_eligible.join(", "));
                for course in &report.ineligible {
                    println!("- {} blocked ({:?})", course.code, course.reason);
                }
                if !report.gpa_filtered_specializations.is_empty() {
                    println!(
                        "Specializations below minimum GPA: {}",
                        report.gpa_filtered_specializations.join(", ")
                    );
                }
                if report.credit_gate_applied {
                    println!("Credit gate applied: offering restricted to years 1-2.");
                }
            }
        }
        Commands::Specialization { action } => match action {
            SpecializationAction::Submit {
                student,
                major,
                second_major,
                minor,
                second_minor,
            } => {
                let combo = Combination::from_fields(
                    major.as_deref(),
                    second_major.as_deref(),
                    minor.as_deref(),
                    second_minor.as_deref(),
                )?;
                specialization::submit(pool, clock, &student, &combo).await?;
                println!("Request filed for {student}.");
            }
            SpecializationAction::Decide {
                decision,
                major,
                second_major,
                minor,
                second_minor,
            } => {
                let combo = Combination::from_fields(
                    major.as_deref(),
                    second_major.as_deref(),
                    minor.as_deref(),
                    second_minor.as_deref(),
                )?;
                let report = specialization::decide(pool, ctx, &combo, decision).await?;
                println!("Decision applied to {} student(s).", report.students_updated);
            }
            SpecializationAction::RemoveRejection {
                major,
                second_major,
                minor,
                second_minor,
            } => {
                let combo = Combination::from_fields(
                    major.as_deref(),
                    second_major.as_deref(),
                    minor.as_deref(),
                    second_minor.as_deref(),
                )?;
                let reopened = specialization::remove_rejection(pool, ctx, &combo).await?;
                println!("Rejection cleared; {reopened} request(s) reopened.");
            }
        },
        Commands::Param { action } => match action {
            ParamAction::Set {
                name,
                value,
                student,
            } => {
                let student_id = match student {
                    Some(code) => Some(
                        db::student_by_code(pool, &code)
                            .await?
                            .ok_or_else(|| {
                                CoreError::not_found(format!("no student with code {code}"))
                            })?
                            .id,
                    ),
                    None => None,
                };
                db::upsert_parameter(pool, &name, student_id, value).await?;
                println!("Parameter {name} set to {value}.");
            }
            ParamAction::List => {
                for row in db::all_parameter_rows(pool).await? {
                    match row.student_id {
                        Some(id) => println!("{} = {} (override for {id})", row.name, row.value),
                        None => println!("{} = {}", row.name, row.value),
                    }
                }
            }
        },
        Commands::Probation { action } => match action {
            ProbationAction::List => {
                let pending = db::pending_extension_requests(pool).await?;
                if pending.is_empty() {
                    println!("No pending extension requests.");
                }
                for (request, code) in pending {
                    println!(
                        "{code} {} since {}",
                        request.status.as_str(),
                        request.created_at.format(TIMESTAMP_FORMAT)
                    );
                }
            }
        },
    }

    Ok(())
}
