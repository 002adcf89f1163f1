use std::collections::HashMap;

use chrono::Datelike;
use sqlx::PgPool;
use tracing::info;

use crate::clock::Clock;
use crate::db;
use crate::error::{BlockingEntity, BlockingIssue, CoreError, CoreResult};
use crate::graduation;
use crate::models::{
    AdminContext, AttemptStatus, CalendarSlot, CourseAttempt, SemesterSummary, Student,
    StudentLevel, WindowKind, WindowStatus, SEMESTER_FALL, SEMESTER_SPRING,
};
use crate::params::EffectiveParams;

/// Next (year, semester) pair after `latest`. Fall rolls to spring of the
/// same year, spring rolls to fall of the next; the very first semester is
/// fall of the current calendar year.
pub fn next_slot(latest: Option<CalendarSlot>, current_year: i32) -> CalendarSlot {
    match latest {
        None => CalendarSlot {
            year: current_year,
            semester: SEMESTER_FALL,
        },
        Some(slot) if slot.semester == SEMESTER_FALL => CalendarSlot {
            year: slot.year,
            semester: SEMESTER_SPRING,
        },
        Some(slot) => CalendarSlot {
            year: slot.year + 1,
            semester: SEMESTER_FALL,
        },
    }
}

/// Rolls a student's summary forward into `slot`. Credits, GPA, track GPAs
/// and the forgiveness counter carry unchanged; the probation counter
/// increments while the carried GPA sits below `min_gpa` and resets to zero
/// the moment it recovers.
pub fn roll_summary(
    prior: Option<&SemesterSummary>,
    student: &Student,
    slot: CalendarSlot,
    min_gpa: f64,
) -> SemesterSummary {
    let (credits, gpa, spec_gpas, probation, forgiveness) = match prior {
        Some(p) => (
            p.cumulative_credits,
            p.cumulative_gpa,
            p.spec_gpas.clone(),
            p.probation_counter,
            p.forgiveness_counter,
        ),
        None => (0.0, None, HashMap::new(), 0, 0),
    };
    let probation_counter = match gpa {
        Some(g) if g < min_gpa => probation + 1,
        _ => 0,
    };
    SemesterSummary {
        student_id: student.id,
        year: slot.year,
        semester: slot.semester,
        cumulative_credits: credits,
        cumulative_gpa: gpa,
        spec_gpas,
        probation_counter,
        forgiveness_counter: forgiveness,
    }
}

/// Why an attempt blocks semester close, if it does. Grade-point omission is
/// tolerated only for the non-numeric letter grades P and TC.
pub fn attempt_block(attempt: &CourseAttempt) -> Option<BlockingIssue> {
    match attempt.status {
        AttemptStatus::Enrolled => Some(BlockingIssue::UngradedEnrollment),
        AttemptStatus::Passed | AttemptStatus::Failed if attempt.grade_point.is_none() => {
            let exempt = matches!(attempt.letter_grade.as_deref(), Some("P") | Some("TC"));
            if exempt {
                None
            } else {
                Some(BlockingIssue::MissingGradePoint)
            }
        }
        _ => None,
    }
}

#[derive(Debug)]
pub struct SemesterStartReport {
    pub slot: CalendarSlot,
    pub years_promoted: bool,
    pub summaries_rolled: usize,
    pub extension_requests_created: usize,
}

#[derive(Debug)]
pub struct SemesterEndReport {
    pub slot: CalendarSlot,
    pub graduated: Vec<String>,
    pub level_changes: Vec<(String, StudentLevel)>,
}

pub async fn start_semester(
    pool: &PgPool,
    clock: &dyn Clock,
    ctx: &AdminContext,
) -> CoreResult<SemesterStartReport> {
    let today = clock.now().date_naive();
    let mut tx = pool.begin().await?;

    if db::current_calendar(&mut *tx).await?.is_some() {
        return Err(CoreError::state_conflict("a semester is already active"));
    }
    let latest = db::latest_calendar(&mut *tx).await?;
    let slot = next_slot(latest, today.year());
    if db::calendar_exists(&mut *tx, slot).await? {
        return Err(CoreError::state_conflict(format!(
            "semester {}/{} already exists",
            slot.year, slot.semester
        )));
    }

    db::clear_current_calendar(&mut *tx).await?;
    db::insert_calendar(&mut *tx, slot, today).await?;

    // Spring to fall is the academic year boundary: promote everyone still
    // enrolled, except first-years with no recorded grade history yet.
    let years_promoted = latest.is_some_and(|prior| prior.semester == SEMESTER_SPRING);
    if years_promoted {
        db::promote_student_years(&mut *tx).await?;
    }

    let param_rows = db::all_parameter_rows(&mut *tx).await?;
    let students = db::enrolled_students(&mut *tx).await?;
    let mut summaries_rolled = 0usize;
    let mut extension_requests_created = 0usize;

    for student in &students {
        let params = EffectiveParams::resolve(&param_rows, student.id);
        let prior = db::latest_summary(&mut *tx, student.id).await?;
        let summary = roll_summary(prior.as_ref(), student, slot, params.min_cumulative_gpa);
        let flagged = summary.probation_counter >= params.probation_board_threshold;
        db::upsert_summary(&mut *tx, &summary).await?;
        summaries_rolled += 1;

        if flagged && !db::has_pending_extension(&mut *tx, student.id).await? {
            db::replace_pending_extension(&mut *tx, student.id, clock.now()).await?;
            extension_requests_created += 1;
        }
    }

    tx.commit().await?;
    info!(
        year = slot.year,
        semester = slot.semester,
        admin = %ctx.admin,
        summaries_rolled,
        extension_requests_created,
        "semester started"
    );
    Ok(SemesterStartReport {
        slot,
        years_promoted,
        summaries_rolled,
        extension_requests_created,
    })
}

pub async fn end_semester(
    pool: &PgPool,
    clock: &dyn Clock,
    ctx: &AdminContext,
) -> CoreResult<SemesterEndReport> {
    let today = clock.now().date_naive();
    let mut tx = pool.begin().await?;

    let slot = db::current_calendar(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::state_conflict("no semester is active"))?;

    let attempts = db::attempts_in_year(&mut *tx, slot.year).await?;
    let blocking: Vec<BlockingEntity> = attempts
        .iter()
        .filter_map(|a| {
            attempt_block(a).map(|issue| BlockingEntity {
                student_id: a.student_id,
                course_code: a.course_code.clone(),
                issue,
            })
        })
        .collect();
    if !blocking.is_empty() {
        return Err(CoreError::Precondition {
            message: format!("{} course attempts still need grading", blocking.len()),
            blocking,
        });
    }

    // Registration must not stay open past the semester it belongs to.
    for window in db::non_closed_windows(&mut *tx, WindowKind::Registration).await? {
        db::set_window_status(&mut *tx, window.id, WindowStatus::Closed, Some(&ctx.admin)).await?;
    }
    db::close_calendar(&mut *tx, slot, today).await?;

    let catalog = db::course_catalog_map(&mut *tx).await?;
    let param_rows = db::all_parameter_rows(&mut *tx).await?;
    let students = db::enrolled_students(&mut *tx).await?;

    let mut graduated = Vec::new();
    let mut level_changes = Vec::new();
    for student in &students {
        let params = EffectiveParams::resolve(&param_rows, student.id);
        let attempts = db::attempts_for_student(&mut *tx, student.id).await?;
        let summary = db::latest_summary(&mut *tx, student.id).await?;

        let qualifies = summary.as_ref().is_some_and(|s| {
            graduation::qualifies_for_graduation(student, &attempts, s, &catalog, &params)
        });
        if qualifies {
            db::mark_graduated(&mut *tx, student.id).await?;
            graduated.push(student.code.clone());
            continue;
        }

        let level = graduation::determine_level(student, &attempts, &catalog);
        if level != student.level {
            db::set_student_level(&mut *tx, student.id, level).await?;
            level_changes.push((student.code.clone(), level));
        }
    }

    tx.commit().await?;
    info!(
        year = slot.year,
        semester = slot.semester,
        admin = %ctx.admin,
        graduated = graduated.len(),
        level_changes = level_changes.len(),
        "semester closed"
    );
    Ok(SemesterEndReport {
        slot,
        graduated,
        level_changes,
    })
}
