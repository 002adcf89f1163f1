use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    AttemptStatus, CalendarSlot, Course, CourseAttempt, ElectiveGroup,
    EnrollmentStatus, ProbationExtensionRequest, RequestStatus, SemesterSummary,
    SpecializationRequest, Student, StudentLevel,
    Window, WindowKind, WindowStatus,
};
use crate::params::ParameterRow;
use crate::specialization::Combination;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// row mapping

fn map_student(row: &PgRow) -> CoreResult<Student> {
    let status: String = row.try_get("enrollment_status")?;
    let level: String = row.try_get("level")?;
    Ok(Student {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        full_name: row.try_get("full_name")?,
        year_of_study: row.try_get("year_of_study")?,
        enrollment_status: EnrollmentStatus::parse(&status)
            .ok_or_else(|| CoreError::corrupt_row(format!("enrollment status {status}")))?,
        level: StudentLevel::parse(&level)
            .ok_or_else(|| CoreError::corrupt_row(format!("student level {level}")))?,
        major: row.try_get("major")?,
        second_major: row.try_get("second_major")?,
        minor: row.try_get("minor")?,
        second_minor: row.try_get("second_minor")?,
        language_track: row.try_get("language_track")?,
    })
}

fn map_course(row: &PgRow) -> CoreResult<Course> {
    Ok(Course {
        code: row.try_get("code")?,
        title: row.try_get("title")?,
        coefficient: row.try_get("coefficient")?,
        year: row.try_get("year")?,
        semester: row.try_get("semester")?,
        language_flag: row.try_get("language_flag")?,
        major_tags: row.try_get("major_tags")?,
        minor_tag: row.try_get("minor_tag")?,
        minor_year: row.try_get("minor_year")?,
        minor_major_filter: row.try_get("minor_major_filter")?,
        elective_group: row.try_get("elective_group")?,
    })
}

fn map_attempt(row: &PgRow) -> CoreResult<CourseAttempt> {
    let status: String = row.try_get("status")?;
    Ok(CourseAttempt {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_code: row.try_get("course_code")?,
        status: AttemptStatus::parse(&status)
            .ok_or_else(|| CoreError::corrupt_row(format!("attempt status {status}")))?,
        letter_grade: row.try_get("letter_grade")?,
        grade_point: row.try_get("grade_point")?,
        forgiven: row.try_get("forgiven")?,
        year: row.try_get("year")?,
        semester: row.try_get("semester")?,
    })
}

fn map_summary(row: &PgRow) -> CoreResult<SemesterSummary> {
    let raw_gpas: String = row.try_get("spec_gpas")?;
    let spec_gpas: HashMap<String, f64> = serde_json::from_str(&raw_gpas)
        .map_err(|e| CoreError::corrupt_row(format!("spec_gpas payload: {e}")))?;
    Ok(SemesterSummary {
        student_id: row.try_get("student_id")?,
        year: row.try_get("year")?,
        semester: row.try_get("semester")?,
        cumulative_credits: row.try_get("cumulative_credits")?,
        cumulative_gpa: row.try_get("cumulative_gpa")?,
        spec_gpas,
        probation_counter: row.try_get("probation_counter")?,
        forgiveness_counter: row.try_get("forgiveness_counter")?,
    })
}

fn map_window(row: &PgRow) -> CoreResult<Window> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(Window {
        id: row.try_get("id")?,
        kind: WindowKind::parse(&kind)
            .ok_or_else(|| CoreError::corrupt_row(format!("window kind {kind}")))?,
        status: WindowStatus::parse(&status)
            .ok_or_else(|| CoreError::corrupt_row(format!("window status {status}")))?,
        start_at: row.try_get("start_at")?,
        end_at: row.try_get("end_at")?,
        opened_by: row.try_get("opened_by")?,
        closed_by: row.try_get("closed_by")?,
    })
}

fn map_request(row: &PgRow) -> CoreResult<SpecializationRequest> {
    let status: String = row.try_get("status")?;
    Ok(SpecializationRequest {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        major: row.try_get("major")?,
        second_major: row.try_get("second_major")?,
        minor: row.try_get("minor")?,
        second_minor: row.try_get("second_minor")?,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| CoreError::corrupt_row(format!("request status {status}")))?,
    })
}

fn map_calendar(row: &PgRow) -> CoreResult<CalendarSlot> {
    Ok(CalendarSlot {
        year: row.try_get("year")?,
        semester: row.try_get("semester")?,
    })
}

// ---------------------------------------------------------------------------
// students

/// Optional filters for student listings, rendered through a typed builder
/// so no filter combination ever concatenates raw strings into SQL.
#[derive(Debug, Default, Clone)]
pub struct StudentFilter {
    pub enrollment_status: Option<EnrollmentStatus>,
    pub min_year: Option<i32>,
    pub language_track: Option<bool>,
}

pub(crate) fn student_query(filter: &StudentFilter) -> QueryBuilder<'static, sqlx::Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT id, code, full_name, year_of_study, enrollment_status, level, \
         major, second_major, minor, second_minor, language_track \
         FROM progression.students WHERE 1 = 1",
    );
    if let Some(status) = filter.enrollment_status {
        builder.push(" AND enrollment_status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(min_year) = filter.min_year {
        builder.push(" AND year_of_study >= ");
        builder.push_bind(min_year);
    }
    if let Some(flag) = filter.language_track {
        builder.push(" AND language_track = ");
        builder.push_bind(flag);
    }
    builder.push(" ORDER BY code");
    builder
}

pub async fn fetch_students(
    exec: impl PgExecutor<'_>,
    filter: &StudentFilter,
) -> CoreResult<Vec<Student>> {
    let mut builder = student_query(filter);
    let rows = builder.build().fetch_all(exec).await?;
    rows.iter().map(map_student).collect()
}

pub async fn enrolled_students(exec: impl PgExecutor<'_>) -> CoreResult<Vec<Student>> {
    fetch_students(
        exec,
        &StudentFilter {
            enrollment_status: Some(EnrollmentStatus::Enrolled),
            ..StudentFilter::default()
        },
    )
    .await
}

pub async fn student_by_code(
    exec: impl PgExecutor<'_>,
    code: &str,
) -> CoreResult<Option<Student>> {
    let row = sqlx::query(
        "SELECT id, code, full_name, year_of_study, enrollment_status, level, \
         major, second_major, minor, second_minor, language_track \
         FROM progression.students WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(map_student).transpose()
}

/// Academic-year promotion at the spring-to-fall boundary. First-years with
/// no recorded GPA stay put for another year.
pub async fn promote_student_years(exec: impl PgExecutor<'_>) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE progression.students s
        SET year_of_study = year_of_study + 1
        WHERE s.enrollment_status NOT IN ('dismissed', 'graduated')
          AND (s.year_of_study > 1 OR EXISTS (
              SELECT 1 FROM progression.semester_summaries ss
              WHERE ss.student_id = s.id AND ss.cumulative_gpa IS NOT NULL))
        "#,
    )
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

pub async fn mark_graduated(exec: impl PgExecutor<'_>, student_id: Uuid) -> CoreResult<()> {
    sqlx::query("UPDATE progression.students SET enrollment_status = 'graduated' WHERE id = $1")
        .bind(student_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn set_student_level(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
    level: StudentLevel,
) -> CoreResult<()> {
    sqlx::query("UPDATE progression.students SET level = $2 WHERE id = $1")
        .bind(student_id)
        .bind(level.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

/// Writes an accepted combination onto the student record, or wipes all four
/// specialization fields when `combination` is `None`.
pub async fn set_student_specializations(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
    combination: Option<&Combination>,
) -> CoreResult<()> {
    let (major, second_major, minor, second_minor) = match combination {
        Some(combo) => combo.fields(),
        None => (None, None, None, None),
    };
    sqlx::query(
        "UPDATE progression.students \
         SET major = $2, second_major = $3, minor = $4, second_minor = $5 \
         WHERE id = $1",
    )
    .bind(student_id)
    .bind(major)
    .bind(second_major)
    .bind(minor)
    .bind(second_minor)
    .execute(exec)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// courses

pub async fn course_catalog(exec: impl PgExecutor<'_>) -> CoreResult<Vec<Course>> {
    let rows = sqlx::query(
        "SELECT code, title, coefficient, year, semester, language_flag, major_tags, \
         minor_tag, minor_year, minor_major_filter, elective_group \
         FROM progression.courses ORDER BY code",
    )
    .fetch_all(exec)
    .await?;
    rows.iter().map(map_course).collect()
}

pub async fn course_catalog_map(
    exec: impl PgExecutor<'_>,
) -> CoreResult<HashMap<String, Course>> {
    let catalog = course_catalog(exec).await?;
    Ok(catalog.into_iter().map(|c| (c.code.clone(), c)).collect())
}

pub async fn elective_groups(exec: impl PgExecutor<'_>) -> CoreResult<Vec<ElectiveGroup>> {
    let rows = sqlx::query(
        "SELECT name, required_picks, max_picks, follows_major, related_course \
         FROM progression.elective_groups ORDER BY name",
    )
    .fetch_all(exec)
    .await?;
    rows.iter()
        .map(|row| -> CoreResult<ElectiveGroup> {
            Ok(ElectiveGroup {
                name: row.try_get("name")?,
                required_picks: row.try_get("required_picks")?,
                max_picks: row.try_get("max_picks")?,
                follows_major: row.try_get("follows_major")?,
                related_course: row.try_get("related_course")?,
            })
        })
        .collect()
}

pub async fn prerequisites_map(
    exec: impl PgExecutor<'_>,
) -> CoreResult<HashMap<String, Vec<String>>> {
    let rows = sqlx::query(
        "SELECT course_code, prereq_code FROM progression.course_prerequisites \
         ORDER BY course_code, prereq_code",
    )
    .fetch_all(exec)
    .await?;
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let course: String = row.try_get("course_code")?;
        let prereq: String = row.try_get("prereq_code")?;
        map.entry(course).or_default().push(prereq);
    }
    Ok(map)
}

// ---------------------------------------------------------------------------
// attempts

pub async fn attempts_for_student(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
) -> CoreResult<Vec<CourseAttempt>> {
    let rows = sqlx::query(
        "SELECT id, student_id, course_code, status, letter_grade, grade_point, forgiven, \
         year, semester \
         FROM progression.course_attempts WHERE student_id = $1 ORDER BY id",
    )
    .bind(student_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(map_attempt).collect()
}

pub async fn attempts_in_year(
    exec: impl PgExecutor<'_>,
    year: i32,
) -> CoreResult<Vec<CourseAttempt>> {
    let rows = sqlx::query(
        "SELECT id, student_id, course_code, status, letter_grade, grade_point, forgiven, \
         year, semester \
         FROM progression.course_attempts WHERE year = $1 ORDER BY id",
    )
    .bind(year)
    .fetch_all(exec)
    .await?;
    rows.iter().map(map_attempt).collect()
}

// ---------------------------------------------------------------------------
// semester summaries

pub async fn latest_summary(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
) -> CoreResult<Option<SemesterSummary>> {
    let row = sqlx::query(
        "SELECT student_id, year, semester, cumulative_credits, cumulative_gpa, spec_gpas, \
         probation_counter, forgiveness_counter \
         FROM progression.semester_summaries \
         WHERE student_id = $1 ORDER BY year DESC, semester DESC LIMIT 1",
    )
    .bind(student_id)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(map_summary).transpose()
}

pub async fn upsert_summary(
    exec: impl PgExecutor<'_>,
    summary: &SemesterSummary,
) -> CoreResult<()> {
    let spec_gpas = serde_json::to_string(&summary.spec_gpas)
        .map_err(|e| CoreError::corrupt_row(format!("spec_gpas encode: {e}")))?;
    sqlx::query(
        r#"
        INSERT INTO progression.semester_summaries
        (student_id, year, semester, cumulative_credits, cumulative_gpa, spec_gpas,
         probation_counter, forgiveness_counter)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (student_id, year, semester) DO UPDATE
        SET cumulative_credits = EXCLUDED.cumulative_credits,
            cumulative_gpa = EXCLUDED.cumulative_gpa,
            spec_gpas = EXCLUDED.spec_gpas,
            probation_counter = EXCLUDED.probation_counter,
            forgiveness_counter = EXCLUDED.forgiveness_counter
        "#,
    )
    .bind(summary.student_id)
    .bind(summary.year)
    .bind(summary.semester)
    .bind(summary.cumulative_credits)
    .bind(summary.cumulative_gpa)
    .bind(spec_gpas)
    .bind(summary.probation_counter)
    .bind(summary.forgiveness_counter)
    .execute(exec)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// academic calendar

pub async fn current_calendar(exec: impl PgExecutor<'_>) -> CoreResult<Option<CalendarSlot>> {
    let row = sqlx::query(
        "SELECT year, semester FROM progression.academic_calendar WHERE is_current LIMIT 1",
    )
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(map_calendar).transpose()
}

pub async fn latest_calendar(exec: impl PgExecutor<'_>) -> CoreResult<Option<CalendarSlot>> {
    let row = sqlx::query(
        "SELECT year, semester FROM progression.academic_calendar \
         ORDER BY year DESC, semester DESC LIMIT 1",
    )
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(map_calendar).transpose()
}

pub async fn calendar_exists(exec: impl PgExecutor<'_>, slot: CalendarSlot) -> CoreResult<bool> {
    let row = sqlx::query(
        "SELECT 1 AS one FROM progression.academic_calendar WHERE year = $1 AND semester = $2",
    )
    .bind(slot.year)
    .bind(slot.semester)
    .fetch_optional(exec)
    .await?;
    Ok(row.is_some())
}

pub async fn clear_current_calendar(exec: impl PgExecutor<'_>) -> CoreResult<()> {
    sqlx::query("UPDATE progression.academic_calendar SET is_current = FALSE WHERE is_current")
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn insert_calendar(
    exec: impl PgExecutor<'_>,
    slot: CalendarSlot,
    start_date: NaiveDate,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO progression.academic_calendar (year, semester, is_current, start_date) \
         VALUES ($1, $2, TRUE, $3)",
    )
    .bind(slot.year)
    .bind(slot.semester)
    .bind(start_date)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn close_calendar(
    exec: impl PgExecutor<'_>,
    slot: CalendarSlot,
    end_date: NaiveDate,
) -> CoreResult<()> {
    sqlx::query(
        "UPDATE progression.academic_calendar \
         SET is_current = FALSE, end_date = $3 WHERE year = $1 AND semester = $2",
    )
    .bind(slot.year)
    .bind(slot.semester)
    .bind(end_date)
    .execute(exec)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// windows

const WINDOW_COLUMNS: &str =
    "id, kind, status, start_at, end_at, opened_by, closed_by, created_at";

pub async fn latest_window(
    exec: impl PgExecutor<'_>,
    kind: WindowKind,
) -> CoreResult<Option<Window>> {
    let sql = format!(
        "SELECT {WINDOW_COLUMNS} FROM progression.windows \
         WHERE kind = $1 ORDER BY created_at DESC LIMIT 1"
    );
    let row = sqlx::query(&sql)
        .bind(kind.as_str())
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(map_window).transpose()
}

pub async fn non_closed_windows(
    exec: impl PgExecutor<'_>,
    kind: WindowKind,
) -> CoreResult<Vec<Window>> {
    let sql = format!(
        "SELECT {WINDOW_COLUMNS} FROM progression.windows \
         WHERE kind = $1 AND status <> 'closed' ORDER BY created_at"
    );
    let rows = sqlx::query(&sql)
        .bind(kind.as_str())
        .fetch_all(exec)
        .await?;
    rows.iter().map(map_window).collect()
}

pub async fn insert_window(exec: impl PgExecutor<'_>, window: &Window) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO progression.windows (id, kind, status, start_at, end_at, opened_by) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(window.id)
    .bind(window.kind.as_str())
    .bind(window.status.as_str())
    .bind(window.start_at)
    .bind(window.end_at)
    .bind(&window.opened_by)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn set_window_status(
    exec: impl PgExecutor<'_>,
    id: Uuid,
    status: WindowStatus,
    closed_by: Option<&str>,
) -> CoreResult<()> {
    sqlx::query(
        "UPDATE progression.windows \
         SET status = $2, closed_by = COALESCE($3, closed_by) WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(closed_by)
    .execute(exec)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// parameters

pub async fn all_parameter_rows(exec: impl PgExecutor<'_>) -> CoreResult<Vec<ParameterRow>> {
    let rows = sqlx::query(
        "SELECT name, student_id, value FROM progression.parameters ORDER BY name",
    )
    .fetch_all(exec)
    .await?;
    rows.iter()
        .map(|row| -> CoreResult<ParameterRow> {
            Ok(ParameterRow {
                name: row.try_get("name")?,
                student_id: row.try_get("student_id")?,
                value: row.try_get("value")?,
            })
        })
        .collect()
}

pub async fn parameter_rows_for_student(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
) -> CoreResult<Vec<ParameterRow>> {
    let rows = sqlx::query(
        "SELECT name, student_id, value FROM progression.parameters \
         WHERE student_id IS NULL OR student_id = $1 ORDER BY name",
    )
    .bind(student_id)
    .fetch_all(exec)
    .await?;
    rows.iter()
        .map(|row| -> CoreResult<ParameterRow> {
            Ok(ParameterRow {
                name: row.try_get("name")?,
                student_id: row.try_get("student_id")?,
                value: row.try_get("value")?,
            })
        })
        .collect()
}

pub async fn upsert_parameter(
    exec: impl PgExecutor<'_>,
    name: &str,
    student_id: Option<Uuid>,
    value: f64,
) -> CoreResult<()> {
    // Partial unique indexes cover the two scopes, so the conflict target
    // depends on whether this is an override row.
    let sql = if student_id.is_some() {
        "INSERT INTO progression.parameters (name, student_id, value) VALUES ($1, $2, $3) \
         ON CONFLICT (name, student_id) WHERE student_id IS NOT NULL \
         DO UPDATE SET value = EXCLUDED.value"
    } else {
        "INSERT INTO progression.parameters (name, student_id, value) VALUES ($1, $2, $3) \
         ON CONFLICT (name) WHERE student_id IS NULL \
         DO UPDATE SET value = EXCLUDED.value"
    };
    sqlx::query(sql)
        .bind(name)
        .bind(student_id)
        .bind(value)
        .execute(exec)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// specialization requests

pub async fn upsert_specialization_request(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
    combination: &Combination,
) -> CoreResult<()> {
    let (major, second_major, minor, second_minor) = combination.fields();
    sqlx::query(
        r#"
        INSERT INTO progression.specialization_requests
        (id, student_id, major, second_major, minor, second_minor, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending')
        ON CONFLICT (student_id) DO UPDATE
        SET major = EXCLUDED.major,
            second_major = EXCLUDED.second_major,
            minor = EXCLUDED.minor,
            second_minor = EXCLUDED.second_minor,
            status = 'pending'
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(major)
    .bind(second_major)
    .bind(minor)
    .bind(second_minor)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn requests_by_combination(
    exec: impl PgExecutor<'_>,
    combination: &Combination,
) -> CoreResult<Vec<SpecializationRequest>> {
    let (major, second_major, minor, second_minor) = combination.fields();
    let rows = sqlx::query(
        "SELECT id, student_id, major, second_major, minor, second_minor, status \
         FROM progression.specialization_requests \
         WHERE major IS NOT DISTINCT FROM $1 \
           AND second_major IS NOT DISTINCT FROM $2 \
           AND minor IS NOT DISTINCT FROM $3 \
           AND second_minor IS NOT DISTINCT FROM $4",
    )
    .bind(major)
    .bind(second_major)
    .bind(minor)
    .bind(second_minor)
    .fetch_all(exec)
    .await?;
    rows.iter().map(map_request).collect()
}

pub async fn set_request_status(
    exec: impl PgExecutor<'_>,
    request_id: Uuid,
    status: RequestStatus,
) -> CoreResult<()> {
    sqlx::query("UPDATE progression.specialization_requests SET status = $2 WHERE id = $1")
        .bind(request_id)
        .bind(status.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn reset_rejected_requests(
    exec: impl PgExecutor<'_>,
    combination: &Combination,
) -> CoreResult<usize> {
    let (major, second_major, minor, second_minor) = combination.fields();
    let result = sqlx::query(
        "UPDATE progression.specialization_requests SET status = 'pending' \
         WHERE status = 'rejected' \
           AND major IS NOT DISTINCT FROM $1 \
           AND second_major IS NOT DISTINCT FROM $2 \
           AND minor IS NOT DISTINCT FROM $3 \
           AND second_minor IS NOT DISTINCT FROM $4",
    )
    .bind(major)
    .bind(second_major)
    .bind(minor)
    .bind(second_minor)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() as usize)
}

pub async fn rejected_combination_exists(
    exec: impl PgExecutor<'_>,
    key: &str,
) -> CoreResult<bool> {
    let row = sqlx::query("SELECT 1 AS one FROM progression.rejected_combinations WHERE combo_key = $1")
        .bind(key)
        .fetch_optional(exec)
        .await?;
    Ok(row.is_some())
}

pub async fn upsert_rejected_combination(exec: impl PgExecutor<'_>, key: &str) -> CoreResult<()> {
    sqlx::query(
        "INSERT INTO progression.rejected_combinations (combo_key) VALUES ($1) \
         ON CONFLICT (combo_key) DO NOTHING",
    )
    .bind(key)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn delete_rejected_combination(
    exec: impl PgExecutor<'_>,
    key: &str,
) -> CoreResult<usize> {
    let result = sqlx::query("DELETE FROM progression.rejected_combinations WHERE combo_key = $1")
        .bind(key)
        .execute(exec)
        .await?;
    Ok(result.rows_affected() as usize)
}

// ---------------------------------------------------------------------------
// probation extension requests

pub async fn has_pending_extension(
    exec: impl PgExecutor<'_>,
    student_id: Uuid,
) -> CoreResult<bool> {
    let row = sqlx::query(
        "SELECT 1 AS one FROM progression.probation_extension_requests \
         WHERE student_id = $1 AND status = 'pending'",
    )
    .bind(student_id)
    .fetch_optional(exec)
    .await?;
    Ok(row.is_some())
}

/// Pending extension requests paired with the student code, oldest first.
pub async fn pending_extension_requests(
    exec: impl PgExecutor<'_>,
) -> CoreResult<Vec<(ProbationExtensionRequest, String)>> {
    let rows = sqlx::query(
        "SELECT r.id, r.student_id, r.status, r.created_at, s.code \
         FROM progression.probation_extension_requests r \
         JOIN progression.students s ON s.id = r.student_id \
         WHERE r.status = 'pending' \
         ORDER BY r.created_at, s.code",
    )
    .fetch_all(exec)
    .await?;
    rows.iter()
        .map(|row| -> CoreResult<(ProbationExtensionRequest, String)> {
            let status: String = row.try_get("status")?;
            let request = ProbationExtensionRequest {
                id: row.try_get("id")?,
                student_id: row.try_get("student_id")?,
                status: RequestStatus::parse(&status)
                    .ok_or_else(|| CoreError::corrupt_row(format!("request status {status}")))?,
                created_at: row.try_get("created_at")?,
            };
            Ok((request, row.try_get("code")?))
        })
        .collect()
}

/// Drops any stale pending row and files a fresh one, so re-running the
/// rollover never piles up duplicates.
pub async fn replace_pending_extension(
    conn: &mut PgConnection,
    student_id: Uuid,
    created_at: DateTime<Utc>,
) -> CoreResult<()> {
    sqlx::query(
        "DELETE FROM progression.probation_extension_requests \
         WHERE student_id = $1 AND status = 'pending'",
    )
    .bind(student_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "INSERT INTO progression.probation_extension_requests (id, student_id, status, created_at) \
         VALUES ($1, $2, 'pending', $3)",
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_filter_renders_no_clauses_by_default() {
        let sql = student_query(&StudentFilter::default()).into_sql();
        assert!(!sql.contains("enrollment_status ="));
        assert!(!sql.contains("year_of_study >="));
        assert!(sql.ends_with("ORDER BY code"));
    }

    #[test]
    fn student_filter_renders_each_selected_clause() {
        let filter = StudentFilter {
            enrollment_status: Some(EnrollmentStatus::Enrolled),
            min_year: Some(3),
            language_track: Some(true),
        };
        let sql = student_query(&filter).into_sql();
        assert!(sql.contains("enrollment_status = $1"));
        assert!(sql.contains("year_of_study >= $2"));
        assert!(sql.contains("language_track = $3"));
    }
}
