use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::params;

/// Inserts a small demo institution: system-wide thresholds, a two-track
/// catalog with prerequisites, and three students at different stages.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let defaults = [
        (params::MIN_CUMULATIVE_GPA, 2.0),
        (params::MIN_CUMULATIVE_CREDITS, 120.0),
        (params::PROBATION_BOARD_THRESHOLD, 3.0),
        (params::FORGIVENESS_CEILING, 1.7),
        (params::CREDIT_GATE_PERCENT, 0.75),
        (params::HIGH_WEIGHT_THRESHOLD, 6.0),
        ("min_gpa:finance", 2.5),
        ("min_gpa:economics", 2.3),
        ("min_gpa:statistics", 2.0),
    ];
    for (name, value) in defaults {
        sqlx::query(
            "INSERT INTO progression.parameters (name, student_id, value) VALUES ($1, NULL, $2) \
             ON CONFLICT (name) WHERE student_id IS NULL DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(name)
        .bind(value)
        .execute(pool)
        .await?;
    }

    let courses = [
        ("GEN101", "Foundations I", 4.0, 1, 1, false),
        ("GEN102", "Foundations II", 4.0, 1, 2, false),
        ("LANG110", "Academic Language", 3.0, 1, 1, true),
        ("GEN201", "Methods I", 5.0, 2, 1, false),
        ("GEN202", "Methods II", 5.0, 2, 2, false),
        ("FIN301", "Corporate Finance", 6.0, 3, 1, false),
        ("ECON301", "Macroeconomic Policy", 6.0, 3, 1, false),
        ("CAP401", "Capstone Project", 8.0, 4, 2, false),
    ];
    for (code, title, coefficient, year, semester, language_flag) in courses {
        sqlx::query(
            r#"
            INSERT INTO progression.courses
            (code, title, coefficient, year, semester, language_flag, major_tags,
             minor_tag, minor_year, minor_major_filter, elective_group)
            VALUES ($1, $2, $3, $4, $5, $6, '{}', NULL, NULL, '{}', NULL)
            ON CONFLICT (code) DO UPDATE
            SET title = EXCLUDED.title, coefficient = EXCLUDED.coefficient
            "#,
        )
        .bind(code)
        .bind(title)
        .bind(coefficient)
        .bind(year)
        .bind(semester)
        .bind(language_flag)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "UPDATE progression.courses SET major_tags = '{finance}' WHERE code = 'FIN301'",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "UPDATE progression.courses SET major_tags = '{economics}' WHERE code = 'ECON301'",
    )
    .execute(pool)
    .await?;

    let prerequisites = [("GEN201", "GEN101"), ("GEN202", "GEN102"), ("FIN301", "GEN201")];
    for (course, prereq) in prerequisites {
        sqlx::query(
            "INSERT INTO progression.course_prerequisites (course_code, prereq_code) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(course)
        .bind(prereq)
        .execute(pool)
        .await?;
    }

    let students = [
        ("S-1001", "Avery Lee", 1, false),
        ("S-1002", "Jules Moreno", 3, false),
        ("S-1003", "Kiara Patel", 4, true),
    ];
    for (code, full_name, year_of_study, language_track) in students {
        sqlx::query(
            r#"
            INSERT INTO progression.students
            (id, code, full_name, year_of_study, enrollment_status, level, language_track)
            VALUES ($1, $2, $3, $4, 'enrolled', 'freshman', $5)
            ON CONFLICT (code) DO UPDATE
            SET full_name = EXCLUDED.full_name, year_of_study = EXCLUDED.year_of_study
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(full_name)
        .bind(year_of_study)
        .bind(language_track)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Bulk catalog load. One row per course; tag lists are semicolon separated.
pub async fn import_courses_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        code: String,
        title: String,
        coefficient: f64,
        year: i32,
        semester: i32,
        language_flag: bool,
        major_tags: Option<String>,
        minor_tag: Option<String>,
        minor_year: Option<i32>,
        minor_major_filter: Option<String>,
        elective_group: Option<String>,
    }

    fn split_tags(raw: Option<&str>) -> Vec<String> {
        raw.map(|s| {
            s.split(';')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let outcome = sqlx::query(
            r#"
            INSERT INTO progression.courses
            (code, title, coefficient, year, semester, language_flag, major_tags,
             minor_tag, minor_year, minor_major_filter, elective_group)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&row.code)
        .bind(&row.title)
        .bind(row.coefficient)
        .bind(row.year)
        .bind(row.semester)
        .bind(row.language_flag)
        .bind(split_tags(row.major_tags.as_deref()))
        .bind(&row.minor_tag)
        .bind(row.minor_year)
        .bind(split_tags(row.minor_major_filter.as_deref()))
        .bind(&row.elective_group)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Bulk historical-attempt load, appended in file order so attempt ids keep
/// the original chronology.
pub async fn import_attempts_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_code: String,
        course_code: String,
        status: String,
        letter_grade: Option<String>,
        grade_point: Option<f64>,
        forgiven: Option<bool>,
        year: i32,
        semester: i32,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        crate::models::AttemptStatus::parse(&row.status)
            .with_context(|| format!("unknown attempt status {}", row.status))?;

        let student = crate::db::student_by_code(pool, &row.student_code)
            .await?
            .with_context(|| format!("no student with code {}", row.student_code))?;

        sqlx::query(
            r#"
            INSERT INTO progression.course_attempts
            (student_id, course_code, status, letter_grade, grade_point, forgiven, year, semester)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(student.id)
        .bind(&row.course_code)
        .bind(&row.status)
        .bind(&row.letter_grade)
        .bind(row.grade_point)
        .bind(row.forgiven.unwrap_or(false))
        .bind(row.year)
        .bind(row.semester)
        .execute(pool)
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}
