use std::collections::HashMap;

use crate::models::{AttemptStatus, Course, CourseAttempt, SemesterSummary, Student, StudentLevel};
use crate::params::EffectiveParams;

/// Latest attempt per course code, by highest attempt id.
fn latest_attempts(attempts: &[CourseAttempt]) -> HashMap<&str, &CourseAttempt> {
    let mut latest: HashMap<&str, &CourseAttempt> = HashMap::new();
    for attempt in attempts {
        let entry = latest.entry(attempt.course_code.as_str()).or_insert(attempt);
        if attempt.id >= entry.id {
            *entry = attempt;
        }
    }
    latest
}

/// Whether an enrolled student has met every graduation requirement.
///
/// Requirements, all of which must hold over the latest-attempt view:
/// no not-enrolled courses, no unforgiven failures, cumulative credits and
/// GPA at or above the configured minimums, a declared major, year of study
/// at least four, and enough distinct passed high-weight courses (one for a
/// single major, two for a double major).
pub fn qualifies_for_graduation(
    student: &Student,
    attempts: &[CourseAttempt],
    summary: &SemesterSummary,
    catalog: &HashMap<String, Course>,
    params: &EffectiveParams,
) -> bool {
    if student.major.is_none() || student.year_of_study < 4 {
        return false;
    }
    if summary.cumulative_credits < params.min_cumulative_credits {
        return false;
    }
    match summary.cumulative_gpa {
        Some(gpa) if gpa >= params.min_cumulative_gpa => {}
        _ => return false,
    }

    let latest = latest_attempts(attempts);
    let mut high_weight_passes = 0usize;
    for attempt in latest.values() {
        match attempt.status {
            AttemptStatus::NotEnrolled => return false,
            AttemptStatus::Failed if !attempt.forgiven => return false,
            AttemptStatus::Passed => {
                let heavy = catalog
                    .get(&attempt.course_code)
                    .is_some_and(|c| c.coefficient >= params.high_weight_threshold);
                if heavy {
                    high_weight_passes += 1;
                }
            }
            _ => {}
        }
    }

    let required = if student.second_major.is_some() { 2 } else { 1 };
    high_weight_passes >= required
}

/// Recomputes the academic level from the latest-attempt view. Junior when
/// the whole year-1 and year-2 curriculum is passed, sophomore when year 1
/// is complete, freshman otherwise. Language-flagged courses are skipped for
/// students outside the language track.
pub fn determine_level(
    student: &Student,
    attempts: &[CourseAttempt],
    catalog: &HashMap<String, Course>,
) -> StudentLevel {
    let latest = latest_attempts(attempts);
    let year_complete = |year: i32| {
        // A year with no curriculum counts as incomplete, not vacuously done.
        let mut courses = catalog
            .values()
            .filter(|c| c.year == year)
            .filter(|c| student.language_track || !c.language_flag)
            .peekable();
        courses.peek().is_some()
            && courses.all(|c| {
                latest
                    .get(c.code.as_str())
                    .is_some_and(|a| a.status == AttemptStatus::Passed)
            })
    };

    if year_complete(1) && year_complete(2) {
        StudentLevel::Junior
    } else if year_complete(1) {
        StudentLevel::Sophomore
    } else {
        StudentLevel::Freshman
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnrollmentStatus;
    use uuid::Uuid;

    fn student(year: i32, major: Option<&str>, second_major: Option<&str>) -> Student {
        Student {
            id: Uuid::new_v4(),
            code: "S-2001".to_string(),
            full_name: "Jules Moreno".to_string(),
            year_of_study: year,
            enrollment_status: EnrollmentStatus::Enrolled,
            level: StudentLevel::Junior,
            major: major.map(str::to_string),
            second_major: second_major.map(str::to_string),
            minor: None,
            second_minor: None,
            language_track: false,
        }
    }

    fn summary(student_id: Uuid, credits: f64, gpa: f64) -> SemesterSummary {
        SemesterSummary {
            student_id,
            year: 2026,
            semester: 1,
            cumulative_credits: credits,
            cumulative_gpa: Some(gpa),
            spec_gpas: HashMap::new(),
            probation_counter: 0,
            forgiveness_counter: 0,
        }
    }

    fn course(code: &str, year: i32, coefficient: f64) -> (String, Course) {
        (
            code.to_string(),
            Course {
                code: code.to_string(),
                title: code.to_string(),
                coefficient,
                year,
                semester: 1,
                language_flag: false,
                major_tags: Vec::new(),
                minor_tag: None,
                minor_year: None,
                minor_major_filter: Vec::new(),
                elective_group: None,
            },
        )
    }

    fn attempt(id: i64, sid: Uuid, code: &str, status: AttemptStatus) -> CourseAttempt {
        CourseAttempt {
            id,
            student_id: sid,
            course_code: code.to_string(),
            status,
            letter_grade: Some("B".to_string()),
            grade_point: Some(3.0),
            forgiven: false,
            year: 2025,
            semester: 1,
        }
    }

    #[test]
    fn graduates_exactly_at_the_minimums_with_one_heavy_course() {
        let s = student(4, Some("finance"), None);
        let params = EffectiveParams::default();
        let catalog: HashMap<String, Course> =
            [course("CAP400", 4, params.high_weight_threshold)].into();
        let attempts = vec![attempt(1, s.id, "CAP400", AttemptStatus::Passed)];
        let sm = summary(s.id, params.min_cumulative_credits, params.min_cumulative_gpa);

        assert!(qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));

        // Losing the heavy pass blocks graduation on the next evaluation.
        let attempts = vec![attempt(1, s.id, "CAP400", AttemptStatus::Failed)];
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));
    }

    #[test]
    fn double_major_needs_two_distinct_heavy_courses() {
        let s = student(4, Some("finance"), Some("economics"));
        let params = EffectiveParams::default();
        let catalog: HashMap<String, Course> = [
            course("CAP400", 4, params.high_weight_threshold),
            course("CAP401", 4, params.high_weight_threshold),
        ]
        .into();
        let sm = summary(s.id, params.min_cumulative_credits, params.min_cumulative_gpa);

        let attempts = vec![attempt(1, s.id, "CAP400", AttemptStatus::Passed)];
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));

        let attempts = vec![
            attempt(1, s.id, "CAP400", AttemptStatus::Passed),
            attempt(2, s.id, "CAP401", AttemptStatus::Passed),
        ];
        assert!(qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));
    }

    #[test]
    fn unresolved_courses_block_graduation() {
        let s = student(4, Some("finance"), None);
        let params = EffectiveParams::default();
        let catalog: HashMap<String, Course> =
            [course("CAP400", 4, params.high_weight_threshold)].into();
        let sm = summary(s.id, params.min_cumulative_credits, params.min_cumulative_gpa);

        let attempts = vec![
            attempt(1, s.id, "CAP400", AttemptStatus::Passed),
            attempt(2, s.id, "GEN110", AttemptStatus::NotEnrolled),
        ];
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));

        // A forgiven failure does not block.
        let mut forgiven = attempt(2, s.id, "GEN110", AttemptStatus::Failed);
        forgiven.forgiven = true;
        let attempts = vec![attempt(1, s.id, "CAP400", AttemptStatus::Passed), forgiven];
        assert!(qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));
    }

    #[test]
    fn below_threshold_gpa_or_credits_blocks_graduation() {
        let s = student(4, Some("finance"), None);
        let params = EffectiveParams::default();
        let catalog: HashMap<String, Course> =
            [course("CAP400", 4, params.high_weight_threshold)].into();
        let attempts = vec![attempt(1, s.id, "CAP400", AttemptStatus::Passed)];

        let sm = summary(s.id, params.min_cumulative_credits - 1.0, params.min_cumulative_gpa);
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));

        let sm = summary(s.id, params.min_cumulative_credits, params.min_cumulative_gpa - 0.1);
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));
    }

    #[test]
    fn no_major_or_too_early_never_graduates() {
        let params = EffectiveParams::default();
        let catalog: HashMap<String, Course> =
            [course("CAP400", 4, params.high_weight_threshold)].into();

        let s = student(4, None, None);
        let attempts = vec![attempt(1, s.id, "CAP400", AttemptStatus::Passed)];
        let sm = summary(s.id, params.min_cumulative_credits, params.min_cumulative_gpa);
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));

        let s = student(3, Some("finance"), None);
        let sm = summary(s.id, params.min_cumulative_credits, params.min_cumulative_gpa);
        assert!(!qualifies_for_graduation(&s, &attempts, &sm, &catalog, &params));
    }

    #[test]
    fn level_tracks_completed_curriculum_years() {
        let s = student(3, Some("finance"), None);
        let catalog: HashMap<String, Course> = [
            course("GEN101", 1, 4.0),
            course("GEN102", 1, 4.0),
            course("GEN201", 2, 4.0),
        ]
        .into();

        let attempts = vec![
            attempt(1, s.id, "GEN101", AttemptStatus::Passed),
            attempt(2, s.id, "GEN102", AttemptStatus::Passed),
            attempt(3, s.id, "GEN201", AttemptStatus::Failed),
        ];
        assert_eq!(determine_level(&s, &attempts, &catalog), StudentLevel::Sophomore);

        let attempts = vec![
            attempt(1, s.id, "GEN101", AttemptStatus::Passed),
            attempt(2, s.id, "GEN102", AttemptStatus::Passed),
            attempt(3, s.id, "GEN201", AttemptStatus::Failed),
            attempt(4, s.id, "GEN201", AttemptStatus::Passed),
        ];
        assert_eq!(determine_level(&s, &attempts, &catalog), StudentLevel::Junior);

        let attempts = vec![attempt(1, s.id, "GEN101", AttemptStatus::Passed)];
        assert_eq!(determine_level(&s, &attempts, &catalog), StudentLevel::Freshman);
    }

    #[test]
    fn missing_curriculum_year_never_counts_as_complete() {
        let s = student(2, None, None);
        let catalog: HashMap<String, Course> = [course("GEN101", 1, 4.0)].into();
        let attempts = vec![attempt(1, s.id, "GEN101", AttemptStatus::Passed)];

        // Year 1 complete, no year-2 curriculum: sophomore, not junior.
        assert_eq!(determine_level(&s, &attempts, &catalog), StudentLevel::Sophomore);

        // An empty catalog leaves the student a freshman.
        let empty = HashMap::new();
        assert_eq!(determine_level(&s, &attempts, &empty), StudentLevel::Freshman);
    }

    #[test]
    fn language_courses_ignored_outside_the_language_track() {
        let s = student(2, None, None);
        let mut catalog: HashMap<String, Course> = [course("GEN101", 1, 4.0)].into();
        let (code, mut lang) = course("LANG110", 1, 4.0);
        lang.language_flag = true;
        catalog.insert(code, lang);

        let attempts = vec![attempt(1, s.id, "GEN101", AttemptStatus::Passed)];
        assert_eq!(determine_level(&s, &attempts, &catalog), StudentLevel::Sophomore);

        let mut tracked = student(2, None, None);
        tracked.language_track = true;
        assert_eq!(
            determine_level(&tracked, &attempts, &catalog),
            StudentLevel::Freshman
        );
    }
}
