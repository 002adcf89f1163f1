use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::PgPool;

use crate::clock::Clock;
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    AttemptStatus, CalendarSlot, Course, CourseAttempt, ElectiveGroup, Student, WindowKind,
    SEMESTER_MAKEUP,
};
use crate::params::EffectiveParams;
use crate::windows;

/// Snapshot of everything the resolver reads for one student. Fetched in one
/// pass so the computation itself stays pure and side-effect free.
#[derive(Debug)]
pub struct ResolverInput<'a> {
    pub student: &'a Student,
    /// All attempts for the student, ascending by id.
    pub attempts: &'a [CourseAttempt],
    pub catalog: &'a [Course],
    pub groups: &'a [ElectiveGroup],
    /// course code -> prerequisite course codes
    pub prerequisites: &'a HashMap<String, Vec<String>>,
    pub slot: CalendarSlot,
    pub params: &'a EffectiveParams,
    /// Track -> specialization GPA, from the latest semester summary.
    pub spec_gpas: &'a HashMap<String, f64>,
    pub cumulative_credits: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    PrerequisiteUnmet,
    SpecializationGpa,
    CreditGate,
    ElectiveGroupWithheld,
}

#[derive(Debug, Clone, Serialize)]
pub struct IneligibleCourse {
    pub code: String,
    pub reason: IneligibilityReason,
}

/// Disjoint partitions of the student's registration options.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub eligible: Vec<String>,
    pub ineligible: Vec<IneligibleCourse>,
    pub failed_carryover: Vec<String>,
    pub not_enrolled_carryover: Vec<String>,
    pub retake_eligible: Vec<String>,
    pub gpa_filtered_specializations: Vec<String>,
    pub credit_gate_applied: bool,
}

/// Fetches a student's snapshot and resolves their registration options.
/// Only meaningful while a registration window is open; reads are
/// side-effect free and safe against concurrent writers.
pub async fn resolve_for_student(
    pool: &PgPool,
    clock: &dyn Clock,
    student_code: &str,
) -> CoreResult<EligibilityReport> {
    if !windows::is_open(pool, clock, WindowKind::Registration).await? {
        return Err(CoreError::state_conflict(
            "the registration window is not open",
        ));
    }
    let student = db::student_by_code(pool, student_code)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("no student with code {student_code}")))?;
    let slot = db::current_calendar(pool)
        .await?
        .ok_or_else(|| CoreError::state_conflict("no semester is active"))?;

    let attempts = db::attempts_for_student(pool, student.id).await?;
    let catalog = db::course_catalog(pool).await?;
    let groups = db::elective_groups(pool).await?;
    let prerequisites = db::prerequisites_map(pool).await?;
    let param_rows = db::parameter_rows_for_student(pool, student.id).await?;
    let params = EffectiveParams::resolve(&param_rows, student.id);
    let summary = db::latest_summary(pool, student.id).await?;
    let (spec_gpas, cumulative_credits) = match &summary {
        Some(s) => (s.spec_gpas.clone(), s.cumulative_credits),
        None => (HashMap::new(), 0.0),
    };

    Ok(resolve(&ResolverInput {
        student: &student,
        attempts: &attempts,
        catalog: &catalog,
        groups: &groups,
        prerequisites: &prerequisites,
        slot,
        params: &params,
        spec_gpas: &spec_gpas,
        cumulative_credits,
    }))
}

/// A course is takeable only when every declared prerequisite's latest
/// attempt is a pass.
fn prerequisites_met(
    input: &ResolverInput<'_>,
    latest: &HashMap<&str, &CourseAttempt>,
    code: &str,
) -> bool {
    input
        .prerequisites
        .get(code)
        .map(|reqs| {
            reqs.iter().all(|req| {
                latest
                    .get(req.as_str())
                    .is_some_and(|a| a.status == AttemptStatus::Passed)
            })
        })
        .unwrap_or(true)
}

/// Latest attempt per course, by highest attempt id.
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

pub fn resolve(input: &ResolverInput<'_>) -> EligibilityReport {
    let latest = latest_attempts(input.attempts);
    let offered_this_term: HashSet<&str> = input
        .catalog
        .iter()
        .filter(|c| c.semester == input.slot.semester)
        .map(|c| c.code.as_str())
        .collect();

    // Courses already registered under the makeup window this year are not
    // re-offered as carry-forwards.
    let makeup_registered: HashSet<&str> = input
        .attempts
        .iter()
        .filter(|a| {
            a.semester == SEMESTER_MAKEUP
                && a.year == input.slot.year
                && a.status == AttemptStatus::Enrolled
        })
        .map(|a| a.course_code.as_str())
        .collect();

    let mut failed_carryover = Vec::new();
    let mut not_enrolled_carryover = Vec::new();
    let mut retake_eligible = Vec::new();

    for attempt in latest.values() {
        let offered = offered_this_term.contains(attempt.course_code.as_str());
        match attempt.status {
            AttemptStatus::Failed if attempt.year < input.slot.year && offered => {
                failed_carryover.push(attempt.course_code.clone());
            }
            AttemptStatus::NotEnrolled
                if attempt.year < input.slot.year
                    && offered
                    && !makeup_registered.contains(attempt.course_code.as_str()) =>
            {
                not_enrolled_carryover.push(attempt.course_code.clone());
            }
            AttemptStatus::Passed if !attempt.forgiven => {
                if let Some(gp) = attempt.grade_point {
                    if gp <= input.params.forgiveness_ceiling {
                        retake_eligible.push(attempt.course_code.clone());
                    }
                }
            }
            _ => {}
        }
    }
    failed_carryover.sort();
    not_enrolled_carryover.sort();
    retake_eligible.sort();

    let student = input.student;
    let declared_majors: Vec<&str> = [student.major.as_deref(), student.second_major.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    let declared_minors: Vec<&str> = [student.minor.as_deref(), student.second_minor.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    let specialization_count = student.declared_specializations().len();
    let tag_filtered = student.year_of_study >= 3 && specialization_count >= 2;

    let gpa_filtered_specializations: Vec<String> = declared_majors
        .iter()
        .chain(declared_minors.iter())
        .filter(|track| {
            let gpa = input.spec_gpas.get(**track).copied().unwrap_or(0.0);
            gpa < input.params.min_gpa_for_track(track)
        })
        .map(|track| (*track).to_string())
        .collect();
    let gpa_ok = |track: &str| !gpa_filtered_specializations.iter().any(|t| t == track);

    // Year >= 3 students must have earned the configured percentage of the
    // lower-year credit weight before upper-year courses open up.
    let lower_year_weight: f64 = input
        .catalog
        .iter()
        .filter(|c| c.year <= 2)
        .map(|c| c.coefficient)
        .sum();
    let credit_gate_applied = student.year_of_study >= 3
        && input.cumulative_credits < input.params.credit_gate_percent * lower_year_weight;

    let withheld_groups: HashSet<&str> = input
        .groups
        .iter()
        .filter(|g| {
            let wrong_major = g
                .follows_major
                .as_deref()
                .is_some_and(|m| !declared_majors.contains(&m));
            let related_missing = g
                .related_course
                .as_deref()
                .is_some_and(|c| !offered_this_term.contains(c));
            wrong_major || related_missing
        })
        .map(|g| g.name.as_str())
        .collect();

    let mut eligible = Vec::new();
    let mut ineligible = Vec::new();

    for course in input.catalog {
        if course.semester != input.slot.semester {
            continue;
        }
        if course.language_flag && !student.language_track {
            continue;
        }

        // Which path offers this course to this student, if any.
        let via_track: Option<&str> = if credit_gate_applied && course.year <= 2 {
            // A failed credit gate collapses the offering to years 1-2, no
            // matter what the specialization rules would have said. Group
            // withholding and prerequisites still apply below.
            None
        } else if tag_filtered {
            let via_major = course
                .major_tags
                .iter()
                .find(|tag| {
                    course.year == student.year_of_study
                        && declared_majors.contains(&tag.as_str())
                })
                .map(|tag| tag.as_str());
            let via_minor = course.minor_tag.as_deref().filter(|tag| {
                let effective_year = course.minor_year.unwrap_or(course.year);
                declared_minors.contains(tag)
                    && effective_year == student.year_of_study
                    && (course.minor_major_filter.is_empty()
                        || declared_majors
                            .iter()
                            .any(|m| course.minor_major_filter.iter().any(|f| f == m)))
            });
            match via_major.or(via_minor) {
                Some(track) => Some(track),
                None => continue,
            }
        } else {
            if course.year != student.year_of_study {
                continue;
            }
            None
        };

        if credit_gate_applied && course.year > 2 {
            ineligible.push(IneligibleCourse {
                code: course.code.clone(),
                reason: IneligibilityReason::CreditGate,
            });
            continue;
        }
        if let Some(track) = via_track {
            if !gpa_ok(track) {
                ineligible.push(IneligibleCourse {
                    code: course.code.clone(),
                    reason: IneligibilityReason::SpecializationGpa,
                });
                continue;
            }
        }
        if course
            .elective_group
            .as_deref()
            .is_some_and(|g| withheld_groups.contains(g))
        {
            ineligible.push(IneligibleCourse {
                code: course.code.clone(),
                reason: IneligibilityReason::ElectiveGroupWithheld,
            });
            continue;
        }

        if !prerequisites_met(input, &latest, &course.code) {
            ineligible.push(IneligibleCourse {
                code: course.code.clone(),
                reason: IneligibilityReason::PrerequisiteUnmet,
            });
            continue;
        }

        eligible.push(course.code.clone());
    }

    eligible.sort();
    ineligible.sort_by(|a, b| a.code.cmp(&b.code));

    EligibilityReport {
        eligible,
        ineligible,
        failed_carryover,
        not_enrolled_carryover,
        retake_eligible,
        gpa_filtered_specializations,
        credit_gate_applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentStatus, StudentLevel};
    use uuid::Uuid;

    fn student(year: i32) -> Student {
        Student {
            id: Uuid::new_v4(),
            code: "S-1001".to_string(),
            full_name: "Avery Lee".to_string(),
            year_of_study: year,
            enrollment_status: EnrollmentStatus::Enrolled,
            level: StudentLevel::Freshman,
            major: None,
            second_major: None,
            minor: None,
            second_minor: None,
            language_track: false,
        }
    }

    fn course(code: &str, year: i32, semester: i32) -> Course {
        Course {
            code: code.to_string(),
            title: code.to_string(),
            coefficient: 4.0,
            year,
            semester,
            language_flag: false,
            major_tags: Vec::new(),
            minor_tag: None,
            minor_year: None,
            minor_major_filter: Vec::new(),
            elective_group: None,
        }
    }

    fn attempt(id: i64, student_id: Uuid, code: &str, status: AttemptStatus, year: i32) -> CourseAttempt {
        CourseAttempt {
            id,
            student_id,
            course_code: code.to_string(),
            status,
            letter_grade: None,
            grade_point: Some(3.0),
            forgiven: false,
            year,
            semester: 1,
        }
    }

    struct Fixture {
        student: Student,
        catalog: Vec<Course>,
        attempts: Vec<CourseAttempt>,
        groups: Vec<ElectiveGroup>,
        prerequisites: HashMap<String, Vec<String>>,
        params: EffectiveParams,
        spec_gpas: HashMap<String, f64>,
        cumulative_credits: f64,
        slot: CalendarSlot,
    }

    impl Fixture {
        fn new(year: i32) -> Self {
            Self {
                student: student(year),
                catalog: Vec::new(),
                attempts: Vec::new(),
                groups: Vec::new(),
                prerequisites: HashMap::new(),
                params: EffectiveParams::default(),
                spec_gpas: HashMap::new(),
                cumulative_credits: 0.0,
                slot: CalendarSlot { year: 2026, semester: 1 },
            }
        }

        fn resolve(&self) -> EligibilityReport {
            resolve(&ResolverInput {
                student: &self.student,
                attempts: &self.attempts,
                catalog: &self.catalog,
                groups: &self.groups,
                prerequisites: &self.prerequisites,
                slot: self.slot,
                params: &self.params,
                spec_gpas: &self.spec_gpas,
                cumulative_credits: self.cumulative_credits,
            })
        }
    }

    #[test]
    fn course_blocked_until_prerequisite_latest_attempt_passes() {
        let mut fx = Fixture::new(2);
        fx.catalog.push(course("MATH201", 2, 1));
        fx.catalog.push(course("MATH101", 1, 1));
        fx.prerequisites
            .insert("MATH201".to_string(), vec!["MATH101".to_string()]);
        let sid = fx.student.id;
        fx.attempts
            .push(attempt(1, sid, "MATH101", AttemptStatus::Failed, 2025));

        let report = fx.resolve();
        assert!(report.eligible.is_empty());
        assert_eq!(report.ineligible.len(), 1);
        assert_eq!(report.ineligible[0].code, "MATH201");
        assert_eq!(
            report.ineligible[0].reason,
            IneligibilityReason::PrerequisiteUnmet
        );

        // A newer passing attempt flips the course to eligible.
        fx.attempts
            .push(attempt(2, sid, "MATH101", AttemptStatus::Passed, 2025));
        let report = fx.resolve();
        assert_eq!(report.eligible, vec!["MATH201".to_string()]);
    }

    #[test]
    fn failed_prior_year_course_carries_forward_when_offered() {
        let mut fx = Fixture::new(2);
        fx.catalog.push(course("PHYS101", 1, 1));
        let sid = fx.student.id;
        fx.attempts
            .push(attempt(1, sid, "PHYS101", AttemptStatus::Failed, 2025));

        let report = fx.resolve();
        assert_eq!(report.failed_carryover, vec!["PHYS101".to_string()]);
    }

    #[test]
    fn passed_retake_clears_the_carry_forward() {
        let mut fx = Fixture::new(2);
        fx.catalog.push(course("PHYS101", 1, 1));
        let sid = fx.student.id;
        fx.attempts
            .push(attempt(1, sid, "PHYS101", AttemptStatus::Failed, 2025));
        fx.attempts
            .push(attempt(2, sid, "PHYS101", AttemptStatus::Passed, 2025));

        let report = fx.resolve();
        assert!(report.failed_carryover.is_empty());
    }

    #[test]
    fn makeup_registration_suppresses_not_enrolled_carry_forward() {
        let mut fx = Fixture::new(2);
        fx.catalog.push(course("CHEM101", 1, 1));
        let sid = fx.student.id;
        fx.attempts
            .push(attempt(1, sid, "CHEM101", AttemptStatus::NotEnrolled, 2025));

        let report = fx.resolve();
        assert_eq!(report.not_enrolled_carryover, vec!["CHEM101".to_string()]);

        let mut makeup = attempt(2, sid, "CHEM101", AttemptStatus::Enrolled, 2026);
        makeup.semester = SEMESTER_MAKEUP;
        fx.attempts.push(makeup);
        let report = fx.resolve();
        assert!(report.not_enrolled_carryover.is_empty());
    }

    #[test]
    fn low_passing_grade_is_retake_eligible_up_to_the_ceiling() {
        let mut fx = Fixture::new(2);
        let sid = fx.student.id;
        let mut low = attempt(1, sid, "ECON101", AttemptStatus::Passed, 2025);
        low.grade_point = Some(1.7);
        fx.attempts.push(low);
        let mut fine = attempt(2, sid, "ECON102", AttemptStatus::Passed, 2025);
        fine.grade_point = Some(2.3);
        fx.attempts.push(fine);

        let report = fx.resolve();
        assert_eq!(report.retake_eligible, vec!["ECON101".to_string()]);
    }

    #[test]
    fn forgiven_attempt_is_not_offered_again() {
        let mut fx = Fixture::new(2);
        let sid = fx.student.id;
        let mut low = attempt(1, sid, "ECON101", AttemptStatus::Passed, 2025);
        low.grade_point = Some(1.0);
        low.forgiven = true;
        fx.attempts.push(low);

        let report = fx.resolve();
        assert!(report.retake_eligible.is_empty());
    }

    #[test]
    fn specialization_gpa_below_minimum_filters_track_courses() {
        let mut fx = Fixture::new(3);
        fx.student.major = Some("finance".to_string());
        fx.student.minor = Some("statistics".to_string());
        fx.cumulative_credits = 100.0;
        let mut c = course("FIN301", 3, 1);
        c.major_tags = vec!["finance".to_string()];
        fx.catalog.push(c);
        fx.params = EffectiveParams::resolve(
            &[crate::params::ParameterRow {
                name: "min_gpa:finance".to_string(),
                student_id: None,
                value: 2.5,
            }],
            fx.student.id,
        );
        fx.spec_gpas.insert("finance".to_string(), 2.4);
        fx.spec_gpas.insert("statistics".to_string(), 3.0);

        let report = fx.resolve();
        assert!(report.eligible.is_empty());
        assert_eq!(report.ineligible[0].reason, IneligibilityReason::SpecializationGpa);
        assert_eq!(report.gpa_filtered_specializations, vec!["finance".to_string()]);

        // A per-student override below the student's GPA flips it back.
        fx.params = EffectiveParams::resolve(
            &[
                crate::params::ParameterRow {
                    name: "min_gpa:finance".to_string(),
                    student_id: None,
                    value: 2.5,
                },
                crate::params::ParameterRow {
                    name: "min_gpa:finance".to_string(),
                    student_id: Some(fx.student.id),
                    value: 2.0,
                },
            ],
            fx.student.id,
        );
        let report = fx.resolve();
        assert_eq!(report.eligible, vec!["FIN301".to_string()]);
        assert!(report.gpa_filtered_specializations.is_empty());
    }

    #[test]
    fn credit_gate_restricts_upper_year_students_to_lower_years() {
        let mut fx = Fixture::new(3);
        fx.student.major = Some("finance".to_string());
        fx.student.minor = Some("statistics".to_string());
        fx.spec_gpas.insert("finance".to_string(), 3.5);
        fx.spec_gpas.insert("statistics".to_string(), 3.5);
        // Lower-year weight 8.0, gate at 75% needs 6.0 earned credits.
        fx.catalog.push(course("GEN101", 1, 1));
        fx.catalog.push(course("GEN102", 2, 1));
        let mut upper = course("FIN301", 3, 1);
        upper.major_tags = vec!["finance".to_string()];
        fx.catalog.push(upper);
        fx.cumulative_credits = 4.0;

        let report = fx.resolve();
        assert!(report.credit_gate_applied);
        // Only the lower-year catalog remains visible.
        assert_eq!(
            report.eligible,
            vec!["GEN101".to_string(), "GEN102".to_string()]
        );
        assert_eq!(report.ineligible[0].code, "FIN301");
        assert_eq!(report.ineligible[0].reason, IneligibilityReason::CreditGate);

        fx.cumulative_credits = 6.0;
        let report = fx.resolve();
        assert!(!report.credit_gate_applied);
        assert_eq!(report.eligible, vec!["FIN301".to_string()]);
    }

    #[test]
    fn elective_group_withheld_when_related_course_not_offered() {
        let mut fx = Fixture::new(2);
        let mut elective = course("ART210", 2, 1);
        elective.elective_group = Some("arts".to_string());
        fx.catalog.push(elective);
        // Related course exists only in the spring slot.
        fx.catalog.push(course("ART200", 2, 2));
        fx.groups.push(ElectiveGroup {
            name: "arts".to_string(),
            required_picks: 1,
            max_picks: 2,
            follows_major: None,
            related_course: Some("ART200".to_string()),
        });

        let report = fx.resolve();
        assert_eq!(
            report.ineligible[0].reason,
            IneligibilityReason::ElectiveGroupWithheld
        );
    }

    #[test]
    fn elective_group_follows_accepted_major() {
        let mut fx = Fixture::new(2);
        let mut elective = course("FIN210", 2, 1);
        elective.elective_group = Some("finance-electives".to_string());
        fx.catalog.push(elective);
        fx.groups.push(ElectiveGroup {
            name: "finance-electives".to_string(),
            required_picks: 1,
            max_picks: 1,
            follows_major: Some("finance".to_string()),
            related_course: None,
        });

        let report = fx.resolve();
        assert_eq!(
            report.ineligible[0].reason,
            IneligibilityReason::ElectiveGroupWithheld
        );

        fx.student.major = Some("finance".to_string());
        let report = fx.resolve();
        assert_eq!(report.eligible, vec!["FIN210".to_string()]);
    }

    #[test]
    fn credit_gate_keeps_withheld_elective_groups_withheld() {
        let mut fx = Fixture::new(3);
        fx.student.major = Some("finance".to_string());
        fx.student.minor = Some("statistics".to_string());
        fx.spec_gpas.insert("finance".to_string(), 3.5);
        fx.spec_gpas.insert("statistics".to_string(), 3.5);
        fx.catalog.push(course("GEN101", 1, 1));
        let mut elective = course("ART210", 2, 1);
        elective.elective_group = Some("arts".to_string());
        fx.catalog.push(elective);
        // Related course exists only in the spring slot, so the whole group
        // is withheld this term.
        fx.catalog.push(course("ART200", 2, 2));
        fx.groups.push(ElectiveGroup {
            name: "arts".to_string(),
            required_picks: 1,
            max_picks: 2,
            follows_major: None,
            related_course: Some("ART200".to_string()),
        });
        fx.cumulative_credits = 0.0;

        let report = fx.resolve();
        assert!(report.credit_gate_applied);
        // The gate widens the offering to the lower years but never past a
        // withheld group.
        assert_eq!(report.eligible, vec!["GEN101".to_string()]);
        let art = report
            .ineligible
            .iter()
            .find(|c| c.code == "ART210")
            .unwrap();
        assert_eq!(art.reason, IneligibilityReason::ElectiveGroupWithheld);
    }

    #[test]
    fn elective_group_follows_either_declared_major() {
        let mut fx = Fixture::new(2);
        let mut elective = course("ECON210", 2, 1);
        elective.elective_group = Some("econ-electives".to_string());
        fx.catalog.push(elective);
        fx.groups.push(ElectiveGroup {
            name: "econ-electives".to_string(),
            required_picks: 1,
            max_picks: 1,
            follows_major: Some("economics".to_string()),
            related_course: None,
        });
        fx.student.major = Some("finance".to_string());
        fx.student.second_major = Some("economics".to_string());

        let report = fx.resolve();
        assert_eq!(report.eligible, vec!["ECON210".to_string()]);
    }

    #[test]
    fn minor_year_override_and_major_filter_gate_minor_courses() {
        let mut fx = Fixture::new(3);
        fx.student.major = Some("finance".to_string());
        fx.student.minor = Some("statistics".to_string());
        fx.cumulative_credits = 100.0;
        fx.spec_gpas.insert("finance".to_string(), 3.0);
        fx.spec_gpas.insert("statistics".to_string(), 3.0);

        // Catalog year 2, but offered to the minor in year 3.
        let mut c = course("STAT320", 2, 1);
        c.minor_tag = Some("statistics".to_string());
        c.minor_year = Some(3);
        c.minor_major_filter = vec!["finance".to_string()];
        fx.catalog.push(c);

        let report = fx.resolve();
        assert_eq!(report.eligible, vec!["STAT320".to_string()]);

        // Restricting the minor to a different major hides the course.
        fx.catalog[0].minor_major_filter = vec!["economics".to_string()];
        let report = fx.resolve();
        assert!(report.eligible.is_empty());
    }

    #[test]
    fn language_flagged_courses_hidden_from_non_language_track() {
        let mut fx = Fixture::new(1);
        let mut c = course("LANG110", 1, 1);
        c.language_flag = true;
        fx.catalog.push(c);

        let report = fx.resolve();
        assert!(report.eligible.is_empty());

        fx.student.language_track = true;
        let report = fx.resolve();
        assert_eq!(report.eligible, vec!["LANG110".to_string()]);
    }
}
