use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Identity of the admin performing an operation. Passed explicitly into
/// every mutating call and recorded on windows and calendar rows.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin: String,
}

impl AdminContext {
    pub fn new(admin: impl Into<String>) -> Self {
        Self {
            admin: admin.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnrollmentStatus {
    Enrolled,
    Graduated,
    Dismissed,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::Graduated => "graduated",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "enrolled" => Some(Self::Enrolled),
            "graduated" => Some(Self::Graduated),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StudentLevel {
    Freshman,
    Sophomore,
    Junior,
}

impl StudentLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Freshman => "freshman",
            Self::Sophomore => "sophomore",
            Self::Junior => "junior",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "freshman" => Some(Self::Freshman),
            "sophomore" => Some(Self::Sophomore),
            "junior" => Some(Self::Junior),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub code: String,
    pub full_name: String,
    pub year_of_study: i32,
    pub enrollment_status: EnrollmentStatus,
    pub level: StudentLevel,
    pub major: Option<String>,
    pub second_major: Option<String>,
    pub minor: Option<String>,
    pub second_minor: Option<String>,
    pub language_track: bool,
}

impl Student {
    /// Declared specialization tracks, in declaration order.
    pub fn declared_specializations(&self) -> Vec<&str> {
        [
            self.major.as_deref(),
            self.second_major.as_deref(),
            self.minor.as_deref(),
            self.second_minor.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Immutable catalog entry. `minor_year` overrides `year` when the course is
/// reached through its minor tag, and `minor_major_filter` narrows which
/// declared majors may take it that way.
#[derive(Debug, Clone)]
pub struct Course {
    pub code: String,
    pub title: String,
    pub coefficient: f64,
    pub year: i32,
    pub semester: i32,
    pub language_flag: bool,
    pub major_tags: Vec<String>,
    pub minor_tag: Option<String>,
    pub minor_year: Option<i32>,
    pub minor_major_filter: Vec<String>,
    pub elective_group: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ElectiveGroup {
    pub name: String,
    pub required_picks: i32,
    pub max_picks: i32,
    pub follows_major: Option<String>,
    pub related_course: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptStatus {
    Enrolled,
    Passed,
    Failed,
    NotEnrolled,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::NotEnrolled => "notenrolled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "enrolled" => Some(Self::Enrolled),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "notenrolled" => Some(Self::NotEnrolled),
            _ => None,
        }
    }
}

/// One row per registration of a student on a course. Append-only: the highest
/// id per (student, course) is the authoritative standing.
#[derive(Debug, Clone)]
pub struct CourseAttempt {
    pub id: i64,
    pub student_id: Uuid,
    pub course_code: String,
    pub status: AttemptStatus,
    pub letter_grade: Option<String>,
    pub grade_point: Option<f64>,
    pub forgiven: bool,
    pub year: i32,
    pub semester: i32,
}

#[derive(Debug, Clone)]
pub struct SemesterSummary {
    pub student_id: Uuid,
    pub year: i32,
    pub semester: i32,
    pub cumulative_credits: f64,
    pub cumulative_gpa: Option<f64>,
    pub spec_gpas: HashMap<String, f64>,
    pub probation_counter: i32,
    pub forgiveness_counter: i32,
}

pub const SEMESTER_FALL: i32 = 1;
pub const SEMESTER_SPRING: i32 = 2;
pub const SEMESTER_MAKEUP: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarSlot {
    pub year: i32,
    pub semester: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowKind {
    Registration,
    Specialization,
    Makeup,
}

impl WindowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Specialization => "specialization",
            Self::Makeup => "makeup",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "registration" => Some(Self::Registration),
            "specialization" => Some(Self::Specialization),
            "makeup" => Some(Self::Makeup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowStatus {
    Scheduled,
    Open,
    Closed,
}

impl WindowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(Self::Scheduled),
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Window {
    pub id: Uuid,
    pub kind: WindowKind,
    pub status: WindowStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub opened_by: String,
    pub closed_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowStatusView {
    pub is_open: bool,
    pub is_scheduled: bool,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpecializationRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub major: Option<String>,
    pub second_major: Option<String>,
    pub minor: Option<String>,
    pub second_minor: Option<String>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone)]
pub struct ProbationExtensionRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}
