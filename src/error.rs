use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// What a specific student/course pair is blocking an operation on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingIssue {
    UngradedEnrollment,
    MissingGradePoint,
}

/// One offending entity behind a precondition failure, structured so the
/// admin console can point at the exact row to fix.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingEntity {
    pub student_id: Uuid,
    pub course_code: String,
    pub issue: BlockingIssue,
}

/// Errors surfaced by core operations. Every variant except `Persistence`
/// is raised before any write; `Persistence` always follows a full rollback.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input rejected before touching the store.
    #[error("{0}")]
    Validation(String),

    /// The operation conflicts with current lifecycle state.
    #[error("{0}")]
    StateConflict(String),

    /// A business precondition failed; `blocking` lists every offender.
    #[error("{message}")]
    Precondition {
        message: String,
        blocking: Vec<BlockingEntity>,
    },

    /// No matching student, window, or request.
    #[error("{0}")]
    NotFound(String),

    /// Unexpected store failure. The enclosing transaction was rolled back.
    #[error("storage failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Rows that decoded with an unknown enum tag or missing column count as
    /// store corruption, not caller error.
    pub fn corrupt_row(detail: impl Into<String>) -> Self {
        Self::Persistence(sqlx::Error::Decode(detail.into().into()))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
