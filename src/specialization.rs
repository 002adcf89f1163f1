use sqlx::PgPool;
use tracing::info;

use crate::clock::Clock;
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::models::{AdminContext, RequestStatus, WindowKind};

/// The two supported request shapes, fixed at the request boundary so no
/// later code re-derives the shape from strings. Double-minor requests are
/// rejected outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combination {
    MajorMajor { first: String, second: String },
    MajorMinor { major: String, minor: String },
}

impl Combination {
    /// Builds the tagged shape out of raw request fields.
    pub fn from_fields(
        major: Option<&str>,
        second_major: Option<&str>,
        minor: Option<&str>,
        second_minor: Option<&str>,
    ) -> CoreResult<Self> {
        match (major, second_major, minor, second_minor) {
            (Some(first), Some(second), None, None) => Ok(Self::MajorMajor {
                first: first.to_string(),
                second: second.to_string(),
            }),
            (Some(major), None, Some(minor), None) => Ok(Self::MajorMinor {
                major: major.to_string(),
                minor: minor.to_string(),
            }),
            (None, None, Some(_), Some(_)) | (None, None, Some(_), None) => Err(
                CoreError::validation("minor-only combinations are not supported"),
            ),
            _ => Err(CoreError::validation(
                "combination must be major+major or major+minor",
            )),
        }
    }

    pub fn key(&self) -> String {
        match self {
            Self::MajorMajor { first, second } => format!("mm:{first}|{second}"),
            Self::MajorMinor { major, minor } => format!("mn:{major}|{minor}"),
        }
    }

    /// Same combination with the two majors swapped; only meaningful for the
    /// major-major shape. Used as the fallback lookup when the stored order
    /// differs from the requested one.
    pub fn swapped(&self) -> Option<Self> {
        match self {
            Self::MajorMajor { first, second } => Some(Self::MajorMajor {
                first: second.clone(),
                second: first.clone(),
            }),
            Self::MajorMinor { .. } => None,
        }
    }

    /// Student/request field values for this shape, in
    /// (major, second_major, minor, second_minor) order.
    pub fn fields(&self) -> (Option<&str>, Option<&str>, Option<&str>, Option<&str>) {
        match self {
            Self::MajorMajor { first, second } => (Some(first), Some(second), None, None),
            Self::MajorMinor { major, minor } => (Some(major), None, Some(minor), None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    Pending,
}

impl Decision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accept" => Some(Self::Accept),
            "reject" => Some(Self::Reject),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Files (or re-files) a pending request for one student. Only possible
/// while the specialization window is open and the combination is not
/// sitting behind a recorded rejection.
pub async fn submit(
    pool: &PgPool,
    clock: &dyn Clock,
    student_code: &str,
    combination: &Combination,
) -> CoreResult<()> {
    if !crate::windows::is_open(pool, clock, WindowKind::Specialization).await? {
        return Err(CoreError::state_conflict(
            "the specialization selection window is not open",
        ));
    }
    if combination_blocked(pool, combination).await? {
        return Err(CoreError::state_conflict(
            "this combination was rejected; ask the registrar to clear it first",
        ));
    }

    let student = db::student_by_code(pool, student_code)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("no student with code {student_code}")))?;

    let mut tx = pool.begin().await?;
    db::upsert_specialization_request(&mut *tx, student.id, combination).await?;
    tx.commit().await?;
    info!(student = student_code, key = combination.key(), "specialization request submitted");
    Ok(())
}

async fn combination_blocked(pool: &PgPool, combination: &Combination) -> CoreResult<bool> {
    if db::rejected_combination_exists(pool, &combination.key()).await? {
        return Ok(true);
    }
    if let Some(swapped) = combination.swapped() {
        return db::rejected_combination_exists(pool, &swapped.key()).await;
    }
    Ok(false)
}

/// Resolves requests matching the combination, falling back to the swapped
/// major order when the exact shape matches nothing.
async fn matching_requests(
    tx: &mut sqlx::PgConnection,
    combination: &Combination,
) -> CoreResult<(Combination, Vec<crate::models::SpecializationRequest>)> {
    let requests = db::requests_by_combination(&mut *tx, combination).await?;
    if !requests.is_empty() {
        return Ok((combination.clone(), requests));
    }
    if let Some(swapped) = combination.swapped() {
        let requests = db::requests_by_combination(&mut *tx, &swapped).await?;
        if !requests.is_empty() {
            return Ok((swapped, requests));
        }
    }
    Err(CoreError::not_found(format!(
        "no requests match combination {}",
        combination.key()
    )))
}

#[derive(Debug)]
pub struct DecisionReport {
    pub students_updated: usize,
    pub decision: Decision,
}

/// Applies one admin decision to every request sharing the combination.
/// Accept copies the fields onto each student, reject wipes them and records
/// the block, pending wipes them without a block (the undo path).
pub async fn decide(
    pool: &PgPool,
    ctx: &AdminContext,
    combination: &Combination,
    decision: Decision,
) -> CoreResult<DecisionReport> {
    let mut tx = pool.begin().await?;
    let (resolved, requests) = matching_requests(&mut tx, combination).await?;

    let status = match decision {
        Decision::Accept => RequestStatus::Accepted,
        Decision::Reject => RequestStatus::Rejected,
        Decision::Pending => RequestStatus::Pending,
    };

    for request in &requests {
        match decision {
            Decision::Accept => {
                db::set_student_specializations(&mut *tx, request.student_id, Some(&resolved))
                    .await?;
            }
            Decision::Reject | Decision::Pending => {
                db::set_student_specializations(&mut *tx, request.student_id, None).await?;
            }
        }
        db::set_request_status(&mut *tx, request.id, status).await?;
    }

    if decision == Decision::Reject {
        db::upsert_rejected_combination(&mut *tx, &resolved.key()).await?;
    }

    tx.commit().await?;
    info!(
        key = resolved.key(),
        admin = %ctx.admin,
        students = requests.len(),
        decision = ?decision,
        "combination decided"
    );
    Ok(DecisionReport {
        students_updated: requests.len(),
        decision,
    })
}

/// Clears a recorded rejection and re-opens the affected requests.
pub async fn remove_rejection(
    pool: &PgPool,
    ctx: &AdminContext,
    combination: &Combination,
) -> CoreResult<usize> {
    let mut tx = pool.begin().await?;

    let mut resolved = combination.clone();
    let mut removed = db::delete_rejected_combination(&mut *tx, &resolved.key()).await?;
    if removed == 0 {
        if let Some(swapped) = combination.swapped() {
            removed = db::delete_rejected_combination(&mut *tx, &swapped.key()).await?;
            resolved = swapped;
        }
    }
    if removed == 0 {
        return Err(CoreError::not_found(format!(
            "no recorded rejection for combination {}",
            combination.key()
        )));
    }

    let reopened = db::reset_rejected_requests(&mut *tx, &resolved).await?;
    tx.commit().await?;
    info!(key = resolved.key(), admin = %ctx.admin, reopened, "rejection cleared");
    Ok(reopened)
}
