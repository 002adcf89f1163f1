use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db;
use crate::error::{CoreError, CoreResult};
use crate::models::{AdminContext, Window, WindowKind, WindowStatus, WindowStatusView};

/// Status a window should report at `now`. Promotion is one-way: a scheduled
/// window whose start has passed reads as open, an open window whose end has
/// passed reads as closed. Closed is terminal.
pub fn effective_status(window: &Window, now: DateTime<Utc>) -> WindowStatus {
    match window.status {
        WindowStatus::Closed => WindowStatus::Closed,
        WindowStatus::Scheduled if now < window.start_at => WindowStatus::Scheduled,
        WindowStatus::Scheduled | WindowStatus::Open if now >= window.end_at => WindowStatus::Closed,
        _ => WindowStatus::Open,
    }
}

/// Loads the latest window of `kind`, persisting any lazy promotion its
/// stored status is due for, and returns the promoted record.
async fn promoted_latest(
    pool: &PgPool,
    clock: &dyn Clock,
    kind: WindowKind,
) -> CoreResult<Option<Window>> {
    let Some(mut window) = db::latest_window(pool, kind).await? else {
        return Ok(None);
    };
    let status = effective_status(&window, clock.now());
    if status != window.status {
        db::set_window_status(pool, window.id, status, None).await?;
        window.status = status;
    }
    Ok(Some(window))
}

pub async fn start(
    pool: &PgPool,
    clock: &dyn Clock,
    ctx: &AdminContext,
    kind: WindowKind,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
) -> CoreResult<Window> {
    let now = clock.now();
    if end_at <= now {
        return Err(CoreError::validation("end date must be in the future"));
    }
    if start_at >= end_at {
        return Err(CoreError::validation("start date must precede end date"));
    }

    let mut tx = pool.begin().await?;
    // At most one non-closed window per kind: anything still live is
    // force-closed before the replacement is created.
    for stale in db::non_closed_windows(&mut *tx, kind).await? {
        db::set_window_status(&mut *tx, stale.id, WindowStatus::Closed, Some(&ctx.admin)).await?;
    }

    let status = if start_at > now {
        WindowStatus::Scheduled
    } else {
        WindowStatus::Open
    };
    let window = Window {
        id: Uuid::new_v4(),
        kind,
        status,
        start_at,
        end_at,
        opened_by: ctx.admin.clone(),
        closed_by: None,
    };
    db::insert_window(&mut *tx, &window).await?;
    tx.commit().await?;

    info!(
        kind = kind.as_str(),
        status = status.as_str(),
        admin = %ctx.admin,
        "window started"
    );
    Ok(window)
}

pub async fn close(
    pool: &PgPool,
    clock: &dyn Clock,
    ctx: &AdminContext,
    kind: WindowKind,
) -> CoreResult<()> {
    let window = promoted_latest(pool, clock, kind)
        .await?
        .filter(|w| w.status == WindowStatus::Open)
        .ok_or_else(|| CoreError::not_found(format!("no active {} window", kind.as_str())))?;

    db::set_window_status(pool, window.id, WindowStatus::Closed, Some(&ctx.admin)).await?;
    info!(kind = kind.as_str(), admin = %ctx.admin, "window closed");
    Ok(())
}

pub async fn cancel(
    pool: &PgPool,
    clock: &dyn Clock,
    ctx: &AdminContext,
    kind: WindowKind,
) -> CoreResult<()> {
    let window = promoted_latest(pool, clock, kind)
        .await?
        .filter(|w| w.status == WindowStatus::Scheduled)
        .ok_or_else(|| CoreError::not_found(format!("no scheduled {} window", kind.as_str())))?;

    db::set_window_status(pool, window.id, WindowStatus::Closed, Some(&ctx.admin)).await?;
    info!(kind = kind.as_str(), admin = %ctx.admin, "scheduled window cancelled");
    Ok(())
}

pub async fn status(
    pool: &PgPool,
    clock: &dyn Clock,
    kind: WindowKind,
) -> CoreResult<WindowStatusView> {
    let view = match promoted_latest(pool, clock, kind).await? {
        Some(window) => WindowStatusView {
            is_open: window.status == WindowStatus::Open,
            is_scheduled: window.status == WindowStatus::Scheduled,
            start: Some(window.start_at),
            end: Some(window.end_at),
        },
        None => WindowStatusView {
            is_open: false,
            is_scheduled: false,
            start: None,
            end: None,
        },
    };
    Ok(view)
}

/// True when the latest window of `kind` reads open at `now`. Used by the
/// registration and specialization entry points.
pub async fn is_open(pool: &PgPool, clock: &dyn Clock, kind: WindowKind) -> CoreResult<bool> {
    Ok(status(pool, clock, kind).await?.is_open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window(status: WindowStatus, start_offset_min: i64, end_offset_min: i64) -> (Window, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let w = Window {
            id: Uuid::new_v4(),
            kind: WindowKind::Registration,
            status,
            start_at: now + Duration::minutes(start_offset_min),
            end_at: now + Duration::minutes(end_offset_min),
            opened_by: "registrar".to_string(),
            closed_by: None,
        };
        (w, now)
    }

    #[test]
    fn scheduled_stays_scheduled_before_start() {
        let (w, now) = window(WindowStatus::Scheduled, 30, 90);
        assert_eq!(effective_status(&w, now), WindowStatus::Scheduled);
    }

    #[test]
    fn scheduled_promotes_to_open_once_start_passes() {
        let (w, now) = window(WindowStatus::Scheduled, -5, 90);
        assert_eq!(effective_status(&w, now), WindowStatus::Open);
    }

    #[test]
    fn scheduled_skips_straight_to_closed_when_end_passed() {
        let (w, now) = window(WindowStatus::Scheduled, -120, -30);
        assert_eq!(effective_status(&w, now), WindowStatus::Closed);
    }

    #[test]
    fn open_promotes_to_closed_once_end_passes() {
        let (w, now) = window(WindowStatus::Open, -120, -1);
        assert_eq!(effective_status(&w, now), WindowStatus::Closed);
    }

    #[test]
    fn open_stays_open_inside_range() {
        let (w, now) = window(WindowStatus::Open, -10, 50);
        assert_eq!(effective_status(&w, now), WindowStatus::Open);
    }

    #[test]
    fn closed_is_terminal() {
        let (w, now) = window(WindowStatus::Closed, -10, 50);
        assert_eq!(effective_status(&w, now), WindowStatus::Closed);
    }
}
