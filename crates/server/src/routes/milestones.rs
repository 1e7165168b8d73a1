use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::Milestone,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

const STATUSES: [&str; 4] = ["pending", "in-progress", "completed", "overdue"];
const PRIORITIES: [&str; 4] = ["low", "medium", "high", "critical"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_milestones).post(create_milestone))
        .route(
            "/:id",
            axum::routing::put(update_milestone).delete(delete_milestone),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project_id: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MilestoneResponse {
    #[serde(flatten)]
    pub milestone: Milestone,
    pub project_title: Option<String>,
    pub time_remaining: String,
}

/// Human-readable distance to the due date, mirroring what the dashboard
/// displays next to each milestone.
fn time_remaining(status: &str, due_date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if status == "completed" {
        return "Completed".to_string();
    }
    if due_date < now {
        return "Overdue".to_string();
    }

    let days = {
        let ms = (due_date - now).num_milliseconds();
        (ms as f64 / 86_400_000.0).ceil() as i64
    };

    match days {
        0 => "Due today".to_string(),
        1 => "1 day remaining".to_string(),
        2..=6 => format!("{days} days remaining"),
        7..=29 => {
            let weeks = days / 7;
            format!("{weeks} week{} remaining", if weeks > 1 { "s" } else { "" })
        }
        _ => {
            let months = days / 30;
            format!("{months} month{} remaining", if months > 1 { "s" } else { "" })
        }
    }
}

fn respond(milestone: Milestone, project_title: Option<String>, now: DateTime<Utc>) -> MilestoneResponse {
    let time_remaining = time_remaining(&milestone.status, milestone.due_date, now);
    MilestoneResponse {
        milestone,
        project_title,
        time_remaining,
    }
}

/// Sweep past-due, non-completed milestones to `overdue` before reading.
async fn sweep_overdue(pool: &sqlx::SqlitePool, user_id: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE milestones SET status = 'overdue', updated_at = ? WHERE user_id = ? AND due_date < ? AND status NOT IN ('completed', 'overdue')",
    )
    .bind(now.to_rfc3339())
    .bind(user_id)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

async fn list_milestones(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MilestoneResponse>>> {
    let now = Utc::now();
    sweep_overdue(&state.db.pool, &user.id, now).await?;

    let sort_by = match query.sort_by.as_deref() {
        Some("priority") => "priority",
        Some("created_at") => "created_at",
        Some("title") => "title",
        _ => "due_date",
    };
    let sort_order = match query.sort_order.as_deref() {
        Some("desc") => "DESC",
        _ => "ASC",
    };

    let mut sql = String::from(
        r#"
        SELECT m.*, p.title AS project_title
        FROM milestones m
        LEFT JOIN research_projects p ON m.project_id = p.id
        WHERE m.user_id = ?
        "#,
    );
    if query.status.is_some() {
        sql.push_str(" AND m.status = ?");
    }
    if query.priority.is_some() {
        sql.push_str(" AND m.priority = ?");
    }
    if query.project_id.is_some() {
        sql.push_str(" AND m.project_id = ?");
    }
    sql.push_str(&format!(" ORDER BY m.{sort_by} {sort_order}"));

    let mut q = sqlx::query_as::<_, MilestoneWithProject>(&sql).bind(&user.id);
    if let Some(ref status) = query.status {
        q = q.bind(status);
    }
    if let Some(ref priority) = query.priority {
        q = q.bind(priority);
    }
    if let Some(ref project_id) = query.project_id {
        q = q.bind(project_id);
    }

    let rows = q.fetch_all(&state.db.pool).await?;

    Ok(Json(
        rows.into_iter()
            .map(|row| respond(row.milestone, row.project_title, now))
            .collect(),
    ))
}

#[derive(Debug, sqlx::FromRow)]
struct MilestoneWithProject {
    #[sqlx(flatten)]
    milestone: Milestone,
    project_title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMilestoneRequest {
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub priority: Option<String>,
    pub project_id: Option<String>,
    pub notes: Option<String>,
}

async fn create_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateMilestoneRequest>,
) -> Result<Json<MilestoneResponse>> {
    if body.title.trim().is_empty() || body.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Please provide title, description, and due date".to_string(),
        ));
    }
    if body.title.len() > 100 {
        return Err(AppError::Validation(
            "Title cannot be more than 100 characters".to_string(),
        ));
    }
    if body.description.len() > 500 {
        return Err(AppError::Validation(
            "Description cannot be more than 500 characters".to_string(),
        ));
    }
    if let Some(ref notes) = body.notes {
        if notes.len() > 1000 {
            return Err(AppError::Validation(
                "Notes cannot be more than 1000 characters".to_string(),
            ));
        }
    }

    let now = Utc::now();
    // Compare calendar dates so a due date later today still passes.
    if body.due_date.date_naive() < now.date_naive() {
        return Err(AppError::Validation(
            "Due date cannot be in the past".to_string(),
        ));
    }

    let priority = body.priority.unwrap_or_else(|| "medium".to_string());
    if !PRIORITIES.contains(&priority.as_str()) {
        return Err(AppError::Validation(format!(
            "Priority must be one of: {}",
            PRIORITIES.join(", ")
        )));
    }

    // A linked project must exist and belong to the caller.
    if let Some(ref project_id) = body.project_id {
        let owned = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM research_projects WHERE id = ? AND owner_id = ?",
        )
        .bind(project_id)
        .bind(&user.id)
        .fetch_one(&state.db.pool)
        .await?;
        if owned == 0 {
            return Err(AppError::NotFound(
                "Research project not found".to_string(),
            ));
        }
    }

    let milestone_id = Uuid::new_v4().to_string();
    let now_str = now.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO milestones
            (id, user_id, project_id, title, description, due_date, status, priority, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)
        "#,
    )
    .bind(&milestone_id)
    .bind(&user.id)
    .bind(&body.project_id)
    .bind(body.title.trim())
    .bind(body.description.trim())
    .bind(body.due_date.to_rfc3339())
    .bind(&priority)
    .bind(body.notes.as_deref().map(str::trim).unwrap_or(""))
    .bind(&now_str)
    .bind(&now_str)
    .execute(&state.db.pool)
    .await?;

    let milestone = sqlx::query_as::<_, Milestone>("SELECT * FROM milestones WHERE id = ?")
        .bind(&milestone_id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(respond(milestone, None, now)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMilestoneRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project_id: Option<String>,
    pub notes: Option<String>,
}

async fn update_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateMilestoneRequest>,
) -> Result<Json<MilestoneResponse>> {
    let milestone = sqlx::query_as::<_, Milestone>("SELECT * FROM milestones WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Milestone not found".to_string()))?;

    if milestone.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to update this milestone".to_string(),
        ));
    }

    if let Some(ref status) = body.status {
        if !STATUSES.contains(&status.as_str()) {
            return Err(AppError::Validation(format!(
                "Status must be one of: {}",
                STATUSES.join(", ")
            )));
        }
    }
    if let Some(ref priority) = body.priority {
        if !PRIORITIES.contains(&priority.as_str()) {
            return Err(AppError::Validation(format!(
                "Priority must be one of: {}",
                PRIORITIES.join(", ")
            )));
        }
    }

    let now = Utc::now();
    let status = body.status.unwrap_or(milestone.status);

    // completed_at tracks the completed status transition.
    let completed_at = if status == "completed" {
        milestone.completed_at.or(Some(now))
    } else {
        None
    };

    let title = body.title.unwrap_or(milestone.title);
    let description = body.description.unwrap_or(milestone.description);
    let due_date = body.due_date.unwrap_or(milestone.due_date);
    let priority = body.priority.unwrap_or(milestone.priority);
    let project_id = body.project_id.or(milestone.project_id);
    let notes = body.notes.unwrap_or(milestone.notes);

    sqlx::query(
        r#"
        UPDATE milestones SET
            title = ?, description = ?, due_date = ?, status = ?, priority = ?,
            project_id = ?, notes = ?, completed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(due_date.to_rfc3339())
    .bind(&status)
    .bind(&priority)
    .bind(&project_id)
    .bind(&notes)
    .bind(completed_at.map(|d| d.to_rfc3339()))
    .bind(now.to_rfc3339())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let row = sqlx::query_as::<_, MilestoneWithProject>(
        r#"
        SELECT m.*, p.title AS project_title
        FROM milestones m
        LEFT JOIN research_projects p ON m.project_id = p.id
        WHERE m.id = ?
        "#,
    )
    .bind(&id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(respond(row.milestone, row.project_title, now)))
}

async fn delete_milestone(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let owner = sqlx::query_scalar::<_, String>("SELECT user_id FROM milestones WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Milestone not found".to_string()))?;

    if owner != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to delete this milestone".to_string(),
        ));
    }

    sqlx::query("DELETE FROM milestones WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Milestone deleted successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn completed_milestones_show_completed() {
        assert_eq!(time_remaining("completed", at(2020, 1, 1), at(2025, 1, 1)), "Completed");
    }

    #[test]
    fn past_due_shows_overdue() {
        assert_eq!(time_remaining("pending", at(2025, 1, 1), at(2025, 1, 2)), "Overdue");
    }

    #[test]
    fn near_due_counts_days() {
        let now = at(2025, 1, 1);
        assert_eq!(time_remaining("pending", now, now), "Due today");
        assert_eq!(
            time_remaining("pending", now + Duration::days(1), now),
            "1 day remaining"
        );
        assert_eq!(
            time_remaining("pending", now + Duration::days(4), now),
            "4 days remaining"
        );
    }

    #[test]
    fn longer_spans_use_weeks_and_months() {
        let now = at(2025, 1, 1);
        assert_eq!(
            time_remaining("pending", now + Duration::days(10), now),
            "1 week remaining"
        );
        assert_eq!(
            time_remaining("pending", now + Duration::days(21), now),
            "3 weeks remaining"
        );
        assert_eq!(
            time_remaining("in-progress", now + Duration::days(45), now),
            "1 month remaining"
        );
        assert_eq!(
            time_remaining("pending", now + Duration::days(200), now),
            "6 months remaining"
        );
    }
}
