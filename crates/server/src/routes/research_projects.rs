use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::{ResearchProject, ResearchProjectRow},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    timeline::{self, PhaseKey, PhaseSet, ProjectedTimeline, Timeline},
    AppState,
};

const STATUSES: [&str; 4] = ["planning", "active", "on-hold", "completed"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_project))
        .route("/user", get(list_user_projects))
        .route("/stats", get(project_stats))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/:id/timeline", put(update_timeline))
        .route("/:id/timeline/phase", put(edit_phase_duration))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    pub research_field: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub expected_duration: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub estimated_budget: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub research_field: Option<String>,
    pub methodology: Option<String>,
    pub expected_duration: Option<String>,
    pub objectives: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub collaborators: Option<Vec<String>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub estimated_budget: Option<f64>,
}

/// A project as returned by the API: the stored record plus, whenever a
/// start date exists, the timeline projected against the current clock.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: ResearchProject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_timeline: Option<ProjectedTimeline>,
}

fn respond(row: ResearchProjectRow, now: DateTime<Utc>) -> ProjectResponse {
    let project = ResearchProject::from(row);
    let projected_timeline = match (&project.timeline, effective_start(&project)) {
        (Some(tl), Some(start)) => Some(timeline::project(&tl.phases, start, now)),
        (Some(_), None) => {
            // Without a start date the timeline cannot be placed on the
            // calendar; the caller just gets the stored durations.
            tracing::warn!(project_id = %project.id, "timeline present but no start date; skipping projection");
            None
        }
        _ => None,
    };
    ProjectResponse {
        project,
        projected_timeline,
    }
}

fn effective_start(project: &ResearchProject) -> Option<DateTime<Utc>> {
    project
        .timeline
        .as_ref()
        .and_then(|tl| tl.start_date)
        .or(project.start_date)
}

async fn load_owned(
    pool: &sqlx::SqlitePool,
    project_id: &str,
    owner_id: &str,
) -> Result<ResearchProjectRow> {
    sqlx::query_as::<_, ResearchProjectRow>(
        "SELECT * FROM research_projects WHERE id = ? AND owner_id = ?",
    )
    .bind(project_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Research project not found".to_string()))
}

fn validate_status(status: &str) -> Result<()> {
    if !STATUSES.contains(&status) {
        return Err(AppError::Validation(format!(
            "Status must be one of: {}",
            STATUSES.join(", ")
        )));
    }
    Ok(())
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if body.description.trim().is_empty() {
        return Err(AppError::Validation("Description is required".to_string()));
    }
    if body.research_field.trim().is_empty() {
        return Err(AppError::Validation(
            "Research field is required".to_string(),
        ));
    }

    let status = body.status.unwrap_or_else(|| "planning".to_string());
    validate_status(&status)?;

    let estimated_budget = body.estimated_budget.unwrap_or(0.0);
    if estimated_budget < 0.0 {
        return Err(AppError::Validation(
            "Estimated budget cannot be negative".to_string(),
        ));
    }

    // With both dates present the phase timeline is derived up front.
    let timeline = match (body.start_date, body.end_date) {
        (Some(start), Some(end)) => Some(timeline::derive_phases(start, end)),
        _ => None,
    };
    let timeline_json = timeline
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Internal(format!("Failed to encode timeline: {e}")))?;

    let project_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let now_str = now.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO research_projects
            (id, title, description, research_field, methodology, expected_duration,
             objectives, keywords, collaborators, start_date, end_date, status,
             estimated_budget, timeline, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&project_id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(&body.research_field)
    .bind(&body.methodology)
    .bind(&body.expected_duration)
    .bind(serde_json::to_string(&body.objectives).unwrap_or_else(|_| "[]".to_string()))
    .bind(serde_json::to_string(&body.keywords).unwrap_or_else(|_| "[]".to_string()))
    .bind(serde_json::to_string(&body.collaborators).unwrap_or_else(|_| "[]".to_string()))
    .bind(body.start_date.map(|d| d.to_rfc3339()))
    .bind(body.end_date.map(|d| d.to_rfc3339()))
    .bind(&status)
    .bind(estimated_budget)
    .bind(&timeline_json)
    .bind(&user.id)
    .bind(&now_str)
    .bind(&now_str)
    .execute(&state.db.pool)
    .await?;

    let row = load_owned(&state.db.pool, &project_id, &user.id).await?;
    Ok(Json(respond(row, now)))
}

async fn list_user_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ProjectResponse>>> {
    let rows = sqlx::query_as::<_, ResearchProjectRow>(
        "SELECT * FROM research_projects WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let now = Utc::now();
    Ok(Json(rows.into_iter().map(|row| respond(row, now)).collect()))
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProjectResponse>> {
    let row = load_owned(&state.db.pool, &id, &user.id).await?;
    Ok(Json(respond(row, Utc::now())))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let row = load_owned(&state.db.pool, &id, &user.id).await?;
    let current = ResearchProject::from(row);

    if let Some(ref status) = body.status {
        validate_status(status)?;
    }
    if let Some(budget) = body.estimated_budget {
        if budget < 0.0 {
            return Err(AppError::Validation(
                "Estimated budget cannot be negative".to_string(),
            ));
        }
    }

    let title = body.title.unwrap_or(current.title);
    let description = body.description.unwrap_or(current.description);
    let research_field = body.research_field.unwrap_or(current.research_field);
    let methodology = body.methodology.unwrap_or(current.methodology);
    let expected_duration = body.expected_duration.unwrap_or(current.expected_duration);
    let objectives = body.objectives.unwrap_or(current.objectives);
    let keywords = body.keywords.unwrap_or(current.keywords);
    let collaborators = body.collaborators.unwrap_or(current.collaborators);
    let start_date = body.start_date.or(current.start_date);
    let end_date = body.end_date.or(current.end_date);
    let status = body.status.unwrap_or(current.status);
    let estimated_budget = body.estimated_budget.unwrap_or(current.estimated_budget);

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE research_projects SET
            title = ?, description = ?, research_field = ?, methodology = ?,
            expected_duration = ?, objectives = ?, keywords = ?, collaborators = ?,
            start_date = ?, end_date = ?, status = ?, estimated_budget = ?, updated_at = ?
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&research_field)
    .bind(&methodology)
    .bind(&expected_duration)
    .bind(serde_json::to_string(&objectives).unwrap_or_else(|_| "[]".to_string()))
    .bind(serde_json::to_string(&keywords).unwrap_or_else(|_| "[]".to_string()))
    .bind(serde_json::to_string(&collaborators).unwrap_or_else(|_| "[]".to_string()))
    .bind(start_date.map(|d| d.to_rfc3339()))
    .bind(end_date.map(|d| d.to_rfc3339()))
    .bind(&status)
    .bind(estimated_budget)
    .bind(now.to_rfc3339())
    .bind(&id)
    .bind(&user.id)
    .execute(&state.db.pool)
    .await?;

    let row = load_owned(&state.db.pool, &id, &user.id).await?;
    Ok(Json(respond(row, now)))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM research_projects WHERE id = ? AND owner_id = ?")
        .bind(&id)
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Research project not found".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({
        "message": "Research project deleted successfully"
    })))
}

#[derive(Debug, Serialize)]
pub struct ProjectStatsResponse {
    pub total_projects: i64,
    pub summary: StatusSummary,
}

#[derive(Debug, Serialize, Default)]
pub struct StatusSummary {
    pub planning: i64,
    pub active: i64,
    pub on_hold: i64,
    pub completed: i64,
}

async fn project_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProjectStatsResponse>> {
    let counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM research_projects WHERE owner_id = ? GROUP BY status",
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut summary = StatusSummary::default();
    let mut total = 0;
    for (status, count) in counts {
        total += count;
        match status.as_str() {
            "planning" => summary.planning = count,
            "active" => summary.active = count,
            "on-hold" => summary.on_hold = count,
            "completed" => summary.completed = count,
            _ => {}
        }
    }

    Ok(Json(ProjectStatsResponse {
        total_projects: total,
        summary,
    }))
}

/// The timeline snapshot accepted on save. Fields are optional at the type
/// level so missing ones surface as validation errors rather than body
/// rejections; a transient projection may ride along and is discarded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSnapshot {
    pub phases: Option<PhaseSet>,
    pub total_duration: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[allow(dead_code)]
    pub phase_timeline: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTimelineRequest {
    pub timeline: Option<TimelineSnapshot>,
}

async fn update_timeline(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTimelineRequest>,
) -> Result<Json<ProjectResponse>> {
    let snapshot = body
        .timeline
        .ok_or_else(|| AppError::Validation("Timeline data is required".to_string()))?;

    let phases = snapshot
        .phases
        .ok_or_else(|| AppError::Validation("Timeline phases are required".to_string()))?;
    let total_duration = snapshot.total_duration.ok_or_else(|| {
        AppError::Validation("Timeline total duration is required".to_string())
    })?;

    for key in PhaseKey::ALL {
        if phases.get(key).duration < 1 {
            return Err(AppError::Validation(format!(
                "{} must last at least one day",
                key.title()
            )));
        }
    }

    let row = load_owned(&state.db.pool, &id, &user.id).await?;

    // Persisting confirms every phase.
    let timeline = Timeline {
        phases: phases.saved(),
        total_duration,
        start_date: snapshot.start_date,
        end_date: snapshot.end_date,
    };
    let timeline_json = serde_json::to_string(&timeline)
        .map_err(|e| AppError::Internal(format!("Failed to encode timeline: {e}")))?;

    // The snapshot's end date also becomes the project's own end date,
    // keeping the two in sync.
    let end_date = timeline.end_date.map(|d| d.to_rfc3339());
    let now = Utc::now();

    sqlx::query(
        "UPDATE research_projects SET timeline = ?, end_date = COALESCE(?, end_date), updated_at = ? WHERE id = ? AND owner_id = ?",
    )
    .bind(&timeline_json)
    .bind(&end_date)
    .bind(now.to_rfc3339())
    .bind(&row.id)
    .bind(&user.id)
    .execute(&state.db.pool)
    .await?;

    let row = load_owned(&state.db.pool, &id, &user.id).await?;
    Ok(Json(respond(row, now)))
}

#[derive(Debug, Deserialize)]
pub struct EditPhaseRequest {
    pub phase: PhaseKey,
    pub duration: i64,
}

/// Atomic phase edit: applies the new duration and recomputes the derived
/// totals in the same call, so a stale total duration is never observable.
async fn edit_phase_duration(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<EditPhaseRequest>,
) -> Result<Json<ProjectResponse>> {
    let row = load_owned(&state.db.pool, &id, &user.id).await?;
    let project = ResearchProject::from(row);

    // Start from the stored phases; derive or fall back to the stock
    // split when the project has no timeline yet.
    let (phases, start_date) = match &project.timeline {
        Some(tl) => (tl.phases.clone(), tl.start_date.or(project.start_date)),
        None => match (project.start_date, project.end_date) {
            (Some(start), Some(end)) => {
                let derived = timeline::derive_phases(start, end);
                (derived.phases, Some(start))
            }
            _ => (PhaseSet::default(), project.start_date),
        },
    };

    let edited = timeline::apply_duration_edit(&phases, body.phase, body.duration)?;
    let timeline = Timeline::from_phases(edited, start_date);
    let timeline_json = serde_json::to_string(&timeline)
        .map_err(|e| AppError::Internal(format!("Failed to encode timeline: {e}")))?;

    let end_date = timeline.end_date.map(|d| d.to_rfc3339());
    let now = Utc::now();

    sqlx::query(
        "UPDATE research_projects SET timeline = ?, end_date = COALESCE(?, end_date), updated_at = ? WHERE id = ? AND owner_id = ?",
    )
    .bind(&timeline_json)
    .bind(&end_date)
    .bind(now.to_rfc3339())
    .bind(&id)
    .bind(&user.id)
    .execute(&state.db.pool)
    .await?;

    let row = load_owned(&state.db.pool, &id, &user.id).await?;
    Ok(Json(respond(row, now)))
}
