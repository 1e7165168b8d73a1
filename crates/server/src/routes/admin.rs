use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Paper, SurveyRow, User},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::papers::Pagination,
    services::notify,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(platform_stats))
        .route("/users", get(list_users))
        .route("/users/:user_id/role", put(update_user_role))
        .route("/users/:user_id/status", put(toggle_user_status))
        .route("/papers", get(list_all_papers))
        .route("/surveys", get(list_all_surveys))
        .route("/broadcast", post(broadcast_notification))
}

fn require_admin(user: &AuthUser) -> Result<()> {
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to access admin controls".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub users: UserStats,
    pub papers: PaperStats,
    pub surveys: SurveyStats,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub researchers: i64,
    pub participants: i64,
    pub admins: i64,
    pub new_last_week: i64,
}

#[derive(Debug, Serialize)]
pub struct PaperStats {
    pub total: i64,
    pub new_last_week: i64,
}

#[derive(Debug, Serialize)]
pub struct SurveyStats {
    pub total: i64,
    pub total_responses: i64,
    pub new_last_week: i64,
}

async fn count(pool: &sqlx::SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
}

async fn count_since(pool: &sqlx::SqlitePool, sql: &str, cutoff: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql)
        .bind(cutoff)
        .fetch_one(pool)
        .await?)
}

async fn platform_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PlatformStats>> {
    require_admin(&user)?;

    let pool = &state.db.pool;
    let week_ago = (Utc::now() - Duration::days(7)).to_rfc3339();

    let stats = PlatformStats {
        users: UserStats {
            total: count(pool, "SELECT COUNT(*) FROM users").await?,
            researchers: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'researcher'")
                .await?,
            participants: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'user'").await?,
            admins: count(pool, "SELECT COUNT(*) FROM users WHERE role = 'admin'").await?,
            new_last_week: count_since(
                pool,
                "SELECT COUNT(*) FROM users WHERE created_at >= ?",
                &week_ago,
            )
            .await?,
        },
        papers: PaperStats {
            total: count(pool, "SELECT COUNT(*) FROM papers").await?,
            new_last_week: count_since(
                pool,
                "SELECT COUNT(*) FROM papers WHERE created_at >= ?",
                &week_ago,
            )
            .await?,
        },
        surveys: SurveyStats {
            total: count(pool, "SELECT COUNT(*) FROM surveys").await?,
            total_responses: count(pool, "SELECT COUNT(*) FROM survey_responses").await?,
            new_last_week: count_since(
                pool,
                "SELECT COUNT(*) FROM surveys WHERE created_at >= ?",
                &week_ago,
            )
            .await?,
        },
    };

    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>> {
    require_admin(&user)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let role = query.role.filter(|r| r != "all");
    let search = query.search.filter(|s| !s.trim().is_empty());

    let mut filters = String::new();
    if role.is_some() {
        filters.push_str(" AND role = ?");
    }
    if search.is_some() {
        filters.push_str(" AND (full_name LIKE ? OR email LIKE ?)");
    }

    let sort_by = match query.sort_by.as_deref() {
        Some("full_name") => "full_name",
        Some("email") => "email",
        Some("role") => "role",
        _ => "created_at",
    };
    let sort_order = match query.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };

    let count_sql = format!("SELECT COUNT(*) FROM users WHERE 1=1{filters}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(ref role) = role {
        count_query = count_query.bind(role.clone());
    }
    if let Some(ref search) = search {
        let pattern = format!("%{search}%");
        count_query = count_query.bind(pattern.clone()).bind(pattern);
    }
    let total = count_query.fetch_one(&state.db.pool).await?;

    let list_sql = format!(
        "SELECT * FROM users WHERE 1=1{filters} ORDER BY {sort_by} {sort_order} LIMIT ? OFFSET ?"
    );
    let mut list_query = sqlx::query_as::<_, User>(&list_sql);
    if let Some(ref role) = role {
        list_query = list_query.bind(role.clone());
    }
    if let Some(ref search) = search {
        let pattern = format!("%{search}%");
        list_query = list_query.bind(pattern.clone()).bind(pattern);
    }
    let users = list_query
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(UserListResponse {
        users,
        pagination: Pagination::new(total, page, limit),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

async fn update_user_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&user)?;

    if !["researcher", "user", "admin"].contains(&body.role.as_str()) {
        return Err(AppError::Validation("Invalid role specified".to_string()));
    }

    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(&body.role)
        .bind(&user_id)
        .execute(&state.db.pool)
        .await?;

    let message = format!(
        "Your account has been updated to {} role by the administrator.",
        body.role
    );
    if let Err(e) = notify::create_notification(
        &state.db.pool,
        &user_id,
        "system",
        "Role Updated",
        &message,
        None,
    )
    .await
    {
        tracing::warn!("failed to create role-change notification: {e}");
    }

    Ok(Json(serde_json::json!({
        "message": "User role updated successfully",
        "user": {
            "id": target.id,
            "full_name": target.full_name,
            "email": target.email,
            "role": body.role,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleStatusRequest {
    pub status: bool,
}

async fn toggle_user_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
    Json(body): Json<ToggleStatusRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&user)?;

    // An admin locking themselves out is unrecoverable from the console.
    if user_id == user.id && !body.status {
        return Err(AppError::Validation(
            "Cannot disable your own admin account".to_string(),
        ));
    }

    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    sqlx::query("UPDATE users SET active = ? WHERE id = ?")
        .bind(body.status)
        .bind(&user_id)
        .execute(&state.db.pool)
        .await?;

    let (title, message) = if body.status {
        (
            "Account Enabled",
            "Your account has been enabled by the administrator.".to_string(),
        )
    } else {
        (
            "Account Disabled",
            "Your account has been disabled by the administrator. Please contact support for assistance."
                .to_string(),
        )
    };
    if let Err(e) =
        notify::create_notification(&state.db.pool, &user_id, "system", title, &message, None)
            .await
    {
        tracing::warn!("failed to create status-change notification: {e}");
    }

    Ok(Json(serde_json::json!({
        "message": format!(
            "User account {} successfully",
            if body.status { "enabled" } else { "disabled" }
        ),
        "user": {
            "id": target.id,
            "full_name": target.full_name,
            "email": target.email,
            "active": body.status,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminPaperListResponse {
    pub papers: Vec<Paper>,
    pub pagination: Pagination,
}

async fn list_all_papers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<AdminPaperListResponse>> {
    require_admin(&user)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let search = query.search.filter(|s| !s.trim().is_empty());
    let sort_order = match query.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };

    let filter = if search.is_some() {
        " AND (title LIKE ? OR description LIKE ? OR author_name LIKE ?)"
    } else {
        ""
    };

    let count_sql = format!("SELECT COUNT(*) FROM papers WHERE 1=1{filter}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(ref search) = search {
        let pattern = format!("%{search}%");
        count_query = count_query
            .bind(pattern.clone())
            .bind(pattern.clone())
            .bind(pattern);
    }
    let total = count_query.fetch_one(&state.db.pool).await?;

    let list_sql = format!(
        "SELECT * FROM papers WHERE 1=1{filter} ORDER BY created_at {sort_order} LIMIT ? OFFSET ?"
    );
    let mut list_query = sqlx::query_as::<_, Paper>(&list_sql);
    if let Some(ref search) = search {
        let pattern = format!("%{search}%");
        list_query = list_query
            .bind(pattern.clone())
            .bind(pattern.clone())
            .bind(pattern);
    }
    let papers = list_query
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(AdminPaperListResponse {
        papers,
        pagination: Pagination::new(total, page, limit),
    }))
}

#[derive(Debug, Serialize)]
pub struct AdminSurveyListResponse {
    pub surveys: Vec<crate::db::models::Survey>,
    pub pagination: Pagination,
}

async fn list_all_surveys(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<AdminSurveyListResponse>> {
    require_admin(&user)?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let search = query.search.filter(|s| !s.trim().is_empty());
    let sort_order = match query.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };

    let filter = if search.is_some() {
        " AND (title LIKE ? OR description LIKE ?)"
    } else {
        ""
    };

    let count_sql = format!("SELECT COUNT(*) FROM surveys WHERE 1=1{filter}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(ref search) = search {
        let pattern = format!("%{search}%");
        count_query = count_query.bind(pattern.clone()).bind(pattern);
    }
    let total = count_query.fetch_one(&state.db.pool).await?;

    let list_sql = format!(
        "SELECT * FROM surveys WHERE 1=1{filter} ORDER BY created_at {sort_order} LIMIT ? OFFSET ?"
    );
    let mut list_query = sqlx::query_as::<_, SurveyRow>(&list_sql);
    if let Some(ref search) = search {
        let pattern = format!("%{search}%");
        list_query = list_query.bind(pattern.clone()).bind(pattern);
    }
    let surveys = list_query
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(AdminSurveyListResponse {
        surveys: surveys.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(total, page, limit),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    pub target_role: Option<String>,
}

async fn broadcast_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>> {
    require_admin(&user)?;

    if body.title.trim().is_empty() || body.message.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and message are required".to_string(),
        ));
    }

    let target_role = body.target_role.filter(|r| r != "all");

    let recipients = match target_role {
        Some(ref role) => {
            sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE role = ?")
                .bind(role)
                .fetch_all(&state.db.pool)
                .await?
        }
        None => {
            sqlx::query_scalar::<_, String>("SELECT id FROM users")
                .fetch_all(&state.db.pool)
                .await?
        }
    };

    for recipient_id in &recipients {
        notify::create_notification(
            &state.db.pool,
            recipient_id,
            "system",
            &body.title,
            &body.message,
            None,
        )
        .await?;
    }

    Ok(Json(serde_json::json!({
        "message": format!("Notification sent to {} users", recipients.len()),
        "recipients": recipients.len(),
    })))
}
