use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Notification,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::notify,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(create_notification))
        .route("/read-all", put(mark_all_read))
        .route("/:id/read", put(mark_read))
        .route("/:id", delete(delete_notification))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub only_unread: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub total_pages: i64,
    pub current_page: i64,
    pub total_notifications: i64,
    pub unread_count: i64,
}

async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let only_unread = query.only_unread.unwrap_or(false);

    let unread_filter = if only_unread { " AND is_read = 0" } else { "" };

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?{unread_filter}"
    ))
    .bind(&user.id)
    .fetch_one(&state.db.pool)
    .await?;

    let notifications = sqlx::query_as::<_, Notification>(&format!(
        "SELECT * FROM notifications WHERE recipient_id = ?{unread_filter} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    ))
    .bind(&user.id)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.db.pool)
    .await?;

    let unread_count = notify::unread_count(&state.db.pool, &user.id).await?;

    Ok(Json(NotificationListResponse {
        notifications,
        total_pages: (total + limit - 1) / limit,
        current_page: page,
        total_notifications: total,
        unread_count,
    }))
}

async fn load_own(
    pool: &sqlx::SqlitePool,
    notification_id: &str,
    user_id: &str,
) -> Result<Notification> {
    let notification =
        sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(notification_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

    if notification.recipient_id != user_id {
        return Err(AppError::Forbidden(
            "Not authorized to access this notification".to_string(),
        ));
    }
    Ok(notification)
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Notification>> {
    let notification = load_own(&state.db.pool, &id, &user.id).await?;

    sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
        .bind(&notification.id)
        .execute(&state.db.pool)
        .await?;

    let notification = load_own(&state.db.pool, &id, &user.id).await?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>> {
    sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0")
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "All notifications marked as read"
    })))
}

async fn delete_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let notification = load_own(&state.db.pool, &id, &user.id).await?;

    sqlx::query("DELETE FROM notifications WHERE id = ?")
        .bind(&notification.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Notification removed" })))
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub related_item: Option<String>,
}

async fn create_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateNotificationRequest>,
) -> Result<Json<Notification>> {
    if user.role != "admin" && user.role != "researcher" {
        return Err(AppError::Forbidden(
            "Not authorized to create notifications".to_string(),
        ));
    }
    if body.title.trim().is_empty() || body.message.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and message are required".to_string(),
        ));
    }

    let notification_id = notify::create_notification(
        &state.db.pool,
        &body.recipient,
        "survey",
        &body.title,
        &body.message,
        body.related_item.as_deref(),
    )
    .await?;

    let notification =
        sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(&notification_id)
            .fetch_one(&state.db.pool)
            .await?;

    Ok(Json(notification))
}
