use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Inserts a notification row. `kind` is "survey" for survey activity and
/// "system" for everything else.
pub async fn create_notification(
    pool: &SqlitePool,
    recipient_id: &str,
    kind: &str,
    title: &str,
    message: &str,
    related_item: Option<&str>,
) -> Result<String> {
    let notification_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, kind, title, message, related_item, is_read, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&notification_id)
    .bind(recipient_id)
    .bind(kind)
    .bind(title)
    .bind(message)
    .bind(related_item)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(notification_id)
}

/// Tells a survey's creator that someone answered it.
pub async fn notify_survey_response(
    pool: &SqlitePool,
    survey_id: &str,
    survey_title: &str,
    creator_id: &str,
    responder_name: &str,
) -> Result<()> {
    let message = format!("{responder_name} has answered your survey \"{survey_title}\"");
    create_notification(
        pool,
        creator_id,
        "survey",
        "New Survey Response",
        &message,
        Some(survey_id),
    )
    .await?;
    Ok(())
}

pub async fn unread_count(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Drops read notifications older than 30 days. Returns how many went.
pub async fn cleanup_old(pool: &SqlitePool) -> Result<u64> {
    let cutoff = (Utc::now() - Duration::days(30)).to_rfc3339();
    let result = sqlx::query("DELETE FROM notifications WHERE created_at < ? AND is_read = 1")
        .bind(&cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
