use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::BudgetEntry,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/project/:project_id",
            get(list_entries).post(create_entry),
        )
        .route("/project/:project_id/summary", get(budget_summary))
        .route(
            "/project/:project_id/:budget_id",
            axum::routing::put(update_entry).delete(delete_entry),
        )
}

// Budget entries hang off a project, so every operation starts with an
// ownership check against the project record.
async fn check_project_owner(
    pool: &sqlx::SqlitePool,
    project_id: &str,
    user_id: &str,
) -> Result<f64> {
    let project = sqlx::query_as::<_, (String, f64)>(
        "SELECT owner_id, estimated_budget FROM research_projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Research project not found".to_string()))?;

    if project.0 != user_id {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(project.1)
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub category: String,
    pub cost: f64,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub category: Option<String>,
    pub cost: Option<f64>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

async fn list_entries(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<BudgetEntry>>> {
    check_project_owner(&state.db.pool, &project_id, &user.id).await?;

    let entries = sqlx::query_as::<_, BudgetEntry>(
        "SELECT * FROM budget_entries WHERE project_id = ? ORDER BY entry_date DESC",
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(entries))
}

async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateEntryRequest>,
) -> Result<Json<BudgetEntry>> {
    check_project_owner(&state.db.pool, &project_id, &user.id).await?;

    if body.category.trim().is_empty() {
        return Err(AppError::Validation("Category is required".to_string()));
    }
    if body.cost < 0.0 {
        return Err(AppError::Validation(
            "Cost must be a positive number".to_string(),
        ));
    }

    let entry_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO budget_entries
            (id, project_id, category, cost, entry_date, description, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry_id)
    .bind(&project_id)
    .bind(body.category.trim())
    .bind(body.cost)
    .bind(body.date.to_rfc3339())
    .bind(body.description.as_deref().map(str::trim).unwrap_or(""))
    .bind(&user.id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let entry = sqlx::query_as::<_, BudgetEntry>("SELECT * FROM budget_entries WHERE id = ?")
        .bind(&entry_id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct EntryPathParams {
    pub project_id: String,
    pub budget_id: String,
}

async fn load_entry(
    pool: &sqlx::SqlitePool,
    params: &EntryPathParams,
    user_id: &str,
) -> Result<BudgetEntry> {
    let entry = sqlx::query_as::<_, BudgetEntry>(
        "SELECT * FROM budget_entries WHERE id = ? AND project_id = ?",
    )
    .bind(&params.budget_id)
    .bind(&params.project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Budget entry not found".to_string()))?;

    if entry.created_by != user_id {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(entry)
}

async fn update_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<EntryPathParams>,
    Json(body): Json<UpdateEntryRequest>,
) -> Result<Json<BudgetEntry>> {
    check_project_owner(&state.db.pool, &params.project_id, &user.id).await?;
    let entry = load_entry(&state.db.pool, &params, &user.id).await?;

    if let Some(cost) = body.cost {
        if cost < 0.0 {
            return Err(AppError::Validation(
                "Cost must be a positive number".to_string(),
            ));
        }
    }

    let category = body
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or(entry.category);
    let cost = body.cost.unwrap_or(entry.cost);
    let entry_date = body.date.unwrap_or(entry.entry_date);
    let description = body
        .description
        .map(|d| d.trim().to_string())
        .unwrap_or(entry.description);

    sqlx::query(
        "UPDATE budget_entries SET category = ?, cost = ?, entry_date = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&category)
    .bind(cost)
    .bind(entry_date.to_rfc3339())
    .bind(&description)
    .bind(Utc::now().to_rfc3339())
    .bind(&entry.id)
    .execute(&state.db.pool)
    .await?;

    let entry = sqlx::query_as::<_, BudgetEntry>("SELECT * FROM budget_entries WHERE id = ?")
        .bind(&entry.id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(entry))
}

async fn delete_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<EntryPathParams>,
) -> Result<Json<serde_json::Value>> {
    check_project_owner(&state.db.pool, &params.project_id, &user.id).await?;
    let entry = load_entry(&state.db.pool, &params, &user.id).await?;

    sqlx::query("DELETE FROM budget_entries WHERE id = ?")
        .bind(&entry.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Budget entry deleted successfully"
    })))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct BudgetSummary {
    pub total_spent: f64,
    pub estimated_budget: f64,
    pub budget_usage_percentage: f64,
    pub category_totals: BTreeMap<String, f64>,
    pub entry_count: usize,
}

fn summarize(entries: &[(String, f64)], estimated_budget: f64) -> BudgetSummary {
    let total_spent: f64 = entries.iter().map(|(_, cost)| cost).sum();

    let mut category_totals = BTreeMap::new();
    for (category, cost) in entries {
        *category_totals.entry(category.clone()).or_insert(0.0) += cost;
    }

    let usage = if estimated_budget > 0.0 {
        (total_spent / estimated_budget) * 100.0
    } else {
        0.0
    };

    BudgetSummary {
        total_spent,
        estimated_budget,
        budget_usage_percentage: (usage * 100.0).round() / 100.0,
        category_totals,
        entry_count: entries.len(),
    }
}

async fn budget_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<BudgetSummary>> {
    let estimated_budget = check_project_owner(&state.db.pool, &project_id, &user.id).await?;

    let entries = sqlx::query_as::<_, (String, f64)>(
        "SELECT category, cost FROM budget_entries WHERE project_id = ?",
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(summarize(&entries, estimated_budget)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_totals_group_by_category() {
        let entries = vec![
            ("Equipment".to_string(), 1200.0),
            ("Travel".to_string(), 300.5),
            ("Equipment".to_string(), 799.5),
        ];
        let summary = summarize(&entries, 10_000.0);

        assert_eq!(summary.total_spent, 2300.0);
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.category_totals["Equipment"], 1999.5);
        assert_eq!(summary.category_totals["Travel"], 300.5);
        assert_eq!(summary.budget_usage_percentage, 23.0);
    }

    #[test]
    fn summary_usage_rounds_to_two_decimals() {
        let entries = vec![("Misc".to_string(), 1.0)];
        let summary = summarize(&entries, 3.0);
        assert_eq!(summary.budget_usage_percentage, 33.33);
    }

    #[test]
    fn summary_without_estimate_reports_zero_usage() {
        let entries = vec![("Misc".to_string(), 500.0)];
        let summary = summarize(&entries, 0.0);
        assert_eq!(summary.budget_usage_percentage, 0.0);
        assert_eq!(summary.total_spent, 500.0);
    }
}
