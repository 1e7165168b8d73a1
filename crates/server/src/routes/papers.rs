use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::Paper,
    error::{AppError, Result},
    middleware::auth::{auth_middleware, AuthUser},
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_paper))
        .route("/user", get(list_user_papers))
        .route(
            "/:id",
            get(get_paper).put(update_paper).delete(delete_paper),
        )
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    // Browsing and PDF download are open; publishing is not.
    Router::new()
        .route("/", get(list_papers))
        .route("/pdf/:pdf_id", get(download_pdf))
        .merge(protected)
}

#[derive(Debug, Deserialize)]
pub struct ListPapersQuery {
    pub query: Option<String>,
    pub author: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Pagination {
        Pagination {
            total,
            page,
            limit,
            pages: if limit > 0 { (total + limit - 1) / limit } else { 0 },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaperListResponse {
    pub papers: Vec<Paper>,
    pub pagination: Pagination,
}

async fn list_papers(
    State(state): State<AppState>,
    Query(query): Query<ListPapersQuery>,
) -> Result<Json<PaperListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let mut filters = String::new();
    if query.query.is_some() {
        filters.push_str(" AND (title LIKE ? OR description LIKE ?)");
    }
    if query.author.is_some() {
        filters.push_str(" AND author_name LIKE ?");
    }
    if query.date_from.is_some() {
        filters.push_str(" AND created_at >= ?");
    }
    if query.date_to.is_some() {
        filters.push_str(" AND created_at <= ?");
    }

    let sort_by = match query.sort_by.as_deref() {
        Some("title") => "title",
        Some("updated_at") => "updated_at",
        _ => "created_at",
    };
    let sort_order = match query.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };

    let count_sql = format!("SELECT COUNT(*) FROM papers WHERE 1=1{filters}");
    let total = bind_filters(sqlx::query_as::<_, (i64,)>(&count_sql), &query)
        .fetch_one(&state.db.pool)
        .await?
        .0;

    let list_sql = format!(
        "SELECT * FROM papers WHERE 1=1{filters} ORDER BY {sort_by} {sort_order} LIMIT ? OFFSET ?"
    );
    let papers = bind_filters(sqlx::query_as::<_, Paper>(&list_sql), &query)
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(PaperListResponse {
        papers,
        pagination: Pagination::new(total, page, limit),
    }))
}

// Count and page queries share the same filter placeholders.
fn bind_filters<'q, O>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &ListPapersQuery,
) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(ref text) = filter.query {
        let pattern = format!("%{text}%");
        q = q.bind(pattern.clone()).bind(pattern);
    }
    if let Some(ref author) = filter.author {
        q = q.bind(format!("%{author}%"));
    }
    if let Some(from) = filter.date_from {
        q = q.bind(from.to_rfc3339());
    }
    if let Some(to) = filter.date_to {
        q = q.bind(to.to_rfc3339());
    }
    q
}

/// Text fields and the PDF pulled out of a multipart submission.
struct PaperUpload {
    title: Option<String>,
    description: Option<String>,
    role: Option<String>,
    pdf: Option<Vec<u8>>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<PaperUpload> {
    let mut upload = PaperUpload {
        title: None,
        description: None,
        role: None,
        pdf: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        match field.name() {
            Some("title") => {
                upload.title = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read title: {e}"))
                })?);
            }
            Some("description") => {
                upload.description = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read description: {e}"))
                })?);
            }
            Some("role") => {
                upload.role = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read role: {e}"))
                })?);
            }
            Some("pdf") => {
                let data = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read PDF upload: {e}"))
                })?;
                upload.pdf = Some(data.to_vec());
            }
            _ => {}
        }
    }

    Ok(upload)
}

async fn create_paper(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<Paper>> {
    let upload = read_multipart(multipart).await?;

    let title = upload
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Title is required".to_string()))?;
    let description = upload
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Description is required".to_string()))?;
    let pdf = upload
        .pdf
        .filter(|data| !data.is_empty())
        .ok_or_else(|| AppError::Validation("PDF file required".to_string()))?;
    let author_role = upload.role.unwrap_or_else(|| user.role.clone());

    let pdf_id = state.pdf_store.store(&pdf).await?;

    let paper_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO papers
            (id, title, description, author_name, author_role, user_id, pdf_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&paper_id)
    .bind(title.trim())
    .bind(description.trim())
    .bind(&user.name)
    .bind(&author_role)
    .bind(&user.id)
    .bind(&pdf_id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    let paper = sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE id = ?")
        .bind(&paper_id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(paper))
}

async fn list_user_papers(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Paper>>> {
    let papers = sqlx::query_as::<_, Paper>(
        "SELECT * FROM papers WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(papers))
}

async fn load_owned(pool: &sqlx::SqlitePool, paper_id: &str, user_id: &str) -> Result<Paper> {
    let paper = sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE id = ?")
        .bind(paper_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Paper not found".to_string()))?;

    if paper.user_id != user_id {
        return Err(AppError::Forbidden(
            "Not authorized to access this paper".to_string(),
        ));
    }
    Ok(paper)
}

async fn get_paper(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Paper>> {
    let paper = load_owned(&state.db.pool, &id, &user.id).await?;
    Ok(Json(paper))
}

async fn update_paper(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Paper>> {
    let paper = load_owned(&state.db.pool, &id, &user.id).await?;
    let upload = read_multipart(multipart).await?;

    // A replacement PDF swaps the stored blob.
    let pdf_id = match upload.pdf.filter(|data| !data.is_empty()) {
        Some(data) => {
            state.pdf_store.delete(&paper.pdf_id).await?;
            state.pdf_store.store(&data).await?
        }
        None => paper.pdf_id.clone(),
    };

    let title = upload
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(paper.title);
    let description = upload
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(paper.description);
    let author_role = upload.role.unwrap_or(paper.author_role);

    sqlx::query(
        "UPDATE papers SET title = ?, description = ?, author_role = ?, pdf_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(title.trim())
    .bind(description.trim())
    .bind(&author_role)
    .bind(&pdf_id)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let paper = sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(paper))
}

async fn delete_paper(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let paper = load_owned(&state.db.pool, &id, &user.id).await?;

    state.pdf_store.delete(&paper.pdf_id).await?;

    sqlx::query("DELETE FROM papers WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Paper deleted" })))
}

async fn download_pdf(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
) -> Result<Response> {
    let data = state.pdf_store.read(&pdf_id).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build PDF response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_page_count_up() {
        assert_eq!(Pagination::new(0, 1, 10).pages, 0);
        assert_eq!(Pagination::new(10, 1, 10).pages, 1);
        assert_eq!(Pagination::new(11, 1, 10).pages, 2);
        assert_eq!(Pagination::new(25, 2, 10).pages, 3);
    }
}
