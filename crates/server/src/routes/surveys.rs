use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::{Answer, AnswerMap, QuestionKind, Survey, SurveyQuestion, SurveyResponse, SurveyResponseRow, SurveyRow},
    error::{AppError, Result},
    middleware::auth::{auth_middleware, AuthUser},
    services::notify,
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_survey))
        .route("/user", get(list_user_surveys))
        .route("/user/answered", get(list_answered_surveys))
        .route(
            "/:id",
            get(get_survey).put(update_survey).delete(delete_survey),
        )
        .route("/:id/respond", post(submit_response))
        .route("/:id/responses", get(list_responses))
        .route("/:id/analytics", get(survey_analytics))
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/", get(list_surveys))
        .merge(protected)
}

/// Normalizes incoming questions: choice questions keep their non-empty
/// options (at least two required), text questions carry none.
fn validate_questions(questions: &mut [SurveyQuestion]) -> Result<()> {
    for (index, question) in questions.iter_mut().enumerate() {
        if question.text.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "Question {} must have a text",
                index + 1
            )));
        }
        match question.kind {
            QuestionKind::MultipleChoice | QuestionKind::Checkbox => {
                let valid_options: Vec<String> = question
                    .options
                    .iter()
                    .filter(|opt| !opt.trim().is_empty())
                    .cloned()
                    .collect();
                if valid_options.len() < 2 {
                    return Err(AppError::Validation(format!(
                        "Question {} must have at least 2 non-empty options",
                        index + 1
                    )));
                }
                question.options = valid_options;
            }
            QuestionKind::Text => {
                question.options = Vec::new();
            }
        }
    }
    Ok(())
}

/// Checks a response map against the survey's questions: indices must
/// resolve, and chosen options must exist on the question.
fn validate_answers(questions: &[SurveyQuestion], answers: &AnswerMap) -> Result<()> {
    for (index_str, answer) in answers {
        let question = index_str
            .parse::<usize>()
            .ok()
            .and_then(|index| questions.get(index))
            .ok_or_else(|| {
                AppError::Validation(format!("Invalid question index: {index_str}"))
            })?;

        match question.kind {
            QuestionKind::MultipleChoice => match answer {
                Answer::One(option) if question.options.contains(option) => {}
                _ => {
                    return Err(AppError::Validation(format!(
                        "Invalid option for question {index_str}"
                    )))
                }
            },
            QuestionKind::Checkbox => match answer {
                Answer::Many(options)
                    if options.iter().all(|opt| question.options.contains(opt)) => {}
                _ => {
                    return Err(AppError::Validation(format!(
                        "Invalid options for checkbox question {index_str}"
                    )))
                }
            },
            QuestionKind::Text => {}
        }
    }
    Ok(())
}

/// Per-question aggregate: collected free-text answers, or a count per
/// option for choice questions.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum QuestionAnalytics {
    Text { responses: Vec<String> },
    Choice { distribution: BTreeMap<String, i64> },
}

fn compute_analytics(
    questions: &[SurveyQuestion],
    responses: &[AnswerMap],
) -> Vec<QuestionAnalytics> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let key = index.to_string();
            match question.kind {
                QuestionKind::Text => QuestionAnalytics::Text {
                    responses: responses
                        .iter()
                        .filter_map(|answers| match answers.get(&key) {
                            Some(Answer::One(text)) if !text.is_empty() => Some(text.clone()),
                            _ => None,
                        })
                        .collect(),
                },
                QuestionKind::MultipleChoice | QuestionKind::Checkbox => {
                    let mut distribution: BTreeMap<String, i64> = question
                        .options
                        .iter()
                        .map(|opt| (opt.clone(), 0))
                        .collect();
                    for answers in responses {
                        match answers.get(&key) {
                            Some(Answer::One(option)) => {
                                *distribution.entry(option.clone()).or_insert(0) += 1;
                            }
                            Some(Answer::Many(options)) => {
                                for option in options {
                                    *distribution.entry(option.clone()).or_insert(0) += 1;
                                }
                            }
                            None => {}
                        }
                    }
                    QuestionAnalytics::Choice { distribution }
                }
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct CreateSurveyRequest {
    pub title: String,
    pub description: String,
    pub creator: Option<CreatorInput>,
    pub questions: Vec<SurveyQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct CreatorInput {
    pub role: Option<String>,
}

async fn create_survey(
    State(state): State<AppState>,
    user: AuthUser,
    Json(mut body): Json<CreateSurveyRequest>,
) -> Result<Json<Survey>> {
    if body.title.trim().is_empty() || body.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and description are required".to_string(),
        ));
    }
    validate_questions(&mut body.questions)?;

    let creator_role = body
        .creator
        .and_then(|c| c.role)
        .unwrap_or_else(|| user.role.clone());

    let survey_id = Uuid::new_v4().to_string();
    let questions_json = serde_json::to_string(&body.questions)
        .map_err(|e| AppError::Internal(format!("Failed to encode questions: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO surveys
            (id, title, description, creator_name, creator_role, user_id, questions, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&survey_id)
    .bind(body.title.trim())
    .bind(body.description.trim())
    .bind(&user.name)
    .bind(&creator_role)
    .bind(&user.id)
    .bind(&questions_json)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db.pool)
    .await?;

    let survey = load_survey(&state.db.pool, &survey_id).await?;
    Ok(Json(survey))
}

async fn load_survey(pool: &sqlx::SqlitePool, survey_id: &str) -> Result<Survey> {
    let row = sqlx::query_as::<_, SurveyRow>("SELECT * FROM surveys WHERE id = ?")
        .bind(survey_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Survey not found".to_string()))?;
    Ok(Survey::from(row))
}

async fn list_surveys(State(state): State<AppState>) -> Result<Json<Vec<Survey>>> {
    let rows = sqlx::query_as::<_, SurveyRow>("SELECT * FROM surveys ORDER BY created_at DESC")
        .fetch_all(&state.db.pool)
        .await?;
    Ok(Json(rows.into_iter().map(Survey::from).collect()))
}

async fn list_user_surveys(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Survey>>> {
    let rows = sqlx::query_as::<_, SurveyRow>(
        "SELECT * FROM surveys WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(rows.into_iter().map(Survey::from).collect()))
}

async fn list_answered_surveys(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Survey>>> {
    let rows = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT s.* FROM surveys s
        JOIN survey_responses r ON r.survey_id = s.id
        WHERE r.user_id = ?
        ORDER BY r.submitted_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(rows.into_iter().map(Survey::from).collect()))
}

async fn get_survey(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Survey>> {
    let survey = load_survey(&state.db.pool, &id).await?;
    Ok(Json(survey))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSurveyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub creator: Option<CreatorInput>,
    pub questions: Option<Vec<SurveyQuestion>>,
}

async fn update_survey(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateSurveyRequest>,
) -> Result<Json<Survey>> {
    let survey = load_survey(&state.db.pool, &id).await?;

    if survey.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to update this survey".to_string(),
        ));
    }

    let questions = match body.questions {
        Some(mut questions) => {
            validate_questions(&mut questions)?;
            questions
        }
        None => survey.questions,
    };

    let title = body
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(survey.title);
    let description = body
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(survey.description);
    let creator_role = body
        .creator
        .and_then(|c| c.role)
        .unwrap_or(survey.creator_role);

    let questions_json = serde_json::to_string(&questions)
        .map_err(|e| AppError::Internal(format!("Failed to encode questions: {e}")))?;

    sqlx::query(
        "UPDATE surveys SET title = ?, description = ?, creator_role = ?, questions = ? WHERE id = ?",
    )
    .bind(&title)
    .bind(&description)
    .bind(&creator_role)
    .bind(&questions_json)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let survey = load_survey(&state.db.pool, &id).await?;
    Ok(Json(survey))
}

async fn delete_survey(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let survey = load_survey(&state.db.pool, &id).await?;

    if survey.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to delete this survey".to_string(),
        ));
    }

    sqlx::query("DELETE FROM survey_responses WHERE survey_id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;
    sqlx::query("DELETE FROM surveys WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Survey deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub responses: AnswerMap,
}

async fn submit_response(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SubmitResponseRequest>,
) -> Result<Json<serde_json::Value>> {
    let survey = load_survey(&state.db.pool, &id).await?;

    let already = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM survey_responses WHERE survey_id = ? AND user_id = ?",
    )
    .bind(&id)
    .bind(&user.id)
    .fetch_one(&state.db.pool)
    .await?;

    if already > 0 {
        return Err(AppError::Validation(
            "You have already responded to this survey".to_string(),
        ));
    }

    validate_answers(&survey.questions, &body.responses)?;

    let response_id = Uuid::new_v4().to_string();
    let responses_json = serde_json::to_string(&body.responses)
        .map_err(|e| AppError::Internal(format!("Failed to encode responses: {e}")))?;

    sqlx::query(
        "INSERT INTO survey_responses (id, survey_id, user_id, responses, submitted_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&response_id)
    .bind(&id)
    .bind(&user.id)
    .bind(&responses_json)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db.pool)
    .await?;

    // Tell the survey's creator; a failed notification shouldn't undo the
    // submission.
    if let Err(e) =
        notify::notify_survey_response(&state.db.pool, &id, &survey.title, &survey.user_id, &user.name)
            .await
    {
        tracing::warn!("failed to create survey response notification: {e}");
    }

    Ok(Json(serde_json::json!({ "message": "Response submitted" })))
}

async fn list_responses(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<SurveyResponse>>> {
    let survey = load_survey(&state.db.pool, &id).await?;

    if survey.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to view these responses".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, SurveyResponseRow>(
        "SELECT * FROM survey_responses WHERE survey_id = ? ORDER BY submitted_at ASC",
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(rows.into_iter().map(SurveyResponse::from).collect()))
}

async fn survey_analytics(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<QuestionAnalytics>>> {
    let survey = load_survey(&state.db.pool, &id).await?;

    if survey.user_id != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to view these analytics".to_string(),
        ));
    }

    let rows = sqlx::query_as::<_, SurveyResponseRow>(
        "SELECT * FROM survey_responses WHERE survey_id = ?",
    )
    .bind(&id)
    .fetch_all(&state.db.pool)
    .await?;

    let answer_maps: Vec<AnswerMap> = rows
        .into_iter()
        .map(|row| SurveyResponse::from(row).responses)
        .collect();

    Ok(Json(compute_analytics(&survey.questions, &answer_maps)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(kind: QuestionKind, options: &[&str]) -> SurveyQuestion {
        SurveyQuestion {
            text: "How was it?".to_string(),
            kind,
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn answers(entries: &[(&str, Answer)]) -> AnswerMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn choice_questions_need_two_real_options() {
        let mut questions = vec![question(QuestionKind::MultipleChoice, &["Yes", "  "])];
        assert!(validate_questions(&mut questions).is_err());

        let mut questions = vec![question(QuestionKind::MultipleChoice, &["Yes", " ", "No"])];
        validate_questions(&mut questions).unwrap();
        assert_eq!(questions[0].options, vec!["Yes", "No"]);
    }

    #[test]
    fn text_questions_drop_their_options() {
        let mut questions = vec![question(QuestionKind::Text, &["stray"])];
        validate_questions(&mut questions).unwrap();
        assert!(questions[0].options.is_empty());
    }

    #[test]
    fn answers_must_match_question_options() {
        let questions = vec![
            question(QuestionKind::MultipleChoice, &["Yes", "No"]),
            question(QuestionKind::Checkbox, &["A", "B", "C"]),
            question(QuestionKind::Text, &[]),
        ];

        validate_answers(
            &questions,
            &answers(&[
                ("0", Answer::One("Yes".to_string())),
                ("1", Answer::Many(vec!["A".to_string(), "C".to_string()])),
                ("2", Answer::One("free text".to_string())),
            ]),
        )
        .unwrap();

        // Unknown option
        let err = validate_answers(&questions, &answers(&[("0", Answer::One("Maybe".into()))]));
        assert!(err.is_err());

        // Wrong shape for a checkbox
        let err = validate_answers(&questions, &answers(&[("1", Answer::One("A".into()))]));
        assert!(err.is_err());

        // Out-of-range index
        let err = validate_answers(&questions, &answers(&[("9", Answer::One("Yes".into()))]));
        assert!(err.is_err());
    }

    #[test]
    fn analytics_counts_options_and_collects_text() {
        let questions = vec![
            question(QuestionKind::MultipleChoice, &["Yes", "No"]),
            question(QuestionKind::Checkbox, &["A", "B"]),
            question(QuestionKind::Text, &[]),
        ];
        let responses = vec![
            answers(&[
                ("0", Answer::One("Yes".into())),
                ("1", Answer::Many(vec!["A".into(), "B".into()])),
                ("2", Answer::One("great".into())),
            ]),
            answers(&[
                ("0", Answer::One("Yes".into())),
                ("1", Answer::Many(vec!["B".into()])),
            ]),
        ];

        let analytics = compute_analytics(&questions, &responses);

        match &analytics[0] {
            QuestionAnalytics::Choice { distribution } => {
                assert_eq!(distribution["Yes"], 2);
                assert_eq!(distribution["No"], 0);
            }
            other => panic!("unexpected analytics shape: {other:?}"),
        }
        match &analytics[1] {
            QuestionAnalytics::Choice { distribution } => {
                assert_eq!(distribution["A"], 1);
                assert_eq!(distribution["B"], 2);
            }
            other => panic!("unexpected analytics shape: {other:?}"),
        }
        match &analytics[2] {
            QuestionAnalytics::Text { responses } => {
                assert_eq!(responses, &vec!["great".to_string()]);
            }
            other => panic!("unexpected analytics shape: {other:?}"),
        }
    }
}
