use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    services::ai::ChatMessage,
    AppState,
};

const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant for research management. Provide clear, accurate, and helpful responses.";
const PROPOSAL_SYSTEM_PROMPT: &str =
    "You are an expert in creating research proposals. Generate comprehensive, professional research proposals.";
const REVIEW_SYSTEM_PROMPT: &str =
    "You are an expert reviewer for academic and research papers. Provide constructive, detailed feedback.";

// Reviewed paper content is capped to keep prompts inside provider limits.
const REVIEW_CONTENT_LIMIT: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/proposal", post(generate_proposal))
        .route("/review", post(review_paper))
        .route("/status", get(ai_status))
        .route("/provider", post(switch_provider))
}

fn ensure_configured(state: &AppState) -> Result<()> {
    if !state.ai.configured() {
        return Err(AppError::Unavailable(
            "AI service is not configured. Please contact administrator.".to_string(),
        ));
    }
    Ok(())
}

/// A chat turn as the client sends it: who said it, and the text.
#[derive(Debug, Deserialize)]
pub struct HistoryMessage {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub message: String,
    pub provider: &'static str,
    pub timestamp: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<GenerationResponse>> {
    if body.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message is required.".to_string()));
    }
    ensure_configured(&state)?;

    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        content: CHAT_SYSTEM_PROMPT.to_string(),
    }];
    for turn in &body.history {
        messages.push(ChatMessage {
            role: if turn.sender == "user" {
                "user".to_string()
            } else {
                "assistant".to_string()
            },
            content: turn.text.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: body.message,
    });

    let reply = state.ai.chat_completion(&messages).await?;

    Ok(Json(GenerationResponse {
        message: reply,
        provider: state.ai.current_provider().name(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProposalRequest {
    pub title: String,
    #[serde(default)]
    pub objectives: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub budget: String,
}

#[derive(Debug, Serialize)]
pub struct ProposalResponse {
    pub proposal: String,
    pub provider: &'static str,
    pub timestamp: String,
}

async fn generate_proposal(
    State(state): State<AppState>,
    Json(body): Json<ProposalRequest>,
) -> Result<Json<ProposalResponse>> {
    if body.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required.".to_string()));
    }
    ensure_configured(&state)?;

    let prompt = format!(
        r#"Generate a comprehensive research proposal with the following details:
      Title: {}
      Research Objectives: {}
      Methodology: {}
      Timeline: {}
      Budget: {}

      Format the proposal with the following sections:
      1. Executive Summary
      2. Introduction
      3. Research Objectives
      4. Literature Review
      5. Methodology
      6. Timeline and Milestones
      7. Budget Breakdown
      8. Expected Outcomes
      9. Conclusion

      Make the proposal well-structured, professional, and ready for submission."#,
        body.title, body.objectives, body.methodology, body.timeline, body.budget
    );

    let proposal = state
        .ai
        .generate_content(&prompt, Some(PROPOSAL_SYSTEM_PROMPT))
        .await?;

    Ok(Json(ProposalResponse {
        proposal,
        provider: state.ai.current_provider().name(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub content: String,
    pub focus_areas: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: String,
    pub provider: &'static str,
    pub timestamp: String,
}

async fn review_paper(
    State(state): State<AppState>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>> {
    if body.content.trim().is_empty() {
        return Err(AppError::BadRequest("Content is required.".to_string()));
    }
    ensure_configured(&state)?;

    let truncated: String = body.content.chars().take(REVIEW_CONTENT_LIMIT).collect();
    let truncation_note = if body.content.chars().count() > REVIEW_CONTENT_LIMIT {
        " ... (truncated for length)"
    } else {
        ""
    };
    let focus = body
        .focus_areas
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| "methodology, clarity, structure, and scientific rigor".to_string());

    let prompt = format!(
        r#"Review the following research paper content:

    {truncated}{truncation_note}

    Focus your review on these aspects: {focus}

    Provide your feedback in this format:
    1. Overall Assessment
    2. Strengths
    3. Areas for Improvement
    4. Specific Recommendations
    5. Conclusion"#
    );

    let review = state
        .ai
        .generate_content(&prompt, Some(REVIEW_SYSTEM_PROMPT))
        .await?;

    Ok(Json(ReviewResponse {
        review,
        provider: state.ai.current_provider().name(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub available: Vec<&'static str>,
    pub current: &'static str,
    pub configured: bool,
    pub supported_providers: [&'static str; 2],
}

async fn ai_status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        available: state.ai.available(),
        current: state.ai.current_provider().name(),
        configured: state.ai.configured(),
        supported_providers: ["openai", "gemini"],
    }))
}

#[derive(Debug, Deserialize)]
pub struct SwitchProviderRequest {
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct SwitchProviderResponse {
    pub message: String,
    pub provider: &'static str,
    pub timestamp: String,
}

async fn switch_provider(
    State(state): State<AppState>,
    Json(body): Json<SwitchProviderRequest>,
) -> Result<Json<SwitchProviderResponse>> {
    if body.provider.trim().is_empty() {
        return Err(AppError::BadRequest("Provider is required.".to_string()));
    }

    let provider = state.ai.set_provider(&body.provider)?;

    Ok(Json(SwitchProviderResponse {
        message: format!("AI provider switched to {provider}"),
        provider,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
