use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timeline::Timeline;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Raw research-project row; list-valued and embedded fields live in JSON
/// text columns and are decoded into [`ResearchProject`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResearchProjectRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub research_field: String,
    pub methodology: String,
    pub expected_duration: String,
    pub objectives: String,
    pub keywords: String,
    pub collaborators: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: String,
    pub estimated_budget: f64,
    pub timeline: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchProject {
    pub id: String,
    pub title: String,
    pub description: String,
    pub research_field: String,
    pub methodology: String,
    pub expected_duration: String,
    pub objectives: Vec<String>,
    pub keywords: Vec<String>,
    pub collaborators: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: String,
    pub estimated_budget: f64,
    pub timeline: Option<Timeline>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ResearchProjectRow> for ResearchProject {
    fn from(row: ResearchProjectRow) -> Self {
        ResearchProject {
            id: row.id,
            title: row.title,
            description: row.description,
            research_field: row.research_field,
            methodology: row.methodology,
            expected_duration: row.expected_duration,
            objectives: decode_list(&row.objectives),
            keywords: decode_list(&row.keywords),
            collaborators: decode_list(&row.collaborators),
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status,
            estimated_budget: row.estimated_budget,
            timeline: row
                .timeline
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok()),
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn decode_list(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BudgetEntry {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub cost: f64,
    #[serde(rename = "date")]
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Milestone {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub status: String,
    pub priority: String,
    pub notes: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author_name: String,
    pub author_role: String,
    pub user_id: String,
    pub pdf_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuestionKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "multiple-choice")]
    MultipleChoice,
    #[serde(rename = "checkbox")]
    Checkbox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SurveyRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_name: String,
    pub creator_role: String,
    pub user_id: String,
    pub questions: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_name: String,
    pub creator_role: String,
    pub user_id: String,
    pub questions: Vec<SurveyQuestion>,
    pub created_at: DateTime<Utc>,
}

impl From<SurveyRow> for Survey {
    fn from(row: SurveyRow) -> Self {
        Survey {
            id: row.id,
            title: row.title,
            description: row.description,
            creator_name: row.creator_name,
            creator_role: row.creator_role,
            user_id: row.user_id,
            questions: serde_json::from_str(&row.questions).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

/// A single answer: one selected option or free text, or a set of options
/// for checkbox questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Answer {
    One(String),
    Many(Vec<String>),
}

/// Answers keyed by question index (as a string, matching the wire format).
pub type AnswerMap = BTreeMap<String, Answer>;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SurveyResponseRow {
    pub id: String,
    pub survey_id: String,
    pub user_id: String,
    pub responses: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyResponse {
    pub id: String,
    pub survey_id: String,
    pub user_id: String,
    pub responses: AnswerMap,
    pub submitted_at: DateTime<Utc>,
}

impl From<SurveyResponseRow> for SurveyResponse {
    fn from(row: SurveyResponseRow) -> Self {
        SurveyResponse {
            id: row.id,
            survey_id: row.survey_id,
            user_id: row.user_id,
            responses: serde_json::from_str(&row.responses).unwrap_or_default(),
            submitted_at: row.submitted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_item: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
