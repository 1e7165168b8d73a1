pub mod admin;
pub mod ai;
pub mod auth;
pub mod budgets;
pub mod milestones;
pub mod notifications;
pub mod papers;
pub mod research_projects;
pub mod surveys;
