use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a template is for: which family of reconciliation it drives.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum TemplateKind {
    #[default]
    Create,
    Update,
}

/// A JSON document describing the resources an experiment should converge to.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub url: String,
    pub kind: TemplateKind,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

/// A user's submission of a template: the thing an [`Experiment`](super::Experiment) instantiates.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserTemplate {
    pub id: i64,
    pub user_id: i64,
    pub template_id: i64,
    pub created_at: DateTime<Utc>,
}
