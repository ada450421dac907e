use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live instance of a [`UserTemplate`](super::UserTemplate) under orchestration.
///
/// This is the correlation key every audit record and every provisioned
/// resource row hangs off of.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub user_template_id: i64,
    pub subscription_id: String,
    pub created_at: DateTime<Utc>,
}
