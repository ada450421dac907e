use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account known to the engine, independent of any provider subscription.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

/// One user's standing to act against one provider subscription.
///
/// `pem_path`/`der_path` point at the certificate pair minted by
/// `nimbus-credentials` for this (user, subscription) pair; they are
/// filesystem paths, not the certificate bytes themselves.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ManagementCredential {
    pub user_id: i64,
    pub subscription_id: String,
    pub management_host: String,
    pub pem_path: String,
    pub der_path: String,
}
