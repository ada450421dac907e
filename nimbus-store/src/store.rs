use std::path::Path;

use chrono::Utc;
use nimbus_common::model::{Experiment, ManagementCredential, Template, UserInfo, UserTemplate};
use nimbus_common::{Error, Result};
use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::sqlite::{Sqlite, SqlitePool};

pub static MIGRATIONS: Migrator = sqlx::migrate!("./migrations");

/// Handle to the orchestration engine's SQLite database. Cheaply `Clone`;
/// new connections come from cloning the pool, not from calling
/// [`Store::new`] again.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

impl Store {
    pub async fn new(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            Sqlite::create_database(path)
                .await
                .map_err(Error::from)?;
        }
        let pool = SqlitePool::connect(path).await.map_err(Error::from)?;
        Self::from_pool(pool).await
    }

    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(Error::from)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        MIGRATIONS.run(&pool).await.map_err(|e| {
            Error::custom(
                nimbus_common::ErrorKind::PersistenceError,
                format!("migration failed: {e}"),
            )
        })?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_user(&self, display_name: &str, email: &str) -> Result<UserInfo> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO user_info (display_name, email, created_at, last_login_at) VALUES (?, ?, ?, ?)",
        )
        .bind(display_name)
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(UserInfo {
            id,
            display_name: display_name.to_string(),
            email: email.to_string(),
            created_at: now,
            last_login_at: now,
        })
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserInfo>> {
        sqlx::query_as("SELECT * FROM user_info WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn upsert_credential(&self, credential: &ManagementCredential) -> Result<()> {
        sqlx::query(
            "INSERT INTO management_credential (user_id, subscription_id, management_host, pem_path, der_path)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (user_id, subscription_id) DO UPDATE SET
                management_host = excluded.management_host,
                pem_path = excluded.pem_path,
                der_path = excluded.der_path",
        )
        .bind(credential.user_id)
        .bind(&credential.subscription_id)
        .bind(&credential.management_host)
        .bind(&credential.pem_path)
        .bind(&credential.der_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_credential(
        &self,
        user_id: i64,
        subscription_id: &str,
    ) -> Result<Option<ManagementCredential>> {
        sqlx::query_as(
            "SELECT * FROM management_credential WHERE user_id = ? AND subscription_id = ?",
        )
        .bind(user_id)
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn create_template(&self, url: &str, kind: nimbus_common::model::TemplateKind) -> Result<Template> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO template (url, kind, created_at, last_modified_at) VALUES (?, ?, ?, ?)",
        )
        .bind(url)
        .bind(kind)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Template {
            id,
            url: url.to_string(),
            kind,
            created_at: now,
            last_modified_at: now,
        })
    }

    pub async fn create_user_template(&self, user_id: i64, template_id: i64) -> Result<UserTemplate> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO user_template (user_id, template_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(template_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(UserTemplate {
            id,
            user_id,
            template_id,
            created_at: now,
        })
    }

    pub async fn create_experiment(
        &self,
        user_template_id: i64,
        subscription_id: &str,
    ) -> Result<Experiment> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO experiment (user_template_id, subscription_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_template_id)
        .bind(subscription_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Experiment {
            id,
            user_template_id,
            subscription_id: subscription_id.to_string(),
            created_at: now,
        })
    }

    pub async fn get_experiment(&self, id: i64) -> Result<Option<Experiment>> {
        sqlx::query_as("SELECT * FROM experiment WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_round_trips() {
        let store = Store::new_in_memory().await.unwrap();
        let user = store.create_user("Ada", "ada@example.com").await.unwrap();
        let fetched = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.display_name, "Ada");
        assert_eq!(fetched.email, "ada@example.com");
    }

    #[tokio::test]
    async fn credential_upsert_replaces_paths() {
        let store = Store::new_in_memory().await.unwrap();
        let user = store.create_user("Ada", "ada@example.com").await.unwrap();
        let credential = ManagementCredential {
            user_id: user.id,
            subscription_id: "sub-1".into(),
            management_host: "management.example.com".into(),
            pem_path: "certificates/1-sub-1.pem".into(),
            der_path: "certificates/1-sub-1.cer".into(),
        };
        store.upsert_credential(&credential).await.unwrap();

        let mut updated = credential.clone();
        updated.pem_path = "certificates/1-sub-1-v2.pem".into();
        store.upsert_credential(&updated).await.unwrap();

        let fetched = store
            .get_credential(user.id, "sub-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.pem_path, "certificates/1-sub-1-v2.pem");
    }

    #[tokio::test]
    async fn experiment_chain_round_trips() {
        let store = Store::new_in_memory().await.unwrap();
        let user = store.create_user("Ada", "ada@example.com").await.unwrap();
        let template = store
            .create_template("file:///tmp/t.json", nimbus_common::model::TemplateKind::Create)
            .await
            .unwrap();
        let user_template = store
            .create_user_template(user.id, template.id)
            .await
            .unwrap();
        let experiment = store
            .create_experiment(user_template.id, "sub-1")
            .await
            .unwrap();

        let fetched = store.get_experiment(experiment.id).await.unwrap().unwrap();
        assert_eq!(fetched.subscription_id, "sub-1");
    }
}
