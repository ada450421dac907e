use async_trait::async_trait;
use chrono::Utc;
use nimbus_common::model::{AuditEntry, AuditStatus};
use nimbus_common::{Error, ErrorKind, Result};

use crate::store::Store;

/// Append-only audit log operations.
///
/// Enforces the invariant that, for a given (experiment, operation), the
/// sequence of recorded statuses is `Start -> (Fail | End)` and never
/// repeats `Start` without an intervening terminal status.
#[async_trait]
pub trait AuditLogExt {
    async fn record_start(&self, experiment_id: i64, operation: &str) -> Result<()>;
    async fn record_end(&self, experiment_id: i64, operation: &str, note: Option<&str>) -> Result<()>;
    async fn record_fail(
        &self,
        experiment_id: i64,
        operation: &str,
        note: &str,
        step: Option<i32>,
    ) -> Result<()>;
    async fn entries_for(&self, experiment_id: i64, operation: &str) -> Result<Vec<AuditEntry>>;
    async fn entries_since(&self, experiment_id: i64, cursor: i64) -> Result<Vec<AuditEntry>>;
}

#[async_trait]
impl AuditLogExt for Store {
    async fn record_start(&self, experiment_id: i64, operation: &str) -> Result<()> {
        let open = sqlx::query_as::<_, AuditEntry>(
            "SELECT * FROM audit_log WHERE experiment_id = ? AND operation = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(experiment_id)
        .bind(operation)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(last) = open {
            if last.status == AuditStatus::Start {
                return Err(Error::custom(
                    ErrorKind::StateIllegal,
                    format!("operation '{operation}' already has an open START for experiment {experiment_id}"),
                ));
            }
        }

        insert_entry(self, experiment_id, operation, AuditStatus::Start, None, None).await
    }

    async fn record_end(&self, experiment_id: i64, operation: &str, note: Option<&str>) -> Result<()> {
        insert_entry(self, experiment_id, operation, AuditStatus::End, note, None).await
    }

    async fn record_fail(
        &self,
        experiment_id: i64,
        operation: &str,
        note: &str,
        step: Option<i32>,
    ) -> Result<()> {
        insert_entry(
            self,
            experiment_id,
            operation,
            AuditStatus::Fail,
            Some(note),
            step,
        )
        .await
    }

    async fn entries_for(&self, experiment_id: i64, operation: &str) -> Result<Vec<AuditEntry>> {
        sqlx::query_as(
            "SELECT * FROM audit_log WHERE experiment_id = ? AND operation = ? ORDER BY id ASC",
        )
        .bind(experiment_id)
        .bind(operation)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn entries_since(&self, experiment_id: i64, cursor: i64) -> Result<Vec<AuditEntry>> {
        sqlx::query_as(
            "SELECT * FROM audit_log WHERE experiment_id = ? AND id > ? ORDER BY id ASC",
        )
        .bind(experiment_id)
        .bind(cursor)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}

async fn insert_entry(
    store: &Store,
    experiment_id: i64,
    operation: &str,
    status: AuditStatus,
    note: Option<&str>,
    step: Option<i32>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_log (experiment_id, operation, status, note, step, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(experiment_id)
    .bind(operation)
    .bind(status)
    .bind(note)
    .bind(step)
    .bind(Utc::now())
    .execute(&store.pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn experiment(store: &Store) -> i64 {
        let user = store.create_user("Ada", "ada@example.com").await.unwrap();
        let template = store
            .create_template("file:///tmp/t.json", nimbus_common::model::TemplateKind::Create)
            .await
            .unwrap();
        let user_template = store
            .create_user_template(user.id, template.id)
            .await
            .unwrap();
        store
            .create_experiment(user_template.id, "sub-1")
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn start_then_end_is_allowed() {
        let store = Store::new_in_memory().await.unwrap();
        let experiment_id = experiment(&store).await;

        store.record_start(experiment_id, "create").await.unwrap();
        store
            .record_end(experiment_id, "create", Some("done"))
            .await
            .unwrap();

        let entries = store.entries_for(experiment_id, "create").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, AuditStatus::Start);
        assert_eq!(entries[1].status, AuditStatus::End);
    }

    #[tokio::test]
    async fn double_start_without_terminal_is_rejected() {
        let store = Store::new_in_memory().await.unwrap();
        let experiment_id = experiment(&store).await;

        store.record_start(experiment_id, "create").await.unwrap();
        let err = store.record_start(experiment_id, "create").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateIllegal);
    }

    #[tokio::test]
    async fn start_is_allowed_again_after_a_terminal() {
        let store = Store::new_in_memory().await.unwrap();
        let experiment_id = experiment(&store).await;

        store.record_start(experiment_id, "create").await.unwrap();
        store
            .record_fail(experiment_id, "create", "boom", Some(2))
            .await
            .unwrap();
        store.record_start(experiment_id, "create").await.unwrap();

        let entries = store.entries_for(experiment_id, "create").await.unwrap();
        assert_eq!(entries.len(), 3);
    }
}
