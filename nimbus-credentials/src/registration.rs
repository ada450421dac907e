use std::path::Path;

use nimbus_common::model::{ManagementCredential, UserInfo};
use nimbus_common::Result;
use nimbus_store::Store;

use crate::cert::CertificatePaths;

/// Registers a user against one provider subscription: creates the
/// [`UserInfo`] row if needed, materializes a management certificate pair,
/// and persists the resulting [`ManagementCredential`].
///
/// Idempotent: re-registering the same (user, subscription) reuses the
/// existing certificate pair on disk rather than minting a new one.
pub async fn register(
    store: &Store,
    certificates_dir: &Path,
    display_name: &str,
    email: &str,
    subscription_id: &str,
    management_host: &str,
) -> Result<(UserInfo, ManagementCredential)> {
    let user = store.create_user(display_name, email).await?;

    let paths = CertificatePaths::new(certificates_dir, user.id, subscription_id);
    let subject = format!("user-{}-{}", user.id, subscription_id);
    paths.materialize(&subject)?;

    let credential = ManagementCredential {
        user_id: user.id,
        subscription_id: subscription_id.to_string(),
        management_host: management_host.to_string(),
        pem_path: paths.pem_path.to_string_lossy().into_owned(),
        der_path: paths.der_path.to_string_lossy().into_owned(),
    };
    store.upsert_credential(&credential).await?;

    Ok((user, credential))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_creates_user_and_credential() {
        let store = Store::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let (user, credential) = register(
            &store,
            dir.path(),
            "Ada",
            "ada@example.com",
            "sub-1",
            "management.example.com",
        )
        .await
        .unwrap();

        assert_eq!(credential.user_id, user.id);
        assert!(Path::new(&credential.pem_path).exists());
        assert!(Path::new(&credential.der_path).exists());

        let fetched = store.get_credential(user.id, "sub-1").await.unwrap().unwrap();
        assert_eq!(fetched.management_host, "management.example.com");
    }
}
