use async_trait::async_trait;
use chrono::Utc;
use nimbus_common::model::{
    CloudService, Deployment, Endpoint, Provenance, ResourceStatus, StorageAccount,
    VirtualEnvironment, VirtualMachine, VirtualMachineState,
};
use nimbus_common::Result;

use crate::store::Store;

/// CRUD plus cascade-delete for the provider-resource containment tree:
/// StorageAccount/CloudService hang off an Experiment; Deployment hangs off
/// a CloudService; VirtualMachine hangs off a Deployment; Endpoint hangs off
/// a VirtualMachine.
#[async_trait]
pub trait ResourceStoreExt {
    async fn insert_storage_account(
        &self,
        experiment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<StorageAccount>;
    async fn get_storage_account_by_name(&self, name: &str) -> Result<Option<StorageAccount>>;
    async fn update_storage_account_status(&self, name: &str, status: ResourceStatus) -> Result<()>;

    async fn insert_cloud_service(
        &self,
        experiment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<CloudService>;
    async fn get_cloud_service_by_name(&self, name: &str) -> Result<Option<CloudService>>;
    async fn update_cloud_service_status(&self, name: &str, status: ResourceStatus) -> Result<()>;
    async fn delete_cloud_service_cascade(&self, name: &str) -> Result<()>;

    async fn insert_deployment(
        &self,
        cloud_service_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<Deployment>;
    async fn get_deployment_by_name(&self, name: &str) -> Result<Option<Deployment>>;
    async fn update_deployment_status(&self, id: i64, status: ResourceStatus) -> Result<()>;
    async fn delete_deployment_cascade(&self, id: i64) -> Result<()>;

    async fn insert_virtual_machine(
        &self,
        deployment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<VirtualMachine>;
    async fn get_virtual_machine_by_name(
        &self,
        deployment_id: i64,
        name: &str,
    ) -> Result<Option<VirtualMachine>>;
    async fn update_virtual_machine_state(&self, id: i64, state: VirtualMachineState) -> Result<()>;
    async fn delete_virtual_machine_cascade(&self, id: i64) -> Result<()>;

    async fn replace_endpoints(
        &self,
        virtual_machine_id: i64,
        endpoints: &[nimbus_provider::types::EndpointSpec],
        provenance: Provenance,
    ) -> Result<Vec<Endpoint>>;
    async fn get_endpoints(&self, virtual_machine_id: i64) -> Result<Vec<Endpoint>>;

    async fn insert_virtual_environment(
        &self,
        experiment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<VirtualEnvironment>;
}

#[async_trait]
impl ResourceStoreExt for Store {
    async fn insert_storage_account(
        &self,
        experiment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<StorageAccount> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO storage_account (experiment_id, name, status, provenance, created_at, last_update)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(experiment_id)
        .bind(name)
        .bind(ResourceStatus::Pending)
        .bind(provenance)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(StorageAccount {
            id,
            experiment_id,
            name: name.to_string(),
            status: ResourceStatus::Pending,
            provenance,
            created_at: now,
            last_update: now,
        })
    }

    async fn get_storage_account_by_name(&self, name: &str) -> Result<Option<StorageAccount>> {
        sqlx::query_as("SELECT * FROM storage_account WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn update_storage_account_status(&self, name: &str, status: ResourceStatus) -> Result<()> {
        sqlx::query("UPDATE storage_account SET status = ?, last_update = ? WHERE name = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_cloud_service(
        &self,
        experiment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<CloudService> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO cloud_service (experiment_id, name, status, provenance, created_at, last_update)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(experiment_id)
        .bind(name)
        .bind(ResourceStatus::Pending)
        .bind(provenance)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(CloudService {
            id,
            experiment_id,
            name: name.to_string(),
            status: ResourceStatus::Pending,
            provenance,
            created_at: now,
            last_update: now,
        })
    }

    async fn get_cloud_service_by_name(&self, name: &str) -> Result<Option<CloudService>> {
        sqlx::query_as("SELECT * FROM cloud_service WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn update_cloud_service_status(&self, name: &str, status: ResourceStatus) -> Result<()> {
        sqlx::query("UPDATE cloud_service SET status = ?, last_update = ? WHERE name = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cascades to every Deployment under this service, their
    /// VirtualMachines, and their Endpoints.
    async fn delete_cloud_service_cascade(&self, name: &str) -> Result<()> {
        let Some(service) = self.get_cloud_service_by_name(name).await? else {
            return Ok(());
        };

        let deployment_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM deployment WHERE cloud_service_id = ?")
                .bind(service.id)
                .fetch_all(&self.pool)
                .await?;

        for (deployment_id,) in deployment_ids {
            self.delete_deployment_cascade(deployment_id).await?;
        }

        sqlx::query("DELETE FROM cloud_service WHERE id = ?")
            .bind(service.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_deployment(
        &self,
        cloud_service_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<Deployment> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO deployment (cloud_service_id, name, status, provenance, created_at, last_update)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(cloud_service_id)
        .bind(name)
        .bind(ResourceStatus::Pending)
        .bind(provenance)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Deployment {
            id,
            cloud_service_id,
            name: name.to_string(),
            status: ResourceStatus::Pending,
            provenance,
            created_at: now,
            last_update: now,
        })
    }

    async fn get_deployment_by_name(&self, name: &str) -> Result<Option<Deployment>> {
        sqlx::query_as("SELECT * FROM deployment WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn update_deployment_status(&self, id: i64, status: ResourceStatus) -> Result<()> {
        sqlx::query("UPDATE deployment SET status = ?, last_update = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cascades to every VirtualMachine in this deployment and their Endpoints.
    async fn delete_deployment_cascade(&self, id: i64) -> Result<()> {
        let vm_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM virtual_machine WHERE deployment_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        for (vm_id,) in vm_ids {
            self.delete_virtual_machine_cascade(vm_id).await?;
        }

        sqlx::query("DELETE FROM deployment WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_virtual_machine(
        &self,
        deployment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<VirtualMachine> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO virtual_machine (deployment_id, name, state, provenance, created_at, last_update)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(deployment_id)
        .bind(name)
        .bind(VirtualMachineState::Pending)
        .bind(provenance)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(VirtualMachine {
            id,
            deployment_id,
            name: name.to_string(),
            state: VirtualMachineState::Pending,
            provenance,
            created_at: now,
            last_update: now,
        })
    }

    async fn get_virtual_machine_by_name(
        &self,
        deployment_id: i64,
        name: &str,
    ) -> Result<Option<VirtualMachine>> {
        sqlx::query_as("SELECT * FROM virtual_machine WHERE deployment_id = ? AND name = ?")
            .bind(deployment_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn update_virtual_machine_state(&self, id: i64, state: VirtualMachineState) -> Result<()> {
        sqlx::query("UPDATE virtual_machine SET state = ?, last_update = ? WHERE id = ?")
            .bind(state)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cascades to the VM's Endpoints; used both by deployment cascade and
    /// by a standalone VM delete.
    async fn delete_virtual_machine_cascade(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM endpoint WHERE virtual_machine_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM virtual_machine WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically replaces a VM's endpoint set: delete then insert in one
    /// transaction, so a reader never observes a partial set.
    async fn replace_endpoints(
        &self,
        virtual_machine_id: i64,
        endpoints: &[nimbus_provider::types::EndpointSpec],
        provenance: Provenance,
    ) -> Result<Vec<Endpoint>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM endpoint WHERE virtual_machine_id = ?")
            .bind(virtual_machine_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(endpoints.len());
        for spec in endpoints {
            let id = sqlx::query(
                "INSERT INTO endpoint
                    (virtual_machine_id, name, public_port, local_port, protocol, status, provenance, created_at, last_update)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(virtual_machine_id)
            .bind(&spec.name)
            .bind(spec.public_port as i32)
            .bind(spec.local_port as i32)
            .bind(&spec.protocol)
            .bind(ResourceStatus::Running)
            .bind(provenance)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            inserted.push(Endpoint {
                id,
                virtual_machine_id,
                name: spec.name.clone(),
                public_port: spec.public_port as i32,
                local_port: spec.local_port as i32,
                protocol: spec.protocol.clone(),
                status: ResourceStatus::Running,
                provenance,
                created_at: now,
                last_update: now,
            });
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_endpoints(&self, virtual_machine_id: i64) -> Result<Vec<Endpoint>> {
        sqlx::query_as("SELECT * FROM endpoint WHERE virtual_machine_id = ? ORDER BY name ASC")
            .bind(virtual_machine_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn insert_virtual_environment(
        &self,
        experiment_id: i64,
        name: &str,
        provenance: Provenance,
    ) -> Result<VirtualEnvironment> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO virtual_environment (experiment_id, name, status, provenance, created_at, last_update)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(experiment_id)
        .bind(name)
        .bind(ResourceStatus::Pending)
        .bind(provenance)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(VirtualEnvironment {
            id,
            experiment_id,
            name: name.to_string(),
            status: ResourceStatus::Pending,
            provenance,
            created_at: now,
            last_update: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_provider::types::EndpointSpec;

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
    async fn storage_account_round_trips() {
        let store = Store::new_in_memory().await.unwrap();
        let experiment_id = experiment(&store).await;

        store
            .insert_storage_account(experiment_id, "acct1", Provenance::CreatedByUs)
            .await
            .unwrap();
        let fetched = store
            .get_storage_account_by_name("acct1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, ResourceStatus::Pending);

        store
            .update_storage_account_status("acct1", ResourceStatus::Running)
            .await
            .unwrap();
        let fetched = store
            .get_storage_account_by_name("acct1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, ResourceStatus::Running);
    }

    #[tokio::test]
    async fn cloud_service_delete_cascades_to_vm_and_endpoints() {
        let store = Store::new_in_memory().await.unwrap();
        let experiment_id = experiment(&store).await;

        let service = store
            .insert_cloud_service(experiment_id, "svc1", Provenance::CreatedByUs)
            .await
            .unwrap();
        let deployment = store
            .insert_deployment(service.id, "dep1", Provenance::CreatedByUs)
            .await
            .unwrap();
        let vm = store
            .insert_virtual_machine(deployment.id, "vm1", Provenance::CreatedByUs)
            .await
            .unwrap();
        store
            .replace_endpoints(
                vm.id,
                &[EndpointSpec {
                    name: "ssh".into(),
                    protocol: "TCP".into(),
                    public_port: 22,
                    local_port: 22,
                }],
                Provenance::CreatedByUs,
            )
            .await
            .unwrap();

        store.delete_cloud_service_cascade("svc1").await.unwrap();

        assert!(store.get_cloud_service_by_name("svc1").await.unwrap().is_none());
        assert!(store.get_deployment_by_name("dep1").await.unwrap().is_none());
        assert!(store.get_endpoints(vm.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_endpoints_is_atomic_swap() {
        let store = Store::new_in_memory().await.unwrap();
        let experiment_id = experiment(&store).await;
        let service = store
            .insert_cloud_service(experiment_id, "svc2", Provenance::CreatedByUs)
            .await
            .unwrap();
        let deployment = store
            .insert_deployment(service.id, "dep2", Provenance::CreatedByUs)
            .await
            .unwrap();
        let vm = store
            .insert_virtual_machine(deployment.id, "vm2", Provenance::CreatedByUs)
            .await
            .unwrap();

        store
            .replace_endpoints(
                vm.id,
                &[EndpointSpec {
                    name: "ssh".into(),
                    protocol: "TCP".into(),
                    public_port: 22,
                    local_port: 22,
                }],
                Provenance::CreatedByUs,
            )
            .await
            .unwrap();
        store
            .replace_endpoints(
                vm.id,
                &[EndpointSpec {
                    name: "http".into(),
                    protocol: "TCP".into(),
                    public_port: 80,
                    local_port: 8080,
                }],
                Provenance::CreatedByUs,
            )
            .await
            .unwrap();

        let endpoints = store.get_endpoints(vm.id).await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].name, "http");
    }
}
