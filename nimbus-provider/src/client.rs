use async_trait::async_trait;
use nimbus_common::Error;

use crate::types::{
    AssignedPorts, CloudServiceSpec, DeploymentInfo, DeploymentSpec, NetworkConfig, RequestHandle,
    RequestStatus, RoleSpec, StopAction, StorageAccountSpec,
};

/// Wraps the IaaS SDK. Every fallible call here has already normalized the
/// provider's "resource not found" sentinel into a plain `false`/`None`
/// return where the operation asks an existence question; every other
/// provider error propagates as a typed [`Error`] with its message
/// preserved for audit notes.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn storage_account_exists(&self, name: &str) -> Result<bool, Error>;

    async fn check_storage_account_name_available(&self, name: &str) -> Result<bool, Error>;

    async fn create_storage_account(
        &self,
        spec: &StorageAccountSpec,
    ) -> Result<RequestHandle, Error>;

    async fn cloud_service_exists(&self, name: &str) -> Result<bool, Error>;

    async fn create_hosted_service(&self, spec: &CloudServiceSpec) -> Result<RequestHandle, Error>;

    async fn deployment_exists(&self, service: &str, slot: &str) -> Result<bool, Error>;

    async fn get_deployment_name_by_slot(
        &self,
        service: &str,
        slot: &str,
    ) -> Result<Option<String>, Error>;

    async fn get_deployment(
        &self,
        service: &str,
        deployment: &str,
    ) -> Result<Option<DeploymentInfo>, Error>;

    async fn role_exists(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
    ) -> Result<bool, Error>;

    async fn create_vm_deployment(
        &self,
        service: &str,
        deployment: &DeploymentSpec,
        role: &RoleSpec,
    ) -> Result<RequestHandle, Error>;

    async fn add_role(
        &self,
        service: &str,
        deployment: &str,
        role: &RoleSpec,
    ) -> Result<RequestHandle, Error>;

    async fn update_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
        network: &NetworkConfig,
        size: &str,
    ) -> Result<RequestHandle, Error>;

    async fn update_role_network(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
        network: &NetworkConfig,
    ) -> Result<RequestHandle, Error>;

    async fn delete_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
    ) -> Result<RequestHandle, Error>;

    async fn delete_deployment(
        &self,
        service: &str,
        deployment: &str,
    ) -> Result<RequestHandle, Error>;

    async fn stop_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
        action: StopAction,
    ) -> Result<RequestHandle, Error>;

    async fn start_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
    ) -> Result<RequestHandle, Error>;

    async fn get_request_status(&self, request: &RequestHandle) -> Result<RequestStatus, Error>;

    async fn get_assigned_endpoint_ports(&self, service: &str) -> Result<AssignedPorts, Error>;

    /// Remaining storage accounts the subscription may still create.
    async fn available_storage_account_count(&self) -> Result<u32, Error>;

    /// Remaining compute cores the subscription may still allocate.
    async fn available_core_count(&self) -> Result<u32, Error>;
}
