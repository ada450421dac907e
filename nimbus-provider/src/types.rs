use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An opaque handle to an in-flight asynchronous provider operation.
///
/// Tracked purely by value: the engine never inspects it, only passes it
/// back into [`crate::ProviderClient::get_request_status`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHandle(pub String);

/// The three states an asynchronous provider operation can be observed in.
/// A terminal status that isn't `Succeeded` is always a failure, never a
/// signal to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum RequestStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// One ordered input endpoint as it appears in a template's network
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    pub protocol: String,
    pub public_port: u16,
    pub local_port: u16,
}

/// The network configuration sent on create, add-role, and update-role
/// calls: an ordered endpoint list plus an optional remote-access port name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub endpoints: Vec<EndpointSpec>,
    pub remote_access_port_name: Option<String>,
}

/// A role's reported readiness, as surfaced on a deployment's role instance
/// list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum InstanceStatus {
    RoleStateUnknown,
    CreatingVM,
    StartingVM,
    CreatingRole,
    StartingRole,
    ReadyRole,
    BusyRole,
    StoppingRole,
    StoppingVM,
    DeletingVM,
    StoppedVM,
    StoppedDeallocated,
    UnresponsiveRole,
}

/// One role within a deployment, as reported by the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleInstance {
    pub role_name: String,
    pub instance_status: InstanceStatus,
    pub role_size: String,
    pub private_ip: Option<String>,
}

/// A deployment's reported state: overall status plus its role instances.
#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentInfo {
    pub name: String,
    pub status: DeploymentStatus,
    pub role_instances: Vec<RoleInstance>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
pub enum DeploymentStatus {
    Running,
    Suspended,
    RunningTransitioning,
    SuspendedTransitioning,
    Starting,
    Suspending,
    Deploying,
    Deleting,
}

/// Whether a stop targets `Stopped` (billed) or `StoppedDeallocated`
/// (resources released).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopAction {
    Stopped,
    StoppedDeallocated,
}

/// Spec for creating a storage account.
#[derive(Clone, Debug)]
pub struct StorageAccountSpec {
    pub name: String,
    pub description: String,
    pub label: String,
    pub location: String,
}

/// Spec for creating a cloud (hosted) service.
#[derive(Clone, Debug)]
pub struct CloudServiceSpec {
    pub name: String,
    pub label: String,
    pub location: String,
}

/// Spec for the deployment half of a VM create: which cloud service and
/// slot it lands in.
#[derive(Clone, Debug)]
pub struct DeploymentSpec {
    pub name: String,
    pub slot: String,
}

/// Spec for a single role (virtual machine) within a deployment.
#[derive(Clone, Debug)]
pub struct RoleSpec {
    pub role_name: String,
    pub role_size: String,
    pub image: String,
    pub system_config: serde_json::Value,
    pub network: NetworkConfig,
}

pub type AssignedPorts = BTreeSet<u16>;
