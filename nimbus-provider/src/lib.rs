pub mod client;
pub mod fake;
pub mod types;

pub use client::ProviderClient;
pub use fake::{transport_error, FakeProvider};
pub use types::{
    AssignedPorts, CloudServiceSpec, DeploymentInfo, DeploymentSpec, DeploymentStatus,
    EndpointSpec, InstanceStatus, NetworkConfig, RequestHandle, RequestStatus, RoleInstance,
    RoleSpec, StopAction, StorageAccountSpec,
};
