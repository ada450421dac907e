use chrono::{DateTime, Utc};

/// Where a provisioned resource sits relative to the provider's view of it.
///
/// `Pending` covers the window between issuing a create/update request and
/// the engine observing the provider report it as running; it is never the
/// resting state of a healthy resource.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ResourceStatus {
    #[default]
    Pending,
    Running,
    Stopped,
    Failed,
}

/// Whether the engine created this resource itself or found it already
/// present on the provider and adopted it into the containment tree.
///
/// Only `CreatedByUs` rows may be force-deleted on cascade; `Adopted` rows
/// are left to whoever created them outside the engine.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Provenance {
    #[default]
    CreatedByUs,
    Adopted,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct StorageAccount {
    pub id: i64,
    pub experiment_id: i64,
    pub name: String,
    pub status: ResourceStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct CloudService {
    pub id: i64,
    pub experiment_id: i64,
    pub name: String,
    pub status: ResourceStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Deployment {
    pub id: i64,
    pub cloud_service_id: i64,
    pub name: String,
    pub status: ResourceStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// A VM's own state machine is richer than [`ResourceStatus`]: it additionally
/// distinguishes the stop/start transitions the workflow must reject when
/// attempted from an illegal starting state.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum VirtualMachineState {
    #[default]
    Pending,
    Running,
    Stopping,
    Stopped,
    StoppedDeallocated,
    Starting,
    Failed,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct VirtualMachine {
    pub id: i64,
    pub deployment_id: i64,
    pub name: String,
    pub state: VirtualMachineState,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Endpoint {
    pub id: i64,
    pub virtual_machine_id: i64,
    pub name: String,
    pub public_port: i32,
    pub local_port: i32,
    pub protocol: String,
    pub status: ResourceStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct VirtualEnvironment {
    pub id: i64,
    pub experiment_id: i64,
    pub name: String,
    pub status: ResourceStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}
