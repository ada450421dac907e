mod audit;
mod experiment;
mod resource;
mod template;
mod user;

pub use audit::{AuditEntry, AuditStatus};
pub use experiment::Experiment;
pub use resource::{
    CloudService, Deployment, Endpoint, Provenance, ResourceStatus, StorageAccount,
    VirtualEnvironment, VirtualMachine, VirtualMachineState,
};
pub use template::{Template, TemplateKind, UserTemplate};
pub use user::{ManagementCredential, UserInfo};
