use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use nimbus_common::{Error, ErrorKind};

use crate::client::ProviderClient;
use crate::types::{
    AssignedPorts, CloudServiceSpec, DeploymentInfo, DeploymentSpec, DeploymentStatus,
    InstanceStatus, NetworkConfig, RequestHandle, RequestStatus, RoleInstance, RoleSpec,
    StopAction, StorageAccountSpec,
};

/// A deterministic, in-memory stand-in for [`ProviderClient`], used in engine
/// and reconciler tests. Every request handle resolves to [`RequestStatus::Succeeded`]
/// by default after the configured number of polls; tests drive failures and
/// delayed completion by pre-seeding `request_outcomes`.
#[derive(Default)]
pub struct FakeProvider {
    inner: Mutex<FakeProviderState>,
}

struct FakeProviderState {
    storage_accounts: BTreeSet<String>,
    cloud_services: BTreeSet<String>,
    deployments: HashMap<(String, String), DeploymentInfo>,
    unavailable_names: BTreeSet<String>,
    request_outcomes: HashMap<String, Vec<RequestStatus>>,
    assigned_ports: HashMap<String, AssignedPorts>,
    calls: Vec<String>,
    next_request_id: u64,
    available_storage_accounts: u32,
    available_cores: u32,
}

impl Default for FakeProviderState {
    fn default() -> Self {
        Self {
            storage_accounts: BTreeSet::new(),
            cloud_services: BTreeSet::new(),
            deployments: HashMap::new(),
            unavailable_names: BTreeSet::new(),
            request_outcomes: HashMap::new(),
            assigned_ports: HashMap::new(),
            calls: Vec::new(),
            next_request_id: 0,
            available_storage_accounts: 20,
            available_cores: 100,
        }
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a name as already taken, independent of whether any resource
    /// with that name has actually been "created" through this fake.
    pub fn mark_name_unavailable(&self, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .unavailable_names
            .insert(name.to_string());
    }

    /// Pre-seeds the sequence of statuses a request handle will report, one
    /// per poll. The last entry repeats once exhausted.
    pub fn seed_request_outcomes(&self, handle: &RequestHandle, outcomes: Vec<RequestStatus>) {
        self.inner
            .lock()
            .unwrap()
            .request_outcomes
            .insert(handle.0.clone(), outcomes);
    }

    pub fn seed_deployment(&self, service: &str, deployment: DeploymentInfo) {
        self.inner
            .lock()
            .unwrap()
            .deployments
            .insert((service.to_string(), deployment.name.clone()), deployment);
    }

    pub fn set_available_storage_account_count(&self, count: u32) {
        self.inner.lock().unwrap().available_storage_accounts = count;
    }

    pub fn set_available_core_count(&self, count: u32) {
        self.inner.lock().unwrap().available_cores = count;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn log(&self, state: &mut FakeProviderState, call: impl Into<String>) {
        state.calls.push(call.into());
    }

    fn next_handle(&self, state: &mut FakeProviderState) -> RequestHandle {
        state.next_request_id += 1;
        RequestHandle(format!("req-{}", state.next_request_id))
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn storage_account_exists(&self, name: &str) -> Result<bool, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("storage_account_exists {name}"));
        Ok(state.storage_accounts.contains(name))
    }

    async fn check_storage_account_name_available(&self, name: &str) -> Result<bool, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("check_storage_account_name_available {name}"),
        );
        Ok(!state.unavailable_names.contains(name) && !state.storage_accounts.contains(name))
    }

    async fn create_storage_account(
        &self,
        spec: &StorageAccountSpec,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("create_storage_account {}", spec.name));
        state.storage_accounts.insert(spec.name.clone());
        Ok(self.next_handle(&mut state))
    }

    async fn cloud_service_exists(&self, name: &str) -> Result<bool, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("cloud_service_exists {name}"));
        Ok(state.cloud_services.contains(name))
    }

    async fn create_hosted_service(&self, spec: &CloudServiceSpec) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("create_hosted_service {}", spec.name));
        state.cloud_services.insert(spec.name.clone());
        Ok(self.next_handle(&mut state))
    }

    async fn deployment_exists(&self, service: &str, slot: &str) -> Result<bool, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("deployment_exists {service} {slot}"));
        Ok(state
            .deployments
            .keys()
            .any(|(svc, _)| svc == service))
    }

    async fn get_deployment_name_by_slot(
        &self,
        service: &str,
        slot: &str,
    ) -> Result<Option<String>, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("get_deployment_name_by_slot {service} {slot}"),
        );
        Ok(state
            .deployments
            .keys()
            .find(|(svc, _)| svc == service)
            .map(|(_, name)| name.clone()))
    }

    async fn get_deployment(
        &self,
        service: &str,
        deployment: &str,
    ) -> Result<Option<DeploymentInfo>, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("get_deployment {service} {deployment}"));
        Ok(state
            .deployments
            .get(&(service.to_string(), deployment.to_string()))
            .cloned())
    }

    async fn role_exists(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
    ) -> Result<bool, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("role_exists {service} {deployment} {role}"),
        );
        Ok(state
            .deployments
            .get(&(service.to_string(), deployment.to_string()))
            .map(|d| d.role_instances.iter().any(|r| r.role_name == role))
            .unwrap_or(false))
    }

    async fn create_vm_deployment(
        &self,
        service: &str,
        deployment: &DeploymentSpec,
        role: &RoleSpec,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("create_vm_deployment {service} {}", deployment.name),
        );
        // Unlike a real IaaS backend this fake settles straight into the
        // terminal shape: deterministic, immediately-ready state is what
        // makes the reconciler's poll loops resolve on their first pass in
        // tests, absent a test explicitly seeding a different status.
        state.deployments.insert(
            (service.to_string(), deployment.name.clone()),
            DeploymentInfo {
                name: deployment.name.clone(),
                status: DeploymentStatus::Running,
                role_instances: vec![RoleInstance {
                    role_name: role.role_name.clone(),
                    instance_status: InstanceStatus::ReadyRole,
                    role_size: role.role_size.clone(),
                    private_ip: None,
                }],
            },
        );
        let ports = state.assigned_ports.entry(service.to_string()).or_default();
        ports.extend(role.network.endpoints.iter().map(|e| e.public_port));
        Ok(self.next_handle(&mut state))
    }

    async fn add_role(
        &self,
        service: &str,
        deployment: &str,
        role: &RoleSpec,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("add_role {service} {deployment} {}", role.role_name),
        );
        if let Some(d) = state
            .deployments
            .get_mut(&(service.to_string(), deployment.to_string()))
        {
            d.role_instances.push(RoleInstance {
                role_name: role.role_name.clone(),
                instance_status: InstanceStatus::ReadyRole,
                role_size: role.role_size.clone(),
                private_ip: None,
            });
        }
        let ports = state.assigned_ports.entry(service.to_string()).or_default();
        ports.extend(role.network.endpoints.iter().map(|e| e.public_port));
        Ok(self.next_handle(&mut state))
    }

    async fn update_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
        network: &NetworkConfig,
        size: &str,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("update_role {service} {deployment} {role} {size}"),
        );
        if let Some(d) = state
            .deployments
            .get_mut(&(service.to_string(), deployment.to_string()))
        {
            if let Some(r) = d.role_instances.iter_mut().find(|r| r.role_name == role) {
                r.role_size = size.to_string();
            }
        }
        // A real update replaces the role's endpoint set wholesale; mirror
        // that here instead of only ever accumulating ports.
        let new_ports: BTreeSet<u16> = network.endpoints.iter().map(|e| e.public_port).collect();
        state.assigned_ports.insert(service.to_string(), new_ports);
        Ok(self.next_handle(&mut state))
    }

    async fn update_role_network(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
        _network: &NetworkConfig,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("update_role_network {service} {deployment} {role}"),
        );
        Ok(self.next_handle(&mut state))
    }

    async fn delete_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("delete_role {service} {deployment} {role}"),
        );
        if let Some(d) = state
            .deployments
            .get_mut(&(service.to_string(), deployment.to_string()))
        {
            d.role_instances.retain(|r| r.role_name != role);
        }
        Ok(self.next_handle(&mut state))
    }

    async fn delete_deployment(
        &self,
        service: &str,
        deployment: &str,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("delete_deployment {service} {deployment}"));
        state
            .deployments
            .remove(&(service.to_string(), deployment.to_string()));
        Ok(self.next_handle(&mut state))
    }

    async fn stop_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
        action: StopAction,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(
            &mut state,
            format!("stop_role {service} {deployment} {role} {action:?}"),
        );
        let target = match action {
            StopAction::Stopped => InstanceStatus::StoppedVM,
            StopAction::StoppedDeallocated => InstanceStatus::StoppedDeallocated,
        };
        if let Some(d) = state
            .deployments
            .get_mut(&(service.to_string(), deployment.to_string()))
        {
            if let Some(r) = d.role_instances.iter_mut().find(|r| r.role_name == role) {
                r.instance_status = target;
            }
        }
        Ok(self.next_handle(&mut state))
    }

    async fn start_role(
        &self,
        service: &str,
        deployment: &str,
        role: &str,
    ) -> Result<RequestHandle, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("start_role {service} {deployment} {role}"));
        if let Some(d) = state
            .deployments
            .get_mut(&(service.to_string(), deployment.to_string()))
        {
            if let Some(r) = d.role_instances.iter_mut().find(|r| r.role_name == role) {
                r.instance_status = InstanceStatus::ReadyRole;
            }
        }
        Ok(self.next_handle(&mut state))
    }

    async fn get_request_status(&self, request: &RequestHandle) -> Result<RequestStatus, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("get_request_status {}", request.0));
        let outcomes = state.request_outcomes.get(&request.0).cloned();
        match outcomes {
            None => Ok(RequestStatus::Succeeded),
            Some(mut seq) if seq.is_empty() => Ok(RequestStatus::Succeeded),
            Some(mut seq) => {
                let status = seq.remove(0);
                if !seq.is_empty() {
                    state.request_outcomes.insert(request.0.clone(), seq);
                }
                Ok(status)
            }
        }
    }

    async fn get_assigned_endpoint_ports(&self, service: &str) -> Result<AssignedPorts, Error> {
        let mut state = self.inner.lock().unwrap();
        self.log(&mut state, format!("get_assigned_endpoint_ports {service}"));
        Ok(state.assigned_ports.get(service).cloned().unwrap_or_default())
    }

    async fn available_storage_account_count(&self) -> Result<u32, Error> {
        Ok(self.inner.lock().unwrap().available_storage_accounts)
    }

    async fn available_core_count(&self) -> Result<u32, Error> {
        Ok(self.inner.lock().unwrap().available_cores)
    }
}

/// Convenience for callers that want a hard transport-error variant instead
/// of wiring one through the fake's state machine.
pub fn transport_error(message: impl AsRef<str>) -> Error {
    Error::custom(ErrorKind::ProviderTransport, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseeded_request_succeeds_immediately() {
        let provider = FakeProvider::new();
        let spec = StorageAccountSpec {
            name: "acct1".into(),
            description: "d".into(),
            label: "l".into(),
            location: "West US".into(),
        };
        let handle = provider.create_storage_account(&spec).await.unwrap();
        let status = provider.get_request_status(&handle).await.unwrap();
        assert_eq!(status, RequestStatus::Succeeded);
        assert!(provider.storage_account_exists("acct1").await.unwrap());
    }

    #[tokio::test]
    async fn seeded_outcomes_play_back_in_order() {
        let provider = FakeProvider::new();
        let handle = RequestHandle("req-x".into());
        provider.seed_request_outcomes(
            &handle,
            vec![RequestStatus::InProgress, RequestStatus::Failed],
        );
        assert_eq!(
            provider.get_request_status(&handle).await.unwrap(),
            RequestStatus::InProgress
        );
        assert_eq!(
            provider.get_request_status(&handle).await.unwrap(),
            RequestStatus::Failed
        );
    }

    #[tokio::test]
    async fn unavailable_name_is_reported() {
        let provider = FakeProvider::new();
        provider.mark_name_unavailable("taken");
        assert!(!provider
            .check_storage_account_name_available("taken")
            .await
            .unwrap());
    }
}
