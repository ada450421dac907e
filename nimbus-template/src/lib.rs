//! Loads a JSON experiment template and exposes typed accessors.
//!
//! The loader only validates and reads; it never mutates the document and
//! never touches the provider or the store.

use nimbus_common::{Error, ErrorKind, Result};
use nimbus_provider::types::{
    CloudServiceSpec, DeploymentSpec, EndpointSpec, NetworkConfig, RoleSpec, StorageAccountSpec,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawDocument {
    experiment_name: String,
    storage_account: RawStorageAccount,
    container_name: String,
    cloud_service: RawCloudService,
    deployment: RawDeployment,
    virtual_machines: Vec<RawVirtualMachine>,
}

#[derive(Debug, Deserialize)]
struct RawStorageAccount {
    name: String,
    description: String,
    label: String,
    location: String,
}

#[derive(Debug, Deserialize)]
struct RawCloudService {
    service_name: String,
    label: String,
    location: String,
}

#[derive(Debug, Deserialize)]
struct RawDeployment {
    deployment_name: String,
    slot: String,
}

#[derive(Debug, Deserialize)]
struct RawVirtualMachine {
    role_name: String,
    role_size: String,
    #[serde(default)]
    image_name: Option<String>,
    #[serde(default)]
    vhd: Option<String>,
    #[serde(default)]
    system_config: serde_json::Value,
    network_config: RawNetworkConfig,
}

#[derive(Debug, Deserialize)]
struct RawNetworkConfig {
    input_endpoints: Vec<RawEndpoint>,
    #[serde(default)]
    remote_access_port_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    name: String,
    protocol: String,
    port: u16,
    local_port: u16,
}

/// A validated experiment template, with an accessor per §3 entity and a
/// per-VM effective role name that includes the owning experiment's id.
pub struct Template {
    document: RawDocument,
}

/// One virtual-machine spec from a loaded template, carrying the role name
/// the template author wrote plus the experiment-scoped name the engine
/// actually issues to the provider.
pub struct VirtualMachineTemplate<'a> {
    raw: &'a RawVirtualMachine,
    effective_role_name: String,
}

impl Template {
    /// Parses and validates a template document's JSON text.
    ///
    /// Fails with [`ErrorKind::InvalidTemplate`] on a parse error or a
    /// missing required key — `serde`'s `missing field` message is used
    /// verbatim as the audit note.
    pub fn parse(json: &str) -> Result<Self> {
        let document: RawDocument = serde_json::from_str(json).map_err(|e| {
            Error::custom(ErrorKind::InvalidTemplate, format!("invalid template: {e}"))
        })?;

        if document.virtual_machines.is_empty() {
            return Err(Error::custom(
                ErrorKind::InvalidTemplate,
                "template must declare at least one virtual machine",
            ));
        }

        for vm in &document.virtual_machines {
            if vm.image_name.is_none() && vm.vhd.is_none() {
                return Err(Error::custom(
                    ErrorKind::InvalidTemplate,
                    format!(
                        "virtual machine '{}' must specify an image_name or a vhd",
                        vm.role_name
                    ),
                ));
            }
        }

        Ok(Self { document })
    }

    pub fn experiment_name(&self) -> &str {
        &self.document.experiment_name
    }

    pub fn container_name(&self) -> &str {
        &self.document.container_name
    }

    pub fn storage_account_spec(&self) -> StorageAccountSpec {
        let s = &self.document.storage_account;
        StorageAccountSpec {
            name: s.name.clone(),
            description: s.description.clone(),
            label: s.label.clone(),
            location: s.location.clone(),
        }
    }

    pub fn cloud_service_spec(&self) -> CloudServiceSpec {
        let c = &self.document.cloud_service;
        CloudServiceSpec {
            name: c.service_name.clone(),
            label: c.label.clone(),
            location: c.location.clone(),
        }
    }

    pub fn deployment_spec(&self) -> DeploymentSpec {
        let d = &self.document.deployment;
        DeploymentSpec {
            name: d.deployment_name.clone(),
            slot: d.slot.clone(),
        }
    }

    pub fn virtual_machines(&self, experiment_id: i64) -> Vec<VirtualMachineTemplate<'_>> {
        self.document
            .virtual_machines
            .iter()
            .map(|vm| VirtualMachineTemplate {
                raw: vm,
                effective_role_name: format!("{}-{}", vm.role_name, experiment_id),
            })
            .collect()
    }
}

impl<'a> VirtualMachineTemplate<'a> {
    /// The name as written in the template, shared by every experiment that
    /// instantiates this template.
    pub fn base_role_name(&self) -> &str {
        &self.raw.role_name
    }

    /// The name actually issued to the provider: the base name with the
    /// experiment id appended, which is what keeps two experiments from the
    /// same template from colliding on a role name.
    pub fn effective_role_name(&self) -> &str {
        &self.effective_role_name
    }

    pub fn role_size(&self) -> &str {
        &self.raw.role_size
    }

    pub fn image(&self) -> &str {
        self.raw
            .image_name
            .as_deref()
            .or(self.raw.vhd.as_deref())
            .expect("parse() rejects a vm with neither image_name nor vhd")
    }

    /// Whether this VM boots from a platform image rather than a raw VHD.
    /// Image-sourced roles need a follow-up network-config update after
    /// `add_role`; VHD-sourced roles carry their network config in the
    /// initial request.
    pub fn is_platform_image(&self) -> bool {
        self.raw.image_name.is_some()
    }

    pub fn role_spec(&self) -> RoleSpec {
        RoleSpec {
            role_name: self.effective_role_name.clone(),
            role_size: self.raw.role_size.clone(),
            image: self.image().to_string(),
            system_config: self.raw.system_config.clone(),
            network: self.network_config(),
        }
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            endpoints: self
                .raw
                .network_config
                .input_endpoints
                .iter()
                .map(|e| EndpointSpec {
                    name: e.name.clone(),
                    protocol: e.protocol.clone(),
                    public_port: e.port,
                    local_port: e.local_port,
                })
                .collect(),
            remote_access_port_name: self.raw.network_config.remote_access_port_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "experiment_name": "exp-1",
            "storage_account": {"name": "acct1", "description": "d", "label": "l", "location": "West US"},
            "container_name": "vhds",
            "cloud_service": {"service_name": "svc1", "label": "l", "location": "West US"},
            "deployment": {"deployment_name": "dep1", "slot": "production"},
            "virtual_machines": [
                {
                    "role_name": "r",
                    "role_size": "Small",
                    "image_name": "ubuntu-18.04",
                    "system_config": {},
                    "network_config": {
                        "input_endpoints": [
                            {"name": "ssh", "protocol": "TCP", "port": 22, "local_port": 22}
                        ]
                    }
                }
            ]
        }"#
    }

    #[test]
    fn parses_a_valid_template() {
        let template = Template::parse(sample()).unwrap();
        assert_eq!(template.experiment_name(), "exp-1");
        let vms = template.virtual_machines(42);
        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].base_role_name(), "r");
        assert_eq!(vms[0].effective_role_name(), "r-42");
        assert_eq!(vms[0].network_config().endpoints.len(), 1);
    }

    #[test]
    fn missing_required_key_is_invalid_template() {
        let broken = r#"{"experiment_name": "exp-1"}"#;
        let err = Template::parse(broken).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTemplate);
    }

    #[test]
    fn vm_without_image_or_vhd_is_invalid_template() {
        let broken = r#"{
            "experiment_name": "exp-1",
            "storage_account": {"name": "acct1", "description": "d", "label": "l", "location": "West US"},
            "container_name": "vhds",
            "cloud_service": {"service_name": "svc1", "label": "l", "location": "West US"},
            "deployment": {"deployment_name": "dep1", "slot": "production"},
            "virtual_machines": [
                {
                    "role_name": "r",
                    "role_size": "Small",
                    "system_config": {},
                    "network_config": {"input_endpoints": []}
                }
            ]
        }"#;
        let err = Template::parse(broken).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTemplate);
    }
}
