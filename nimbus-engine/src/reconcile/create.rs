use nimbus_common::model::{Provenance, ResourceStatus, VirtualMachineState};
use nimbus_common::{sizes, Error, ErrorKind, Result};
use nimbus_provider::{
    CloudServiceSpec, DeploymentSpec, DeploymentStatus, InstanceStatus, RoleSpec,
    StorageAccountSpec,
};
use nimbus_store::{AuditLogExt, ResourceStoreExt};
use nimbus_template::{Template, VirtualMachineTemplate};

use crate::context::EngineContext;
use crate::messages;

const OP_STORAGE_ACCOUNT: &str = "create_storage_account";
const OP_CLOUD_SERVICE: &str = "create_cloud_service";
const OP_VIRTUAL_MACHINE: &str = "create_virtual_machine";

/// Walks the full create pipeline for one experiment: storage account,
/// cloud service, then each virtual machine's deployment/role chain and
/// endpoint commit, in that order. Stops at the first failure.
pub async fn create(ctx: &EngineContext, experiment_id: i64, template: &Template) -> Result<()> {
    create_storage_account(ctx, experiment_id, template).await?;
    create_cloud_service(ctx, experiment_id, template).await?;

    let service_name = template.cloud_service_spec().name;
    for vm in template.virtual_machines(experiment_id) {
        create_virtual_machine(ctx, experiment_id, &service_name, template, &vm).await?;
    }
    Ok(())
}

async fn create_storage_account(
    ctx: &EngineContext,
    experiment_id: i64,
    template: &Template,
) -> Result<()> {
    let store = &ctx.store;
    store.record_start(experiment_id, OP_STORAGE_ACCOUNT).await?;

    let spec = template.storage_account_spec();
    match create_storage_account_inner(ctx, experiment_id, &spec).await {
        Ok(note) => {
            store
                .record_end(experiment_id, OP_STORAGE_ACCOUNT, Some(&note))
                .await
        }
        Err(err) => {
            let step = storage_account_fail_step(err.kind());
            store
                .record_fail(experiment_id, OP_STORAGE_ACCOUNT, &err.note(), Some(step))
                .await?;
            Err(err)
        }
    }
}

/// Mirrors the original automation's per-failure-site step index for this
/// operation: name-unavailable at step 1, quota exhaustion at step 2, the
/// async wait at step 3.
fn storage_account_fail_step(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NameUnavailable => 1,
        ErrorKind::QuotaExhausted => 2,
        ErrorKind::AsyncTimeout => 3,
        _ => 0,
    }
}

async fn create_storage_account_inner(
    ctx: &EngineContext,
    experiment_id: i64,
    spec: &StorageAccountSpec,
) -> Result<String> {
    if ctx.provider.storage_account_exists(&spec.name).await? {
        return match ctx.store.get_storage_account_by_name(&spec.name).await? {
            Some(row) if row.provenance == Provenance::CreatedByUs => {
                Ok(messages::storage_account::adopted(&spec.name))
            }
            _ => {
                ctx.store
                    .insert_storage_account(experiment_id, &spec.name, Provenance::Adopted)
                    .await?;
                ctx.store
                    .update_storage_account_status(&spec.name, ResourceStatus::Running)
                    .await?;
                Ok(messages::storage_account::adopted_foreign(&spec.name))
            }
        };
    }

    if !ctx
        .provider
        .check_storage_account_name_available(&spec.name)
        .await?
    {
        return Err(Error::from_kind(ErrorKind::NameUnavailable));
    }
    if ctx.provider.available_storage_account_count().await? < 1 {
        return Err(Error::custom(
            ErrorKind::QuotaExhausted,
            messages::storage_account::quota_exhausted(&spec.name),
        ));
    }

    let handle = ctx.provider.create_storage_account(spec).await?;
    ctx.async_waiter.wait(ctx.provider.as_ref(), &handle).await?;

    ctx.store
        .insert_storage_account(experiment_id, &spec.name, Provenance::CreatedByUs)
        .await?;
    ctx.store
        .update_storage_account_status(&spec.name, ResourceStatus::Running)
        .await?;

    Ok(messages::storage_account::created(&spec.name))
}

async fn create_cloud_service(
    ctx: &EngineContext,
    experiment_id: i64,
    template: &Template,
) -> Result<()> {
    let store = &ctx.store;
    store.record_start(experiment_id, OP_CLOUD_SERVICE).await?;

    let spec = template.cloud_service_spec();
    match create_cloud_service_inner(ctx, experiment_id, &spec).await {
        Ok(note) => {
            store
                .record_end(experiment_id, OP_CLOUD_SERVICE, Some(&note))
                .await
        }
        Err(err) => {
            store
                .record_fail(experiment_id, OP_CLOUD_SERVICE, &err.note(), Some(0))
                .await?;
            Err(err)
        }
    }
}

async fn create_cloud_service_inner(
    ctx: &EngineContext,
    experiment_id: i64,
    spec: &CloudServiceSpec,
) -> Result<String> {
    if ctx.provider.cloud_service_exists(&spec.name).await? {
        return match ctx.store.get_cloud_service_by_name(&spec.name).await? {
            Some(row) if row.provenance == Provenance::CreatedByUs => {
                Ok(messages::cloud_service::adopted(&spec.name))
            }
            _ => {
                ctx.store
                    .insert_cloud_service(experiment_id, &spec.name, Provenance::Adopted)
                    .await?;
                ctx.store
                    .update_cloud_service_status(&spec.name, ResourceStatus::Running)
                    .await?;
                Ok(messages::cloud_service::adopted_foreign(&spec.name))
            }
        };
    }

    let handle = ctx.provider.create_hosted_service(spec).await?;
    ctx.async_waiter.wait(ctx.provider.as_ref(), &handle).await?;

    ctx.store
        .insert_cloud_service(experiment_id, &spec.name, Provenance::CreatedByUs)
        .await?;
    ctx.store
        .update_cloud_service_status(&spec.name, ResourceStatus::Running)
        .await?;

    Ok(messages::cloud_service::created(&spec.name))
}

async fn create_virtual_machine(
    ctx: &EngineContext,
    experiment_id: i64,
    service_name: &str,
    template: &Template,
    vm: &VirtualMachineTemplate<'_>,
) -> Result<()> {
    let store = &ctx.store;
    store.record_start(experiment_id, OP_VIRTUAL_MACHINE).await?;

    match create_virtual_machine_inner(ctx, experiment_id, service_name, template, vm).await {
        Ok(note) => {
            store
                .record_end(experiment_id, OP_VIRTUAL_MACHINE, Some(&note))
                .await
        }
        Err(err) => {
            let step = virtual_machine_fail_step(err.kind());
            store
                .record_fail(experiment_id, OP_VIRTUAL_MACHINE, &err.note(), Some(step))
                .await?;
            Err(err)
        }
    }
}

/// Mirrors the original automation's per-failure-site step index for this
/// operation: quota exhaustion at step 1, the deployment/role async wait at
/// step 2, the network-config wait at step 3.
fn virtual_machine_fail_step(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::QuotaExhausted => 1,
        ErrorKind::AsyncTimeout => 2,
        _ => 0,
    }
}

async fn create_virtual_machine_inner(
    ctx: &EngineContext,
    experiment_id: i64,
    service_name: &str,
    template: &Template,
    vm: &VirtualMachineTemplate<'_>,
) -> Result<String> {
    let needed_cores = sizes::cores_for_size(vm.role_size())?;
    if ctx.provider.available_core_count().await? < needed_cores {
        return Err(Error::custom(
            ErrorKind::QuotaExhausted,
            messages::virtual_machine::quota_exhausted(vm.effective_role_name()),
        ));
    }

    let deployment_spec = template.deployment_spec();
    let role_spec = vm.role_spec();

    let deployment_present = ctx
        .provider
        .deployment_exists(service_name, &deployment_spec.slot)
        .await?;

    let deployment_name = if deployment_present {
        ctx.provider
            .get_deployment_name_by_slot(service_name, &deployment_spec.slot)
            .await?
            .unwrap_or_else(|| deployment_spec.name.clone())
    } else {
        deployment_spec.name.clone()
    };

    if !deployment_present {
        create_deployment_and_first_role(
            ctx,
            service_name,
            &deployment_name,
            &deployment_spec,
            &role_spec,
        )
        .await
    } else {
        add_role_to_existing_deployment(
            ctx,
            experiment_id,
            service_name,
            &deployment_name,
            vm,
            &role_spec,
        )
        .await
    }
}

async fn create_deployment_and_first_role(
    ctx: &EngineContext,
    service_name: &str,
    deployment_name: &str,
    deployment_spec: &DeploymentSpec,
    role_spec: &RoleSpec,
) -> Result<String> {
    let handle = ctx
        .provider
        .create_vm_deployment(service_name, deployment_spec, role_spec)
        .await?;
    ctx.async_waiter
        .wait(ctx.provider.as_ref(), &handle)
        .await
        .map_err(|_| {
            Error::custom(
                ErrorKind::AsyncTimeout,
                messages::deployment::async_wait_failed(deployment_name),
            )
        })?;

    ctx.resource_waiter
        .wait_for_deployment_status(
            ctx.provider.as_ref(),
            service_name,
            deployment_name,
            DeploymentStatus::Running,
        )
        .await?;

    let service_row = ctx
        .store
        .get_cloud_service_by_name(service_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;
    let deployment_row = ctx
        .store
        .insert_deployment(service_row.id, deployment_name, Provenance::CreatedByUs)
        .await?;
    ctx.store
        .update_deployment_status(deployment_row.id, ResourceStatus::Running)
        .await?;

    ctx.resource_waiter
        .wait_for_role_status(
            ctx.provider.as_ref(),
            service_name,
            deployment_name,
            &role_spec.role_name,
            &[InstanceStatus::ReadyRole],
        )
        .await?;

    commit_vm_and_endpoints(ctx, deployment_row.id, role_spec).await?;

    Ok(messages::deployment::created(deployment_name))
}

/// The deployment already exists on the provider; make sure a store row
/// backs it before roles are adopted or added onto it. Mirrors the
/// storage-account/cloud-service adopt-or-create branches above: a row
/// already here and created by us is left alone, anything else is recorded
/// as `Adopted`.
async fn adopt_deployment_row(
    ctx: &EngineContext,
    service_name: &str,
    deployment_name: &str,
) -> Result<nimbus_common::model::Deployment> {
    if let Some(row) = ctx.store.get_deployment_by_name(deployment_name).await? {
        return Ok(row);
    }

    let service_row = ctx
        .store
        .get_cloud_service_by_name(service_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;
    let deployment_row = ctx
        .store
        .insert_deployment(service_row.id, deployment_name, Provenance::Adopted)
        .await?;
    ctx.store
        .update_deployment_status(deployment_row.id, ResourceStatus::Running)
        .await?;
    Ok(deployment_row)
}

async fn add_role_to_existing_deployment(
    ctx: &EngineContext,
    _experiment_id: i64,
    service_name: &str,
    deployment_name: &str,
    vm: &VirtualMachineTemplate<'_>,
    role_spec: &RoleSpec,
) -> Result<String> {
    let deployment_row = adopt_deployment_row(ctx, service_name, deployment_name).await?;

    if ctx
        .provider
        .role_exists(service_name, deployment_name, &role_spec.role_name)
        .await?
    {
        return match ctx
            .store
            .get_virtual_machine_by_name(deployment_row.id, &role_spec.role_name)
            .await?
        {
            Some(row) if row.provenance == Provenance::CreatedByUs => {
                Ok(messages::virtual_machine::adopted(&role_spec.role_name))
            }
            _ => {
                let vm_row = ctx
                    .store
                    .insert_virtual_machine(
                        deployment_row.id,
                        &role_spec.role_name,
                        Provenance::Adopted,
                    )
                    .await?;
                ctx.store
                    .update_virtual_machine_state(vm_row.id, VirtualMachineState::Running)
                    .await?;
                Ok(messages::virtual_machine::adopted_foreign(&role_spec.role_name))
            }
        };
    }

    let handle = ctx
        .provider
        .add_role(service_name, deployment_name, role_spec)
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

    if vm.is_platform_image() {
        let network_handle = ctx
            .provider
            .update_role_network(
                service_name,
                deployment_name,
                &role_spec.role_name,
                &role_spec.network,
            )
            .await?;
        ctx.async_waiter
            .wait(ctx.provider.as_ref(), &network_handle)
            .await
            .map_err(|_| {
                Error::custom(
                    ErrorKind::AsyncTimeout,
                    messages::virtual_machine::network_update_wait_failed(&role_spec.role_name),
                )
            })?;
    }

    ctx.resource_waiter
        .wait_for_role_status(
            ctx.provider.as_ref(),
            service_name,
            deployment_name,
            &role_spec.role_name,
            &[InstanceStatus::ReadyRole],
        )
        .await?;

    commit_vm_and_endpoints(ctx, deployment_row.id, role_spec).await?;

    Ok(messages::virtual_machine::created(&role_spec.role_name))
}

async fn commit_vm_and_endpoints(
    ctx: &EngineContext,
    deployment_id: i64,
    role_spec: &RoleSpec,
) -> Result<()> {
    let vm_row = ctx
        .store
        .insert_virtual_machine(deployment_id, &role_spec.role_name, Provenance::CreatedByUs)
        .await?;
    ctx.store
        .update_virtual_machine_state(vm_row.id, VirtualMachineState::Running)
        .await?;
    ctx.store
        .replace_endpoints(vm_row.id, &role_spec.network.endpoints, Provenance::CreatedByUs)
        .await?;
    Ok(())
}
