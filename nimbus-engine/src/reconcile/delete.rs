use nimbus_common::{Error, ErrorKind, Result};
use nimbus_store::{AuditLogExt, ResourceStoreExt};
use nimbus_template::Template;

use crate::context::EngineContext;
use crate::messages;

const OP_DELETE_VIRTUAL_MACHINE: &str = "delete_virtual_machine";

/// Deletes every virtual machine named in `template`. When deleting the
/// last remaining role in the deployment, the whole deployment is deleted
/// instead of the single role, which also removes the deployment's own
/// persistence row.
pub async fn delete(ctx: &EngineContext, experiment_id: i64, template: &Template) -> Result<()> {
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
        let role_name = vm.effective_role_name().to_string();
        let deployment_gone = delete_virtual_machine(
            ctx,
            experiment_id,
            &service_name,
            &deployment_name,
            deployment_row.id,
            &role_name,
        )
        .await?;
        if deployment_gone {
            break;
        }
    }

    Ok(())
}

/// Returns `true` if the whole deployment (and every remaining role in it)
/// was removed as a side effect of deleting this one role.
async fn delete_virtual_machine(
    ctx: &EngineContext,
    experiment_id: i64,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    role_name: &str,
) -> Result<bool> {
    let store = &ctx.store;
    store
        .record_start(experiment_id, OP_DELETE_VIRTUAL_MACHINE)
        .await?;

    match delete_virtual_machine_inner(ctx, service_name, deployment_name, deployment_id, role_name)
        .await
    {
        Ok((note, deployment_gone)) => {
            store
                .record_end(experiment_id, OP_DELETE_VIRTUAL_MACHINE, Some(&note))
                .await?;
            Ok(deployment_gone)
        }
        Err(err) => {
            store
                .record_fail(
                    experiment_id,
                    OP_DELETE_VIRTUAL_MACHINE,
                    &err.note(),
                    Some(0),
                )
                .await?;
            Err(err)
        }
    }
}

async fn delete_virtual_machine_inner(
    ctx: &EngineContext,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    role_name: &str,
) -> Result<(String, bool)> {
    let deployment = ctx
        .provider
        .get_deployment(service_name, deployment_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::PostconditionsViolated))?;

    let is_last_role = deployment.role_instances.len() <= 1;

    if is_last_role {
        let handle = ctx
            .provider
            .delete_deployment(service_name, deployment_name)
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

        if ctx
            .provider
            .deployment_exists(service_name, deployment_name)
            .await?
        {
            return Err(Error::from_kind(ErrorKind::PostconditionsViolated));
        }

        ctx.store.delete_deployment_cascade(deployment_id).await?;
        Ok((messages::deployment::deleted(deployment_name), true))
    } else {
        let handle = ctx
            .provider
            .delete_role(service_name, deployment_name, role_name)
            .await?;
        ctx.async_waiter
            .wait(ctx.provider.as_ref(), &handle)
            .await
            .map_err(|_| {
                Error::custom(
                    ErrorKind::AsyncTimeout,
                    messages::virtual_machine::async_wait_failed(role_name),
                )
            })?;

        if ctx
            .provider
            .role_exists(service_name, deployment_name, role_name)
            .await?
        {
            return Err(Error::from_kind(ErrorKind::PostconditionsViolated));
        }

        let vm_row = ctx
            .store
            .get_virtual_machine_by_name(deployment_id, role_name)
            .await?
            .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;
        ctx.store.delete_virtual_machine_cascade(vm_row.id).await?;

        Ok((messages::virtual_machine::deleted(role_name), false))
    }
}
