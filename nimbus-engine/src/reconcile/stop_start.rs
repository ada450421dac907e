use nimbus_common::model::VirtualMachineState;
use nimbus_common::{Error, ErrorKind, Result};
use nimbus_provider::{InstanceStatus, StopAction};
use nimbus_store::{AuditLogExt, ResourceStoreExt};

use crate::context::EngineContext;
use crate::messages;

const OP_STOP_VIRTUAL_MACHINE: &str = "stop_virtual_machine";
const OP_START_VIRTUAL_MACHINE: &str = "start_virtual_machine";

/// Stops one virtual machine. Rejects `Stopped` -> `StoppedDeallocated` ->
/// `Stopped` as illegal: once resources are released, only a start can
/// bring the VM back, never a plain "keep billed" stop.
pub async fn stop(
    ctx: &EngineContext,
    experiment_id: i64,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    role_name: &str,
    action: StopAction,
) -> Result<()> {
    let store = &ctx.store;
    store
        .record_start(experiment_id, OP_STOP_VIRTUAL_MACHINE)
        .await?;

    match stop_inner(
        ctx,
        service_name,
        deployment_name,
        deployment_id,
        role_name,
        action,
    )
    .await
    {
        Ok(note) => {
            store
                .record_end(experiment_id, OP_STOP_VIRTUAL_MACHINE, Some(&note))
                .await
        }
        Err(err) => {
            let step = stop_fail_step(err.kind());
            store
                .record_fail(experiment_id, OP_STOP_VIRTUAL_MACHINE, &err.note(), Some(step))
                .await?;
            Err(err)
        }
    }
}

/// Mirrors the original automation's per-failure-site step index for this
/// operation: the state check fails at step 1, the async wait at step 2.
fn stop_fail_step(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::StateIllegal => 1,
        ErrorKind::AsyncTimeout => 2,
        ErrorKind::ReadinessTimeout => 3,
        _ => 0,
    }
}

async fn stop_inner(
    ctx: &EngineContext,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    role_name: &str,
    action: StopAction,
) -> Result<String> {
    let vm_row = ctx
        .store
        .get_virtual_machine_by_name(deployment_id, role_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;

    if action == StopAction::Stopped && vm_row.state == VirtualMachineState::StoppedDeallocated {
        return Err(Error::custom(
            ErrorKind::StateIllegal,
            messages::virtual_machine::wrong_state_for_stop(
                role_name,
                "Stopped",
                "StoppedDeallocated",
            ),
        ));
    }

    let handle = ctx
        .provider
        .stop_role(service_name, deployment_name, role_name, action)
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

    let targets: &[InstanceStatus] = match action {
        StopAction::Stopped => &[InstanceStatus::StoppedVM],
        StopAction::StoppedDeallocated => &[InstanceStatus::StoppedDeallocated],
    };
    ctx.resource_waiter
        .wait_for_role_status(
            ctx.provider.as_ref(),
            service_name,
            deployment_name,
            role_name,
            targets,
        )
        .await
        .map_err(|_| {
            Error::custom(
                ErrorKind::ReadinessTimeout,
                format!("{role_name} wait for virtual machine fail"),
            )
        })?;

    let new_state = match action {
        StopAction::Stopped => VirtualMachineState::Stopped,
        StopAction::StoppedDeallocated => VirtualMachineState::StoppedDeallocated,
    };
    ctx.store
        .update_virtual_machine_state(vm_row.id, new_state)
        .await?;

    let action_name = match action {
        StopAction::Stopped => "stopped",
        StopAction::StoppedDeallocated => "stopped and deallocated",
    };
    Ok(messages::virtual_machine::stopped(role_name, action_name))
}

/// Starts one virtual machine, from either stopped state.
pub async fn start(
    ctx: &EngineContext,
    experiment_id: i64,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    role_name: &str,
) -> Result<()> {
    let store = &ctx.store;
    store
        .record_start(experiment_id, OP_START_VIRTUAL_MACHINE)
        .await?;

    match start_inner(ctx, service_name, deployment_name, deployment_id, role_name).await {
        Ok(note) => {
            store
                .record_end(experiment_id, OP_START_VIRTUAL_MACHINE, Some(&note))
                .await
        }
        Err(err) => {
            store
                .record_fail(experiment_id, OP_START_VIRTUAL_MACHINE, &err.note(), Some(0))
                .await?;
            Err(err)
        }
    }
}

async fn start_inner(
    ctx: &EngineContext,
    service_name: &str,
    deployment_name: &str,
    deployment_id: i64,
    role_name: &str,
) -> Result<String> {
    let vm_row = ctx
        .store
        .get_virtual_machine_by_name(deployment_id, role_name)
        .await?
        .ok_or_else(|| Error::from_kind(ErrorKind::StateIllegal))?;

    let handle = ctx
        .provider
        .start_role(service_name, deployment_name, role_name)
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

    ctx.resource_waiter
        .wait_for_role_status(
            ctx.provider.as_ref(),
            service_name,
            deployment_name,
            role_name,
            &[InstanceStatus::ReadyRole],
        )
        .await
        .map_err(|_| {
            Error::custom(
                ErrorKind::ReadinessTimeout,
                format!("{role_name} wait for virtual machine fail"),
            )
        })?;

    ctx.store
        .update_virtual_machine_state(vm_row.id, VirtualMachineState::Running)
        .await?;

    Ok(messages::virtual_machine::started(role_name))
}
