use std::sync::Arc;
use std::time::Duration;

use nimbus_common::model::{AuditStatus, Provenance, VirtualMachineState};
use nimbus_engine::reconcile::{create, delete, stop, update};
use nimbus_engine::{AsyncWaiter, EngineContext, ResourceWaiter};
use nimbus_provider::{FakeProvider, ProviderClient, StopAction};
use nimbus_store::{AuditLogExt, ResourceStoreExt, Store};
use nimbus_template::Template;

fn template_json(size: &str, ports: &[(&str, u16, u16)]) -> String {
    let endpoints: Vec<String> = ports
        .iter()
        .map(|(name, port, local)| {
            format!(
                r#"{{"name": "{name}", "protocol": "TCP", "port": {port}, "local_port": {local}}}"#
            )
        })
        .collect();
    format!(
        r#"{{
            "experiment_name": "exp-1",
            "storage_account": {{"name": "sa1", "description": "d", "label": "l", "location": "West US"}},
            "container_name": "vhds",
            "cloud_service": {{"service_name": "cs1", "label": "l", "location": "West US"}},
            "deployment": {{"deployment_name": "d1", "slot": "Production"}},
            "virtual_machines": [
                {{
                    "role_name": "r",
                    "role_size": "{size}",
                    "image_name": "ubuntu-18.04",
                    "system_config": {{}},
                    "network_config": {{ "input_endpoints": [{}] }}
                }}
            ]
        }}"#,
        endpoints.join(",")
    )
}

async fn fixture() -> (Store, i64) {
    let store = Store::new_in_memory().await.unwrap();
    let user = store.create_user("Ada", "ada@example.com").await.unwrap();
    let template = store
        .create_template("file:///tmp/t.json", nimbus_common::model::TemplateKind::Create)
        .await
        .unwrap();
    let user_template = store.create_user_template(user.id, template.id).await.unwrap();
    let experiment_id = store.create_experiment(user_template.id, "sub-1").await.unwrap().id;
    (store, experiment_id)
}

/// Builds an [`EngineContext`] with millisecond-scale waiters (the defaults
/// are 30s x 60, meant for a real provider's settle time, not a test run)
/// plus a handle to the concrete fake so tests can inspect its call log.
fn fast_context(store: Store) -> (EngineContext, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider::new());
    let ctx = EngineContext {
        provider: provider.clone() as Arc<dyn ProviderClient>,
        store,
        async_waiter: Arc::new(AsyncWaiter::new(Duration::from_millis(1), 5)),
        resource_waiter: Arc::new(ResourceWaiter::new(Duration::from_millis(1), 5)),
    };
    (ctx, provider)
}

/// S1: every resource is absent from the provider and quota is ample;
/// `create` walks storage account, cloud service and VM straight through
/// to END, leaving one row of each kind behind.
#[tokio::test]
async fn fresh_create_persists_one_of_each_resource() {
    let (store, experiment_id) = fixture().await;
    let template = Template::parse(&template_json("Small", &[("ssh", 22, 22)])).unwrap();
    let (ctx, _provider) = fast_context(store.clone());

    create(&ctx, experiment_id, &template).await.unwrap();

    let sa = store.get_storage_account_by_name("sa1").await.unwrap().unwrap();
    assert_eq!(sa.provenance, Provenance::CreatedByUs);
    let cs = store.get_cloud_service_by_name("cs1").await.unwrap().unwrap();
    assert_eq!(cs.provenance, Provenance::CreatedByUs);
    let dep = store.get_deployment_by_name("d1").await.unwrap().unwrap();
    let vm = store.get_virtual_machine_by_name(dep.id, "r-1").await.unwrap().unwrap();
    assert_eq!(vm.state, VirtualMachineState::Running);
    let endpoints = store.get_endpoints(vm.id).await.unwrap();
    assert_eq!(endpoints.len(), 1);

    let entries = store.entries_since(experiment_id, 0).await.unwrap();
    assert!(entries.iter().all(|e| e.status != AuditStatus::Fail));
    for op in ["create_storage_account", "create_cloud_service", "create_virtual_machine"] {
        let rows: Vec<_> = entries.iter().filter(|e| e.operation == op).collect();
        assert_eq!(rows.len(), 2, "{op} should have a START and a terminal row");
        assert_eq!(rows[0].status, AuditStatus::Start);
        assert_eq!(rows[1].status, AuditStatus::End);
    }
}

/// S2: every resource the template names already exists on the provider.
/// Running `create` twice must not issue a single provider write call on
/// the second pass, and every adopted row is flagged not-ours.
#[tokio::test]
async fn full_adoption_is_idempotent_and_flags_foreign_rows() {
    let (store, experiment_id) = fixture().await;
    let template = Template::parse(&template_json("Small", &[("ssh", 22, 22)])).unwrap();
    let (ctx, provider) = fast_context(store.clone());

    // Pre-populate the provider as if some other process created everything.
    provider.create_storage_account(&template.storage_account_spec()).await.unwrap();
    provider.create_hosted_service(&template.cloud_service_spec()).await.unwrap();
    provider
        .create_vm_deployment(
            &template.cloud_service_spec().name,
            &template.deployment_spec(),
            &template.virtual_machines(experiment_id)[0].role_spec(),
        )
        .await
        .unwrap();

    create(&ctx, experiment_id, &template).await.unwrap();
    let calls_after_first = provider.calls().len();

    create(&ctx, experiment_id, &template).await.unwrap();
    let calls_after_second = provider.calls();

    let sa = store.get_storage_account_by_name("sa1").await.unwrap().unwrap();
    assert_eq!(sa.provenance, Provenance::Adopted);
    let cs = store.get_cloud_service_by_name("cs1").await.unwrap().unwrap();
    assert_eq!(cs.provenance, Provenance::Adopted);

    let new_write_calls: Vec<_> = calls_after_second[calls_after_first..]
        .iter()
        .filter(|c| c.starts_with("create_") || c.starts_with("add_role"))
        .collect();
    assert!(new_write_calls.is_empty(), "second pass issued writes: {new_write_calls:?}");

    let entries = store.entries_since(experiment_id, 0).await.unwrap();
    let ends: Vec<_> = entries.iter().filter(|e| e.status == AuditStatus::End).collect();
    assert!(ends.iter().any(|e| e.note.as_deref().unwrap_or("").contains("before")));
}

/// S3: the subscription reports zero remaining storage accounts. The
/// pipeline must fail at the storage-account step with a note mentioning
/// the quota shortfall, and never reach the cloud service step.
#[tokio::test]
async fn quota_exhaustion_fails_storage_account_step() {
    let (store, experiment_id) = fixture().await;
    let template = Template::parse(&template_json("Small", &[("ssh", 22, 22)])).unwrap();
    let (ctx, provider) = fast_context(store.clone());
    provider.set_available_storage_account_count(0);

    let err = create(&ctx, experiment_id, &template).await.unwrap_err();
    assert_eq!(err.kind(), nimbus_common::ErrorKind::QuotaExhausted);
    assert!(err.note().contains("subscription not enough"));

    let entries = store.entries_since(experiment_id, 0).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].operation, "create_storage_account");
    assert_eq!(entries[0].status, AuditStatus::Start);
    assert_eq!(entries[1].status, AuditStatus::Fail);
    assert_eq!(entries[1].step, Some(2));
    assert!(store.get_cloud_service_by_name("cs1").await.unwrap().is_none());
}

/// S4: an existing VM is resized and its endpoint set replaced. The
/// persisted endpoint rows must equal the new set exactly afterwards.
#[tokio::test]
async fn update_resizes_and_replaces_endpoints() {
    let (store, experiment_id) = fixture().await;
    let create_template = Template::parse(&template_json("Small", &[("ssh", 22, 22)])).unwrap();
    let (ctx, _provider) = fast_context(store.clone());
    create(&ctx, experiment_id, &create_template).await.unwrap();

    let update_template =
        Template::parse(&template_json("Medium", &[("ssh", 2222, 22), ("http", 80, 80)])).unwrap();
    update(&ctx, experiment_id, &update_template).await.unwrap();

    let dep = store.get_deployment_by_name("d1").await.unwrap().unwrap();
    let vm = store.get_virtual_machine_by_name(dep.id, "r-1").await.unwrap().unwrap();
    let mut endpoints = store.get_endpoints(vm.id).await.unwrap();
    endpoints.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].name, "http");
    assert_eq!(endpoints[1].name, "ssh");
    assert_eq!(endpoints[1].public_port, 2222);
}

/// S5: deleting the only role in a deployment issues `delete_deployment`,
/// not `delete_role`, and removes both rows in one pass.
#[tokio::test]
async fn delete_last_role_deletes_deployment_not_role() {
    let (store, experiment_id) = fixture().await;
    let template = Template::parse(&template_json("Small", &[("ssh", 22, 22)])).unwrap();
    let (ctx, provider) = fast_context(store.clone());
    create(&ctx, experiment_id, &template).await.unwrap();

    delete(&ctx, experiment_id, &template).await.unwrap();

    assert!(store.get_deployment_by_name("d1").await.unwrap().is_none());
    let calls = provider.calls();
    assert!(calls.iter().any(|c| c.starts_with("delete_deployment")));
    assert!(!calls.iter().any(|c| c.starts_with("delete_role")));

    let entries = store.entries_since(experiment_id, 0).await.unwrap();
    let deleted_end = entries
        .iter()
        .find(|e| e.status == AuditStatus::End && e.operation == "delete_virtual_machine")
        .unwrap();
    assert!(deleted_end.note.as_deref().unwrap_or("").contains("deleted"));
}

/// S6: a VM that is already `StoppedDeallocated` cannot be asked to merely
/// `Stop` (keep billed) — that would silently resurrect billing the caller
/// thought they had turned off. The reconciler rejects it before ever
/// calling the provider.
#[tokio::test]
async fn illegal_stop_transition_is_rejected_without_a_provider_call() {
    let (store, experiment_id) = fixture().await;
    let template = Template::parse(&template_json("Small", &[("ssh", 22, 22)])).unwrap();
    let (ctx, provider) = fast_context(store.clone());
    create(&ctx, experiment_id, &template).await.unwrap();

    let dep = store.get_deployment_by_name("d1").await.unwrap().unwrap();
    let vm = store.get_virtual_machine_by_name(dep.id, "r-1").await.unwrap().unwrap();
    store
        .update_virtual_machine_state(vm.id, VirtualMachineState::StoppedDeallocated)
        .await
        .unwrap();

    let calls_before = provider.calls().len();
    let err = stop(&ctx, experiment_id, "cs1", "d1", dep.id, "r-1", StopAction::Stopped)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), nimbus_common::ErrorKind::StateIllegal);

    let calls_after = provider.calls().len();
    assert_eq!(calls_before, calls_after, "illegal transition must not reach the provider");

    let entries = store.entries_since(experiment_id, 0).await.unwrap();
    let stop_fail = entries
        .iter()
        .rev()
        .find(|e| e.operation == "stop_virtual_machine" && e.status == AuditStatus::Fail)
        .unwrap();
    assert_eq!(stop_fail.step, Some(1));
    assert!(stop_fail.note.as_deref().unwrap_or("").contains("need status"));
}
