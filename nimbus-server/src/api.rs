use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nimbus_common::model::{AuditEntry, Experiment, Template as TemplateRecord, TemplateKind, UserInfo};
use nimbus_common::Error;
use nimbus_engine::{EngineContext, TaskRouter};
use nimbus_provider::StopAction;
use nimbus_store::{AuditLogExt, Store};
use nimbus_template::Template;
use serde::Deserialize;
use tracing::instrument;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub engine: EngineContext,
    pub router: TaskRouter,
    pub certificates_dir: PathBuf,
    pub management_host: String,
}

pub fn make_api(state: AppState) -> Router {
    Router::new()
        .route("/users", post(register_user))
        .route("/templates", post(upload_template))
        .route("/experiments", post(create_experiment))
        .route("/experiments/:id/create", post(trigger_create))
        .route("/experiments/:id/update", post(trigger_update))
        .route("/experiments/:id/delete", post(trigger_delete))
        .route("/experiments/:id/stop", post(trigger_stop))
        .route("/experiments/:id/start", post(trigger_start))
        .route("/experiments/:id/audit", get(read_audit_log))
        .with_state(Arc::new(state))
}

#[derive(Debug, Deserialize)]
struct RegisterUserRequest {
    display_name: String,
    email: String,
    subscription_id: String,
}

#[instrument(skip(state))]
async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<UserInfo>, ApiError> {
    let (user, _credential) = nimbus_credentials::register(
        &state.store,
        &state.certificates_dir,
        &req.display_name,
        &req.email,
        &req.subscription_id,
        &state.management_host,
    )
    .await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
struct UploadTemplateRequest {
    url: String,
    kind: TemplateKindWire,
    user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TemplateKindWire {
    Create,
    Update,
}

impl From<TemplateKindWire> for TemplateKind {
    fn from(kind: TemplateKindWire) -> Self {
        match kind {
            TemplateKindWire::Create => TemplateKind::Create,
            TemplateKindWire::Update => TemplateKind::Update,
        }
    }
}

#[instrument(skip(state))]
async fn upload_template(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadTemplateRequest>,
) -> Result<Json<TemplateRecord>, ApiError> {
    let template = state.store.create_template(&req.url, req.kind.into()).await?;
    state
        .store
        .create_user_template(req.user_id, template.id)
        .await?;
    Ok(Json(template))
}

#[derive(Debug, Deserialize)]
struct CreateExperimentRequest {
    user_template_id: i64,
    subscription_id: String,
}

#[instrument(skip(state))]
async fn create_experiment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateExperimentRequest>,
) -> Result<Json<Experiment>, ApiError> {
    let experiment = state
        .store
        .create_experiment(req.user_template_id, &req.subscription_id)
        .await?;
    Ok(Json(experiment))
}

#[derive(Debug, Deserialize)]
struct TemplateBody {
    template_json: String,
}

#[instrument(skip(state, body))]
async fn trigger_create(
    State(state): State<Arc<AppState>>,
    Path(experiment_id): Path<i64>,
    Json(body): Json<TemplateBody>,
) -> Result<StatusCode, ApiError> {
    let template = Template::parse(&body.template_json)?;
    let cloud_service = template.cloud_service_spec().name;
    let deployment = template.deployment_spec().name;
    enqueue(&state, experiment_id, &cloud_service, &deployment, move |ctx| {
        let template = template;
        Box::pin(async move { nimbus_engine::reconcile::create(&ctx, experiment_id, &template).await })
    })
    .await
}

#[instrument(skip(state, body))]
async fn trigger_update(
    State(state): State<Arc<AppState>>,
    Path(experiment_id): Path<i64>,
    Json(body): Json<TemplateBody>,
) -> Result<StatusCode, ApiError> {
    let template = Template::parse(&body.template_json)?;
    let cloud_service = template.cloud_service_spec().name;
    let deployment = template.deployment_spec().name;
    enqueue(&state, experiment_id, &cloud_service, &deployment, move |ctx| {
        let template = template;
        Box::pin(async move { nimbus_engine::reconcile::update(&ctx, experiment_id, &template).await })
    })
    .await
}

#[instrument(skip(state, body))]
async fn trigger_delete(
    State(state): State<Arc<AppState>>,
    Path(experiment_id): Path<i64>,
    Json(body): Json<TemplateBody>,
) -> Result<StatusCode, ApiError> {
    let template = Template::parse(&body.template_json)?;
    let cloud_service = template.cloud_service_spec().name;
    let deployment = template.deployment_spec().name;
    enqueue(&state, experiment_id, &cloud_service, &deployment, move |ctx| {
        let template = template;
        Box::pin(async move { nimbus_engine::reconcile::delete(&ctx, experiment_id, &template).await })
    })
    .await
}

#[derive(Debug, Deserialize)]
struct StopRequest {
    service_name: String,
    deployment_name: String,
    deployment_id: i64,
    role_name: String,
    deallocate: bool,
}

#[instrument(skip(state, body))]
async fn trigger_stop(
    State(state): State<Arc<AppState>>,
    Path(experiment_id): Path<i64>,
    Json(body): Json<StopRequest>,
) -> Result<StatusCode, ApiError> {
    let action = if body.deallocate {
        StopAction::StoppedDeallocated
    } else {
        StopAction::Stopped
    };
    let cloud_service = body.service_name.clone();
    let deployment = body.deployment_name.clone();
    enqueue(&state, experiment_id, &cloud_service, &deployment, move |ctx| {
        Box::pin(async move {
            nimbus_engine::reconcile::stop(
                &ctx,
                experiment_id,
                &body.service_name,
                &body.deployment_name,
                body.deployment_id,
                &body.role_name,
                action,
            )
            .await
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    service_name: String,
    deployment_name: String,
    deployment_id: i64,
    role_name: String,
}

#[instrument(skip(state, body))]
async fn trigger_start(
    State(state): State<Arc<AppState>>,
    Path(experiment_id): Path<i64>,
    Json(body): Json<StartRequest>,
) -> Result<StatusCode, ApiError> {
    let cloud_service = body.service_name.clone();
    let deployment = body.deployment_name.clone();
    enqueue(&state, experiment_id, &cloud_service, &deployment, move |ctx| {
        Box::pin(async move {
            nimbus_engine::reconcile::start(
                &ctx,
                experiment_id,
                &body.service_name,
                &body.deployment_name,
                body.deployment_id,
                &body.role_name,
            )
            .await
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    #[serde(default)]
    since: i64,
}

#[instrument(skip(state))]
async fn read_audit_log(
    State(state): State<Arc<AppState>>,
    Path(experiment_id): Path<i64>,
    axum::extract::Query(query): axum::extract::Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let entries = state.store.entries_since(experiment_id, query.since).await?;
    Ok(Json(entries))
}

/// Routes a reconciliation job through the per-(subscription, cloud
/// service, deployment) FIFO lane and fires it off without blocking the
/// request; the caller polls `/experiments/:id/audit` for progress.
async fn enqueue<F>(
    state: &AppState,
    experiment_id: i64,
    cloud_service: &str,
    deployment: &str,
    job: F,
) -> Result<StatusCode, ApiError>
where
    F: FnOnce(EngineContext) -> futures::future::BoxFuture<'static, Result<(), Error>>
        + Send
        + 'static,
{
    let experiment = state
        .store
        .get_experiment(experiment_id)
        .await?
        .ok_or_else(|| Error::custom(nimbus_common::ErrorKind::StateIllegal, "unknown experiment"))?;
    let ctx = state.engine.clone();
    let key = (experiment.subscription_id, cloud_service.to_string(), deployment.to_string());
    let work = job(ctx);
    state
        .router
        .route(
            key,
            Box::pin(async move {
                if let Err(err) = work.await {
                    tracing::warn!(experiment_id, error = %err, "reconciliation job failed");
                }
            }),
        )
        .await;
    Ok(StatusCode::ACCEPTED)
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}
