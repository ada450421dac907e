mod api;
mod args;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nimbus_engine::{EngineContext, TaskRouter};
use nimbus_provider::FakeProvider;
use nimbus_store::Store;
use tracing::{info, trace};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::api::{make_api, AppState};
use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let fmt_layer = fmt::layer();
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap();
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    trace!(args = ?args, "parsed args");

    let store = Store::new(&args.state).await?;

    // No real IaaS SDK sits in this workspace's dependency stack; the
    // provider is the extension point a production deployment swaps in.
    let provider: Arc<dyn nimbus_provider::ProviderClient> = Arc::new(FakeProvider::new());

    let engine = EngineContext::new(provider, store.clone());
    let router = TaskRouter::new();

    let state = AppState {
        store,
        engine,
        router,
        certificates_dir: PathBuf::from(&args.certificates_dir),
        management_host: args.management_host.clone(),
    };

    info!(bind = %args.bind, "starting nimbus-server");

    let api = make_api(state);
    axum::Server::bind(&args.bind).serve(api.into_make_service()).await?;

    Ok(())
}
