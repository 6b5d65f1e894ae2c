use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use inkshop::{
    application::{catalog::CatalogService, error::AppError},
    cache::{
        CacheConfig, CacheTrigger, CachedLoader, NoopRegenerator, RegenerationHook, ResourceCache,
        SharedClock, SystemClock, TimestampRegistry,
    },
    client::{ClientCacheManager, ClientSyncReconciler, FileVersionStore, RegistryClient},
    config::{self, RemoteArgs},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        revalidate::WebhookRegenerator,
        store::JsonDirStore,
        telemetry,
    },
};
use serde::Serialize;
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Invalidate(args) => run_invalidate(args).await,
        config::Command::Versions(args) => run_versions(args).await,
        config::Command::Sync(args) => run_sync(args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let clock: SharedClock = Arc::new(SystemClock);
    let registry = Arc::new(TimestampRegistry::new(clock.clone()));
    let loader = CachedLoader::new(
        Arc::new(ResourceCache::new(clock.clone())),
        registry.clone(),
        clock,
    );
    let store = Arc::new(JsonDirStore::new(settings.store.data_dir.clone()));
    let catalog = CatalogService::new(store, loader, CacheConfig::from(&settings.cache));

    let hook: Arc<dyn RegenerationHook> = match settings.invalidation.revalidate_url.clone() {
        Some(url) => Arc::new(WebhookRegenerator::new(
            url,
            settings.invalidation.revalidate_timeout,
        )?),
        None => Arc::new(NoopRegenerator),
    };
    if settings.invalidation.secret.is_none() {
        warn!("invalidation secret is not configured; every invalidation request will be rejected");
    }
    let trigger =
        CacheTrigger::new(registry, settings.invalidation.secret.clone()).with_hook(hook);

    let router = http::build_router(HttpState {
        catalog: Arc::new(catalog),
        trigger: Arc::new(trigger),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;
    info!(
        addr = %settings.server.addr,
        data_dir = %settings.store.data_dir.display(),
        cache_enabled = settings.cache.enabled,
        "inkshop listening"
    );

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        shutdown_signal().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::from(InfraError::Serve(err)))?;
        }
        () = deadline => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn remote_client(remote: &RemoteArgs) -> Result<RegistryClient, AppError> {
    Ok(RegistryClient::new(
        &remote.server,
        Duration::from_millis(remote.timeout_ms),
    )?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_invalidate(args: config::InvalidateArgs) -> Result<(), AppError> {
    let client = remote_client(&args.remote)?;
    let response = client.invalidate(args.resource, &args.secret).await?;
    print_json(&response)
}

async fn run_versions(args: config::VersionsArgs) -> Result<(), AppError> {
    let client = remote_client(&args.remote)?;
    let snapshot = client.snapshot().await?;
    print_json(&snapshot)
}

async fn run_sync(args: config::SyncArgs) -> Result<(), AppError> {
    let client = remote_client(&args.remote)?;
    let manager = Arc::new(ClientCacheManager::<serde_json::Value>::new(Arc::new(
        SystemClock,
    )));
    let reconciler = ClientSyncReconciler::new(
        manager,
        Arc::new(client),
        Arc::new(FileVersionStore::new(args.state_file)),
    );
    let report = reconciler.run_once().await;
    print_json(&json!({
        "outcome": report.outcome,
        "changed": report.invalidated,
    }))
}
