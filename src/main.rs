use std::process;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

use umlpipe::{
    application::{
        error::AppError,
        render::{DirectRenderer, PoolConfig, RenderPool, RenderService},
    },
    cache::{CacheConfig, RenderCache, RenderSource},
    client,
    config::{self, Command},
    infra::{
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    let (cli, settings) = match config::load_with_cli() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("umlpipe: {err}");
            process::exit(2);
        }
    };

    match cli.command {
        Command::Daemon(_) => {
            if let Err(error) = run_daemon(settings).await {
                report_application_error(&error);
                process::exit(1);
            }
        }
        command => {
            if let Err(err) = client::run(command, settings.client.addr.as_deref()).await {
                eprintln!("umlpipe: {err}");
                process::exit(1);
            }
        }
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

async fn run_daemon(settings: config::Settings) -> Result<(), AppError> {
    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let pool = RenderPool::start(PoolConfig::from(&settings.render))
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    let direct = Arc::new(DirectRenderer::new(pool));

    let cache_config = CacheConfig::from_settings(&settings.cache);
    let cache = cache_config.as_ref().map(|cache_config| {
        let source: Arc<dyn RenderSource> = direct.clone();
        Arc::new(RenderCache::new(cache_config.clone(), source))
    });

    let service = Arc::new(RenderService::new(direct, cache));
    let state = ApiState {
        render: service.clone(),
    };

    let api_listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    info!(
        target = "umlpipe::daemon",
        addr = %settings.server.addr,
        workers = settings.render.workers.get(),
        cache = cache_config.is_some(),
        "starting server"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let graceful = settings.server.graceful_shutdown;
    tokio::spawn(async move {
        shutdown_signal().await;
        info!(
            target = "umlpipe::daemon",
            "caught signal, waiting for requests to finish"
        );
        let _ = shutdown_tx.send(true);
        tokio::time::sleep(graceful).await;
        error!(
            target = "umlpipe::daemon",
            "graceful shutdown deadline expired, exiting"
        );
        process::exit(1);
    });

    let api_server = axum::serve(
        api_listener,
        http::build_api_router(state.clone()).into_make_service(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let result = match cache_config {
        Some(cache_config) => {
            let cache_addr: std::net::SocketAddr = cache_config
                .local_addr
                .parse()
                .map_err(|err| AppError::unexpected(format!("invalid cache address: {err}")))?;
            let cache_listener = tokio::net::TcpListener::bind(cache_addr)
                .await
                .map_err(|err| AppError::from(InfraError::Io(err)))?;
            info!(
                target = "umlpipe::daemon",
                addr = %cache_addr,
                members = cache_config.members.len() + 1,
                "starting cache listener"
            );
            let cache_server = axum::serve(
                cache_listener,
                http::build_cache_router(state).into_make_service(),
            )
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

            tokio::try_join!(api_server, cache_server).map(|_| ())
        }
        None => api_server.await,
    };

    service.shutdown();
    info!(target = "umlpipe::daemon", "all requests finished, shutting down");
    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.changed().await;
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                error!(
                    target = "umlpipe::daemon",
                    error = %err,
                    "failed to register SIGTERM handler"
                );
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
