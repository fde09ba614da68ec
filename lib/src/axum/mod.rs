pub mod batches;
pub mod dispatch;
pub mod entries;
pub mod error;
pub mod settings;

use std::sync::Arc;

use axum::Extension;
use tower_http::trace::TraceLayer;

use crate::{BatchController, Config, ErrorKind, Result};

pub type Router = axum::Router;

pub type ConfigExt<C = Config> = Extension<Arc<C>>;
pub type ControllerExt = Extension<Arc<BatchController>>;

/// Registers mailshot routes on the provided router.
///
/// Meant to be used if there is a need to register custom middleware that will
/// run on mailshot routes.
///
/// # Configurable routes
///
/// Route groups (`entries`, `settings`, `dispatch`, `batches`) can be switched
/// off through the `routes.disable` config list. Listing a group under
/// `routes.enable` keeps it registered regardless.
pub fn router(mut router: Router, config: &Config) -> Router {
    router = conditional_merge("entries", router, entries::router(), config);
    router = conditional_merge("settings", router, settings::router(), config);
    router = conditional_merge("dispatch", router, dispatch::router(), config);
    conditional_merge("batches", router, batches::router(), config)
}

fn conditional_merge(route: &str, routera: Router, routerb: Router, config: &Config) -> Router {
    if config.routes.enable.contains(&route.to_string())
        || !config.routes.disable.contains(&route.to_string())
    {
        routera.merge(routerb)
    } else {
        routera
    }
}

/// Registers mailshot routes on the provided router, sets up the batch
/// controller as described by the config and starts the web server.
pub async fn start(router: Router, config: Config) -> Result<()> {
    let controller = BatchController::from_config(&config)?;
    start_with(Arc::new(controller), router, config).await
}

pub async fn start_with(
    controller: Arc<BatchController>,
    router: Router,
    config: Config,
) -> Result<()> {
    crate::tracing::init(&config).unwrap_or_else(|e| {
        log::warn!("failed to initialize tracing (perhaps it was already initialized?): {e}")
    });

    let addr = config.address;

    let router = self::router(router, &config)
        .layer(TraceLayer::new_for_http())
        // Register common state extensions for all routes
        .layer(Extension(controller))
        .layer(Extension(Arc::new(config)));

    // Serve the application
    tracing::info!("starting server at {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ErrorKind::Other(format!("failed binding to {addr}: {e}")))?;
    axum::serve(listener, router).await.map_err(|e| e.into())
}
