#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for taxi demand forecasts.
//!
//! Loads every artifact and dataset once at startup, then answers
//! forecast queries from shared read-only state. A failure to load is
//! fatal; the server never binds without a working pipeline.

pub mod bootstrap;
mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use taxi_demand::DemandError;
use taxi_demand::service::DemandService;
use taxi_demand_artifacts::download::NoProgress;
use taxi_demand_config::DemandConfig;

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The pipeline could not be prepared.
    #[error("Startup failed: {0}")]
    Startup(#[from] DemandError),

    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state.
pub struct AppState {
    /// The query pipeline.
    pub service: DemandService,
    /// Registry version of the served model, if known.
    pub model_version: Option<String>,
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/forecast", web::get().to(handlers::forecast))
            .route("/regions", web::get().to(handlers::regions)),
    );
}

/// Prepares the pipeline described by `config` and serves it until
/// shutdown.
///
/// # Errors
///
/// Returns [`ServerError::Startup`] if artifacts or datasets cannot be
/// loaded, or [`ServerError::Io`] if the server cannot bind.
pub async fn run_server(config: DemandConfig) -> Result<(), ServerError> {
    log::info!("Preparing demand pipeline...");
    let service = bootstrap::prepare_service(&config, &NoProgress).await?;
    let model_version = bootstrap::serving_model_version(&config.registry).await;

    let state = web::Data::new(AppState {
        service,
        model_version,
    });

    let bind_addr = config.server.bind_addr.clone();
    let port = config.server.port;

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await?;

    Ok(())
}
