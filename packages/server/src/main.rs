#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standalone server binary. Reads an optional config file from
//! `TAXI_DEMAND_CONFIG`.

use std::path::PathBuf;

use taxi_demand_config::DemandConfig;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config_path = std::env::var_os("TAXI_DEMAND_CONFIG").map(PathBuf::from);
    let config = DemandConfig::load(config_path.as_deref())?;

    taxi_demand_server::run_server(config).await?;

    Ok(())
}
