#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for taxi demand forecasts.
//!
//! ```text
//! taxi_demand predict --date 2016-03-01 --time 10:00 [--scope complete]
//! taxi_demand fetch
//! taxi_demand serve
//! taxi_demand promote [--from Staging] [--to Production]
//! taxi_demand check-model [--run-info run_information.json]
//! ```
//!
//! Every command accepts `--config <path>` to overlay the built-in
//! defaults. Uses `indicatif-log-bridge` (via
//! [`taxi_demand_cli_utils::init_logger`]) so that log lines and download
//! bars never fight for the terminal.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use taxi_demand::service::DemandRequest;
use taxi_demand_artifacts::download::FetchOutcome;
use taxi_demand_cli_utils::IndicatifDownloadProgress;
use taxi_demand_config::DemandConfig;
use taxi_demand_models::{DemandForecast, MapScope};
use taxi_demand_registry::{ModelStage, RegistryClient, load_run_information};
use taxi_demand_server::bootstrap;

#[derive(Parser)]
#[command(name = "taxi_demand", about = "Nearest-zone taxi demand forecasts")]
struct Cli {
    /// TOML file overlaid on the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast demand for a date and time
    Predict {
        /// Date, YYYY-MM-DD (defaults to `query.default_date`)
        #[arg(long, value_parser = parse_value::<NaiveDate>)]
        date: Option<NaiveDate>,
        /// Time, HH:MM or HH:MM:SS
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,
        /// `complete` or `neighborhood`
        #[arg(long, default_value = "neighborhood", value_parser = parse_value::<MapScope>)]
        scope: MapScope,
        /// Seed for sampling the current location
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Download any missing model artifacts
    Fetch,
    /// Start the HTTP server
    Serve,
    /// Move the newest staged model version to production
    Promote {
        /// Stage to take the candidate from (default from config)
        #[arg(long, value_parser = parse_value::<ModelStage>)]
        from: Option<ModelStage>,
        /// Stage to move it to (default from config)
        #[arg(long, value_parser = parse_value::<ModelStage>)]
        to: Option<ModelStage>,
    },
    /// Check that the trained model can be loaded from the registry
    CheckModel {
        /// Run information file with a `model_uri` key
        #[arg(long)]
        run_info: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = taxi_demand_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = DemandConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Predict {
            date,
            time,
            scope,
            seed,
        } => {
            let progress = IndicatifDownloadProgress::new(multi);
            let service = bootstrap::prepare_service(&config, &progress).await?;

            let request = DemandRequest {
                date,
                time: Some(time),
                scope,
            };
            let forecast = match seed {
                Some(seed) => {
                    service.forecast_with_rng(&request, &mut StdRng::seed_from_u64(seed))?
                }
                None => service.forecast(&request)?,
            };

            print_forecast(&forecast);
        }
        Commands::Fetch => {
            let progress = IndicatifDownloadProgress::new(multi);
            let outcomes = bootstrap::fetch_artifacts(&config.artifacts, &progress).await?;

            let mut downloaded = 0_u64;
            for (source, outcome) in &outcomes {
                let kind = source.kind.to_string();
                match outcome {
                    FetchOutcome::Cached => {
                        println!("{kind:<8} cached      {}", source.local_path.display());
                    }
                    FetchOutcome::Downloaded { bytes } => {
                        downloaded += bytes;
                        println!(
                            "{kind:<8} downloaded  {} ({bytes} bytes)",
                            source.local_path.display()
                        );
                    }
                }
            }
            log::info!("{} artifacts ready, {downloaded} bytes fetched", outcomes.len());
        }
        Commands::Serve => {
            // actix-web needs its own system; keep it off the tokio runtime.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(taxi_demand_server::run_server(config))
            })
            .await??;
        }
        Commands::Promote { from, to } => {
            let client = registry_client(&config)?;
            let from = from.map_or_else(
                || config.registry.staging_stage.parse::<ModelStage>(),
                Ok,
            )?;
            let to = to.map_or_else(
                || config.registry.serving_stage.parse::<ModelStage>(),
                Ok,
            )?;

            let promoted = client.promote(&config.registry.model_name, from, to).await?;

            println!(
                "The model is moved to the {} stage having version number {}",
                promoted.current_stage, promoted.version
            );
        }
        Commands::CheckModel { run_info } => {
            let path = run_info.unwrap_or_else(|| config.registry.run_information.clone());
            let info = load_run_information(&path)?;
            let uri = info.parsed_uri()?;

            let client = registry_client(&config)?;
            let resolved = client.check_model_loadable(&uri).await?;

            match &resolved.version {
                Some(version) => println!(
                    "{uri} loads version {} ({}) from {}",
                    version.version, version.current_stage, resolved.artifact_uri
                ),
                None => println!("{uri} loads from {}", resolved.artifact_uri),
            }
        }
    }

    Ok(())
}

fn registry_client(config: &DemandConfig) -> Result<RegistryClient, Box<dyn std::error::Error>> {
    let uri = config
        .registry
        .tracking_uri
        .as_deref()
        .ok_or("MLFLOW_TRACKING_URI is not set")?;
    Ok(RegistryClient::new(uri, config.registry.credentials())?)
}

fn print_forecast(forecast: &DemandForecast) {
    let location = forecast.location;

    println!("Prediction time: {}", forecast.prediction_time);
    println!(
        "Current location: {:.6}, {:.6} (region {})",
        location.latitude, location.longitude, location.region
    );
    println!("Scope: {}", forecast.scope);
    println!();

    if forecast.legend.is_empty() {
        println!("No regions to show.");
        return;
    }

    for entry in &forecast.legend {
        println!("{entry}  {}", entry.color);
    }
}

/// Argument parser for any `FromStr` type, keeping its error message.
fn parse_value<T: FromStr>(s: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    s.trim().parse().map_err(|e| format!("'{s}': {e}"))
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| format!("'{s}' is not HH:MM or HH:MM:SS"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_predict_arguments() {
        let cli = Cli::try_parse_from([
            "taxi_demand",
            "predict",
            "--date",
            "2016-03-01",
            "--time",
            "10:30",
            "--scope",
            "complete",
            "--config",
            "local.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
        assert!(matches!(
            cli.command,
            Commands::Predict { time, scope: MapScope::Complete, seed: None, .. }
                if time == NaiveTime::from_hms_opt(10, 30, 0).unwrap()
        ));
    }

    #[test]
    fn promote_stages_parse_case_insensitively() {
        let cli =
            Cli::try_parse_from(["taxi_demand", "promote", "--from", "staging"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Promote { from: Some(ModelStage::Staging), to: None }
        ));
    }

    #[test]
    fn predict_date_and_scope_are_optional() {
        let cli = Cli::try_parse_from(["taxi_demand", "predict", "--time", "08:00"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Predict { date: None, scope: MapScope::Neighborhood, .. }
        ));
    }

    #[test]
    fn unknown_scope_and_stage_are_rejected() {
        assert!(
            Cli::try_parse_from(["taxi_demand", "predict", "--time", "08:00", "--scope", "city"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["taxi_demand", "promote", "--to", "live"]).is_err());
    }

    #[test]
    fn value_parser_keeps_the_input_in_its_message() {
        assert_eq!(parse_value::<ModelStage>(" Production "), Ok(ModelStage::Production));
        assert!(
            parse_value::<MapScope>("city")
                .unwrap_err()
                .starts_with("'city':")
        );
    }

    #[test]
    fn rejects_malformed_time() {
        assert!(
            Cli::try_parse_from(["taxi_demand", "predict", "--date", "2016-03-01", "--time", "noon"])
                .is_err()
        );
    }
}
