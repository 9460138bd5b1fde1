//! Exercises a dongle licensing backend once at startup, then serves license summaries and
//! on-demand checks over HTTP.
use std::process::ExitCode;

use grdlic::sim::SimulatedGateway;
use log::{error, info};

use crate::{
    check::{check_license, Outcome, Settings},
    configuration::{config_path, read_config, write_config},
};

mod check;
mod configuration;
mod server;

#[tokio::main]
async fn main() -> ExitCode {
    app_logging::init_logger();
    info!("Example of using the licensing API");

    let path = config_path();
    let config = match read_config(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:?}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = path.as_deref().filter(|p| !p.exists()) {
        match write_config(&config, path) {
            Ok(()) => info!("Wrote default config to {path:?}"),
            Err(e) => error!("Could not write default config to {path:?}: {e:?}"),
        }
    }

    let gateway = SimulatedGateway::new(config.backend.clone());
    let settings = Settings::from(&config);

    if let Outcome::Fatal(_) = check_license(&gateway, &settings) {
        error!("Error. Quit program");
        return ExitCode::FAILURE;
    }

    if !config.web.enabled {
        return ExitCode::SUCCESS;
    }
    if let Err(e) = server::serve(&config.web, server::AppState::new(gateway, settings)).await {
        error!("Server stopped with error: {e:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
