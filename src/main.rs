//! skycache - Cached Open-Meteo forecasts on the command line
//!
//! Prints the forecast for a location as JSON. Responses are cached on disk;
//! when the API rate limits us, the last cached response is served instead.

use std::process::ExitCode;

use clap::Parser;

use skycache::cli::{Cli, Envelope, ErrorEnvelope};
use skycache::{logging, CacheCoordinator};

/// Prints a JSON document to stdout
fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to render response: {}", e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let request = match cli.forecast_request() {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    let store = match cli.disk_store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    let coordinator = CacheCoordinator::new(store, cli.service_config());

    match coordinator.fetch(&request.to_params()).await {
        Ok(result) => {
            print_json(&Envelope::from(result));
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_json(&ErrorEnvelope::new(&e));
            ExitCode::FAILURE
        }
    }
}
