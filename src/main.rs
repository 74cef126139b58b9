use std::path::PathBuf;

use ::tracing::{error, info, info_span};
use clap::Parser;
use service::Service;
use utoipa::OpenApi;

mod asset_store;
mod config;
mod data_model;
mod folders;
mod http_objects;
#[cfg(test)]
mod integration_test_http_routes;
mod logging;
use logging::setup_logging;
mod organizer;
mod proxy;
mod registry;
mod routes;
mod service;
#[cfg(test)]
mod testing;
mod transform;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "output file",
        help = "Write the OpenAPI document to a file and exit"
    )]
    gen_openapi: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(path) = cli.gen_openapi {
        let written = routes::ApiDoc::openapi()
            .to_pretty_json()
            .map_err(anyhow::Error::from)
            .and_then(|doc| std::fs::write(&path, doc).map_err(anyhow::Error::from));
        if let Err(err) = written {
            eprintln!("Error writing openapi document: {:?}", err);
            std::process::exit(1);
        }
        return;
    }

    let config = match cli.config {
        Some(path) => match config::ServerConfig::from_path(&path.to_string_lossy()) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error loading config {}: {:?}", path.display(), err);
                std::process::exit(1);
            }
        },
        None => config::ServerConfig::default(),
    };

    if let Err(err) = setup_logging(&config) {
        eprintln!("Error setting up logging, continuing without it: {:?}", err);
    }

    let root_span = info_span!("media-resolver", env = config.env);
    let _guard = root_span.enter();
    info!(
        registry = %config.registry.path.display(),
        backend = ?config.asset_store.backend,
        "starting media resolver"
    );

    let service = match Service::new(config).await {
        Ok(service) => service,
        Err(err) => {
            error!("Error creating service: {:?}", err);
            return;
        }
    };
    if let Err(err) = service.start().await {
        error!("Error starting service: {:?}", err);
    }
}
