//! trala-server binary: dashboard backend
//!
//! Run with:
//! ```bash
//! cargo run -p trala-server -- --config /config/configuration.yml --port 8080
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trala_core::TralaConfig;
use trala_server::metrics::init_prometheus_recorder;
use trala_server::ServerBuilder;

#[derive(Parser, Debug)]
#[command(name = "trala-server")]
#[command(about = "Dashboard backend for services behind a reverse proxy")]
struct Args {
    /// Configuration file (YAML); missing file means defaults plus environment
    #[arg(long, default_value = "/config/configuration.yml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // log_level lives in the config, so loading it logs through a temporary subscriber
    let (config, status) = {
        let bootstrap = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(&bootstrap))
                .finish(),
        );
        TralaConfig::from_sources(Some(args.config.as_path()), |key| std::env::var(key).ok())?
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.environment.log_level)),
        )
        .init();

    tracing::info!(
        api_host = %config.environment.traefik.api_host,
        grouping = config.environment.grouping.enabled,
        icon_dir = %config.environment.icons.directory.display(),
        "Starting trala"
    );

    let metrics = init_prometheus_recorder()?;
    let server = ServerBuilder::new(config, status)
        .port(args.port)
        .metrics(metrics)
        .build()?;

    tracing::info!("Server ready on port {}", args.port);
    server.run().await?;

    Ok(())
}
