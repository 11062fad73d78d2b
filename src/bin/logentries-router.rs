use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use logentries_router::pipeline::{builder, stdin};
use logentries_router::server;
use logentries_router::utils::constants::{DEFAULT_CONFIG_PATH, DEFAULT_HTTP_TIMEOUT_MS};
use logentries_router::utils::logging::LogLevel;
use logentries_router::utils::{channel, config_loader, logging};
use reqwest::Client;
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// Do not list existing logsets before the first event.
    #[arg(long, env = "SKIP_WARM_UP")]
    skip_warm_up: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, start logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level);
    let output = &service_config.output;

    // -------------------------------
    // 2. Build resolver and delivery channel
    // -------------------------------

    let client = Client::builder()
        .timeout(Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS))
        .build()?;
    let router = Arc::new(builder::build_router(output, client)?);

    // -------------------------------
    // 3. Warm the logset cache
    // -------------------------------

    if !args.skip_warm_up {
        if let Err(e) = router.resolver().warm_up().await {
            warn!("cache warm-up failed, names will be resolved lazily: {}", e);
        }
    }

    // -------------------------------
    // 4. Read events from stdin and route them
    // -------------------------------

    let (sender, receiver) = channel::run();
    let reader = stdin::read_batches(BufReader::new(tokio::io::stdin()), output.batch_size, sender);
    let worker = stdin::drain(router, receiver);
    let pipeline = async { tokio::try_join!(reader, worker).map(|_| ()) };

    // -------------------------------
    // 5. Metrics endpoint
    // -------------------------------

    let http_server = server::server::start(&service_config.settings);

    info!("Service starting...");
    tokio::select! {
        result = pipeline => result?,
        result = http_server, if service_config.settings.metrics.is_enabled => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }

    Ok(())
}
