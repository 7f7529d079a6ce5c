use anyhow::{anyhow, Result};
use is_terminal::IsTerminal;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xfrcrab::{Config, SharedConfig, StaticZone};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("xfrcrab".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let zone = StaticZone::new(&config)?;
    tracing::info!(
        "serving {} ({} records) to {} slave(s)",
        config.domain,
        zone.records().len(),
        config.slaves.len()
    );

    let (zone_server, listener) = xfrcrab::dns::new(config.clone(), Arc::new(zone)).await?;
    tracing::info!("DNS listening on TCP {}", listener.local_addr()?);
    let dns_handle = tokio::spawn(zone_server.clone().serve(listener));

    // Secondaries may have missed changes while we were down.
    zone_server.notify();

    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_server = xfrcrab::api::new(config.clone(), zone_server);
    let api_handle = tokio::spawn(api_server);

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(dns_res) = dns_handle => {
            if let Err(err) = dns_res {
                return Err(err.into())
            }
        }
        Ok(api_res) = api_handle => {
            if let Err(err) = api_res {
                return Err(err.into())
            }
        }
    }
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xfrcrab=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}
