use anyhow::{Context, Result, bail};
use drone_link::DEFAULT_PORT;
use drone_link::drone::{DroneConfig, DroneNode};
use drone_link::link::{DEFAULT_CORRUPTION_RATE, LinkConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let bind_address = std::env::var("DRONE_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = match std::env::var("DRONE_PORT") {
        Ok(port) => port.parse().context("DRONE_PORT must be a port number")?,
        Err(_) => DEFAULT_PORT,
    };
    let corruption_rate = match std::env::var("CORRUPTION_RATE") {
        Ok(rate) => rate.parse().context("CORRUPTION_RATE must be a number")?,
        Err(_) => DEFAULT_CORRUPTION_RATE,
    };
    if !(0.0..=1.0).contains(&corruption_rate) {
        bail!("CORRUPTION_RATE must be within [0, 1], got {corruption_rate}");
    }
    let log_path =
        std::env::var("TELEMETRY_LOG").unwrap_or_else(|_| "telemetry_log.csv".to_string());

    let config = DroneConfig::builder()
        .bind_address(bind_address)
        .port(port)
        .link(LinkConfig::builder().corruption_rate(corruption_rate).build())
        .log_path(log_path.into())
        .build();
    let node = DroneNode::new(config);

    let listener = node.bind().await?;
    let summary = node.serve(listener).await?;

    info!(
        commands = summary.commands_handled,
        telemetry = summary.telemetry_sent,
        "Drone shutting down"
    );
    Ok(())
}
