use std::sync::Arc;

use anyhow::{Context, Result, bail};
use drone_link::DEFAULT_PORT;
use drone_link::ground::{GroundConfig, GroundStation, ReaderInput, StdoutConsole};
use drone_link::link::{DEFAULT_CORRUPTION_RATE, LinkConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let address = std::env::var("DRONE_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
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

    let config = GroundConfig::builder()
        .address(address)
        .port(port)
        .link(
            LinkConfig::builder()
                .corruption_rate(corruption_rate)
                .read_buffer_size(512)
                .build(),
        )
        .build();
    let station = GroundStation::new(config);

    let (stream, session) = station.connect().await?;
    println!("Connected to drone. Commands: TAKEOFF, LAND, STOP, GOTO x y z");

    let summary = station
        .run(stream, session, ReaderInput::stdin(), Arc::new(StdoutConsole))
        .await?;

    info!(
        sent = summary.commands_sent,
        acknowledged = summary.acknowledged,
        timed_out = summary.timed_out,
        "Ground station shutting down"
    );
    Ok(())
}
