//! badgesync server - hub event ingestion over TCP

mod startup;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use startup::{Args, Startup};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!("Starting badgesync");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("badgesync failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), startup::StartupError> {
    let startup = Startup::from_args(&args)?;
    let server = startup.serve().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received");
    server.shutdown();
    Ok(())
}
