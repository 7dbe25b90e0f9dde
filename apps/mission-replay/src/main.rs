use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mission_replay::cli::Cli;
use mission_replay::config::{self, RunConfig, Timings};
use mission_replay::{telemetry, MissionOutcome, MissionRunner, RunReport};
use robot_sdk::sim::SimulatedRobot;
use robot_sdk::{HttpRobotClient, RobotApi};
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = telemetry::init_tracing(cli.verbose) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(report) => {
            match report.outcome {
                MissionOutcome::Succeeded => info!("mission replay complete"),
                MissionOutcome::Skipped => info!("static replay complete"),
                MissionOutcome::Failed => warn!("mission replay finished with a failed mission"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("mission replay aborted: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let config = RunConfig::try_from(&cli)?;
    let credentials = config::load_credentials(&cli)?;

    info!(
        mission = %config.mission_file.display(),
        map = ?config.map_directory,
        hostname = %config.hostname,
        "replaying mission"
    );

    let api = robot_api(&cli, &config)?;
    let runner = MissionRunner::connect(api, config, &credentials, Timings::default()).await?;
    Ok(runner.run().await?)
}

fn robot_api(cli: &Cli, config: &RunConfig) -> Result<Arc<dyn RobotApi>> {
    if cli.simulate {
        info!("using simulated robot");
        let api: Arc<dyn RobotApi> = SimulatedRobot::builder().build();
        return Ok(api);
    }

    let ca_pem = cli
        .ca_cert
        .as_deref()
        .map(|path| {
            std::fs::read(path)
                .with_context(|| format!("failed to read CA certificate {}", path.display()))
        })
        .transpose()?;
    let client = HttpRobotClient::for_hostname(&config.hostname, ca_pem.as_deref())
        .with_context(|| format!("failed to create client for {}", config.hostname))?;
    Ok(Arc::new(client))
}
