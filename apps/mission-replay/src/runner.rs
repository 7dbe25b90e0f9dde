use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use robot_sdk::{Credentials, LeaseWallet, Robot, RobotApi, RobotError, BODY_RESOURCE};
use tracing::{error, info};

use crate::config::{ExecutionMode, RunConfig, Timings};
use crate::error::ReplayError;
use crate::execute::{self, PlayPolicy};
use crate::map::GraphBundle;
use crate::{mission, preflight};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOutcome {
    /// Static mode: the robot stood up and the mission was never played.
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: MissionOutcome,
}

/// Drives one replay: lease, uploads, stand, play, and the unconditional
/// power-off and lease return at the end.
pub struct MissionRunner {
    robot: Robot,
    config: RunConfig,
    timings: Timings,
}

impl MissionRunner {
    /// Authenticate and wait for time sync. Nothing that needs a lease happens here.
    pub async fn connect(
        api: Arc<dyn RobotApi>,
        config: RunConfig,
        credentials: &Credentials,
        timings: Timings,
    ) -> Result<Self, ReplayError> {
        let mut robot = Robot::new(config.hostname.clone(), api);
        robot.authenticate(credentials).await?;
        robot
            .wait_for_sync(timings.sync_rounds, timings.sync_interval)
            .await?;
        Ok(Self {
            robot,
            config,
            timings,
        })
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    /// Acquire the body lease and replay. Once the lease is granted, power off
    /// and lease return run exactly once whatever happens in between, panics
    /// included. A robot left powered on fails the run after the lease is back.
    pub async fn run(&self) -> Result<RunReport, ReplayError> {
        info!("acquiring lease");
        let lease = self
            .robot
            .api()
            .acquire_lease(BODY_RESOURCE)
            .await
            .map_err(ReplayError::LeaseNotAcquired)?;
        info!(%lease, "lease acquired");

        let mut wallet = LeaseWallet::new();
        wallet.add(lease);

        let replayed = AssertUnwindSafe(self.replay(&mut wallet))
            .catch_unwind()
            .await;
        let released = self.release(&mut wallet).await;

        let replayed = match replayed {
            Ok(replayed) => replayed,
            Err(payload) => {
                if let Err(err) = released {
                    error!(error = %err, "release after panic failed");
                }
                panic::resume_unwind(payload);
            }
        };

        match (replayed, released) {
            (Ok(outcome), Ok(())) => Ok(RunReport { outcome }),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(release_err)) => {
                error!(error = %release_err, "release failed");
                Err(err)
            }
        }
    }

    async fn replay(&self, wallet: &mut LeaseWallet) -> Result<MissionOutcome, ReplayError> {
        self.upload(wallet).await?;

        preflight::verify_estop(&self.robot).await?;
        if !preflight::ensure_power_on(&self.robot, wallet, self.timings.power_timeout).await? {
            return Err(ReplayError::PowerOnFailed);
        }
        preflight::stand(&self.robot, wallet, self.timings.stand_settle).await?;

        let policy = PlayPolicy::new(&self.config, &self.timings);
        let success = match self.config.mode {
            ExecutionMode::Static => {
                info!("static mode; leaving the robot standing");
                return Ok(MissionOutcome::Skipped);
            }
            ExecutionMode::Once => execute::run_mission(&self.robot, wallet, &policy).await?,
            ExecutionMode::RepeatFor(total) => {
                execute::repeat_mission(&self.robot, wallet, total, &policy).await?
            }
        };

        if success {
            info!("mission succeeded");
            Ok(MissionOutcome::Succeeded)
        } else {
            info!("mission failed");
            Ok(MissionOutcome::Failed)
        }
    }

    /// Input files are checked here, with the lease already held, so a missing
    /// file still goes through release.
    async fn upload(&self, wallet: &LeaseWallet) -> Result<(), ReplayError> {
        let mission_file = &self.config.mission_file;
        if !mission_file.is_file() {
            let err = ReplayError::MissingMissionFile(mission_file.clone());
            error!("{err}");
            return Err(err);
        }

        if let Some(map_directory) = &self.config.map_directory {
            if !map_directory.is_dir() {
                let err = ReplayError::MissingMapDirectory(map_directory.clone());
                error!("{err}");
                return Err(err);
            }

            let lease = wallet.get(BODY_RESOURCE)?;
            info!("clearing graph-nav state");
            self.robot.api().clear_graph(lease).await?;

            let bundle = GraphBundle::load(map_directory)?;
            bundle.upload(&self.robot, lease).await?;
        }

        let root = mission::load_mission(mission_file)?;
        mission::upload_mission(&self.robot, &root, wallet.get(BODY_RESOURCE)?).await
    }

    async fn release(&self, wallet: &mut LeaseWallet) -> Result<(), ReplayError> {
        let powered_off =
            preflight::ensure_power_off(&self.robot, wallet, self.timings.power_timeout).await;

        info!("returning lease");
        let lease = wallet
            .remove(BODY_RESOURCE)
            .ok_or_else(|| RobotError::NoLeaseForResource(BODY_RESOURCE.to_string()))?;
        self.robot.api().return_lease(&lease).await?;
        info!(%lease, "lease returned");

        if powered_off {
            Ok(())
        } else {
            Err(ReplayError::PowerOffFailed)
        }
    }
}
