use std::time::Duration;

use robot_sdk::{LeaseWallet, Robot, BODY_RESOURCE};
use time::OffsetDateTime;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::{RunConfig, Timings};
use crate::error::ReplayError;

/// Knobs of the play/poll loop.
#[derive(Debug, Clone)]
pub struct PlayPolicy {
    pub fail_on_question: bool,
    /// How far past "now" each play request lets the mission run.
    pub mission_timeout: Duration,
    pub poll_interval: Duration,
    pub restart_timeout: Duration,
    pub restart_settle: Duration,
}

impl PlayPolicy {
    pub fn new(config: &RunConfig, timings: &Timings) -> Self {
        Self {
            fail_on_question: config.fail_on_question,
            mission_timeout: config.mission_timeout,
            poll_interval: timings.poll_interval,
            restart_timeout: timings.restart_timeout,
            restart_settle: timings.restart_settle,
        }
    }
}

/// Keep the loaded mission playing until it leaves NONE/RUNNING. Returns true
/// for SUCCESS or PAUSED.
pub async fn run_mission(
    robot: &Robot,
    wallet: &mut LeaseWallet,
    policy: &PlayPolicy,
) -> Result<bool, ReplayError> {
    info!("running mission");

    let mut state = robot.api().mission_state().await?;
    while state.status.is_active() {
        // Questions in autowalk missions usually mean the robot got lost.
        if policy.fail_on_question && !state.questions.is_empty() {
            info!(
                questions = state.questions.len(),
                first = %state.questions[0].text,
                "mission failed by triggering operator question"
            );
            return Ok(false);
        }

        let lease = wallet.advance(BODY_RESOURCE)?;
        let pause_time = deadline(robot, policy.mission_timeout)?;
        robot
            .api()
            .play_mission(pause_time, std::slice::from_ref(&lease))
            .await?;
        sleep(policy.poll_interval).await;

        state = robot.api().mission_state().await?;
        debug!(status = ?state.status, "mission state");
    }

    info!(status = ?state.status, "mission finished");
    Ok(state.status.is_success())
}

/// Rewind the loaded mission to its start.
pub async fn restart_mission(
    robot: &Robot,
    wallet: &mut LeaseWallet,
    policy: &PlayPolicy,
) -> Result<bool, ReplayError> {
    info!("restarting mission");

    let lease = wallet.advance(BODY_RESOURCE)?;
    let pause_time = deadline(robot, policy.restart_timeout)?;
    let status = robot
        .api()
        .restart_mission(pause_time, std::slice::from_ref(&lease))
        .await?;
    sleep(policy.restart_settle).await;

    debug!(?status, "restart acknowledged");
    Ok(status.is_success())
}

/// `ahead` from now, in robot time.
fn deadline(robot: &Robot, ahead: Duration) -> Result<OffsetDateTime, ReplayError> {
    let local = time::Duration::try_from(ahead)
        .ok()
        .and_then(|ahead| OffsetDateTime::now_utc().checked_add(ahead))
        .ok_or(ReplayError::DeadlineOutOfRange(ahead))?;
    Ok(robot.robot_timestamp(local)?)
}

/// Run the mission, then restart and run it again after every success until
/// `total` has elapsed since the first run began. Stops at the first failure.
pub async fn repeat_mission(
    robot: &Robot,
    wallet: &mut LeaseWallet,
    total: Duration,
    policy: &PlayPolicy,
) -> Result<bool, ReplayError> {
    info!(total_secs = total.as_secs_f64(), "repeating mission");

    let started = Instant::now();
    let mut success = run_mission(robot, wallet, policy).await?;
    let mut elapsed = started.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        total_secs = total.as_secs_f64(),
        "elapsed time"
    );

    if !success {
        info!("mission failed");
        return Ok(false);
    }

    while elapsed < total {
        restart_mission(robot, wallet, policy).await?;
        success = run_mission(robot, wallet, policy).await?;

        elapsed = started.elapsed();
        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            total_secs = total.as_secs_f64(),
            "elapsed time"
        );

        if !success {
            info!("mission failed");
            break;
        }
    }

    Ok(success)
}
