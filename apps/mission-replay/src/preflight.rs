use std::time::Duration;

use robot_sdk::{LeaseWallet, Robot, RobotCommand, RobotError, BODY_RESOURCE};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::ReplayError;

pub async fn verify_estop(robot: &Robot) -> Result<(), ReplayError> {
    let level = robot.api().estop_status().await?;
    if level.is_stopped() {
        let err = ReplayError::Estopped;
        error!(?level, "{err}");
        return Err(err);
    }
    Ok(())
}

/// Returns whether the motors are on afterwards. No power request is sent when
/// they already are.
pub async fn ensure_power_on(
    robot: &Robot,
    wallet: &mut LeaseWallet,
    timeout: Duration,
) -> Result<bool, ReplayError> {
    if robot.is_powered_on().await? {
        return Ok(true);
    }

    info!("powering on robot");
    let lease = wallet.advance(BODY_RESOURCE)?;
    match robot.power_on(&lease, timeout).await {
        Ok(()) | Err(RobotError::PowerTimeout { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    if robot.is_powered_on().await? {
        info!("robot powered on");
        Ok(true)
    } else {
        error!("error powering on robot");
        Ok(false)
    }
}

/// Command a stand and wait for the robot to settle. The wait is fixed; the
/// stand is not confirmed.
pub async fn stand(
    robot: &Robot,
    wallet: &mut LeaseWallet,
    settle: Duration,
) -> Result<(), ReplayError> {
    info!("commanding robot to stand");
    let lease = wallet.advance(BODY_RESOURCE)?;
    robot.api().robot_command(RobotCommand::Stand, &lease).await?;
    countdown(settle).await;
    info!("robot standing");
    Ok(())
}

/// Graceful power off used on the way out. Never fails: every problem is
/// logged and reported as `false` so the lease can still be returned.
pub async fn ensure_power_off(robot: &Robot, wallet: &mut LeaseWallet, timeout: Duration) -> bool {
    match robot.is_powered_on().await {
        Ok(true) => match wallet.advance(BODY_RESOURCE) {
            Ok(lease) => {
                if let Err(err) = robot.power_off(false, &lease, timeout).await {
                    warn!(error = %err, "power off request did not complete");
                }
            }
            Err(err) => warn!(error = %err, "cannot power off without a lease"),
        },
        Ok(false) => {}
        Err(err) => {
            error!(error = %err, "failed to read power state");
            return false;
        }
    }

    match robot.is_powered_on().await {
        Ok(false) => {
            info!("robot safely powered off");
            true
        }
        Ok(true) => {
            error!("error powering off robot");
            false
        }
        Err(err) => {
            error!(error = %err, "failed to read power state");
            false
        }
    }
}

async fn countdown(settle: Duration) {
    let whole = settle.as_secs();
    for remaining in (1..=whole).rev() {
        info!(remaining, "settling");
        sleep(Duration::from_secs(1)).await;
    }
    let rest = settle - Duration::from_secs(whole);
    if !rest.is_zero() {
        sleep(rest).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_sdk::sim::{RobotCall, SimulatedRobot};
    use robot_sdk::{EstopLevel, PowerRequest, PowerState, RobotApi};
    use tokio::time::Instant;

    async fn setup(sim: std::sync::Arc<SimulatedRobot>) -> (Robot, LeaseWallet) {
        let lease = sim.acquire_lease(BODY_RESOURCE).await.unwrap();
        let mut wallet = LeaseWallet::new();
        wallet.add(lease);
        (Robot::new("sim", sim), wallet)
    }

    #[tokio::test]
    async fn estop_blocks_replay() {
        let sim = SimulatedRobot::builder().estop(EstopLevel::Cut).build();
        let (robot, _) = setup(sim).await;
        assert!(matches!(
            verify_estop(&robot).await,
            Err(ReplayError::Estopped)
        ));
    }

    #[tokio::test]
    async fn already_powered_robot_gets_no_power_request() {
        let sim = SimulatedRobot::builder().powered_on().build();
        let (robot, mut wallet) = setup(sim.clone()).await;
        assert!(ensure_power_on(&robot, &mut wallet, Duration::from_secs(20))
            .await
            .unwrap());
        assert_eq!(
            sim.count_calls(|c| matches!(c, RobotCall::PowerCommand(_)))
                .await,
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_failure_is_reported_after_timeout() {
        let sim = SimulatedRobot::builder().power_on_fails().build();
        let (robot, mut wallet) = setup(sim).await;
        let started = Instant::now();
        assert!(!ensure_power_on(&robot, &mut wallet, Duration::from_secs(20))
            .await
            .unwrap());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn stand_waits_for_settle() {
        let sim = SimulatedRobot::builder().powered_on().build();
        let (robot, mut wallet) = setup(sim.clone()).await;
        let started = Instant::now();
        stand(&robot, &mut wallet, Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(
            sim.count_calls(|c| *c == RobotCall::RobotCommand(RobotCommand::Stand))
                .await,
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_is_graceful() {
        let sim = SimulatedRobot::builder().powered_on().build();
        let (robot, mut wallet) = setup(sim.clone()).await;
        assert!(ensure_power_off(&robot, &mut wallet, Duration::from_secs(20)).await);
        assert_eq!(sim.power().await, PowerState::Off);
        assert_eq!(
            sim.count_calls(|c| {
                *c == RobotCall::PowerCommand(PowerRequest::Off {
                    cut_immediately: false,
                })
            })
            .await,
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_power_off_reports_false() {
        let sim = SimulatedRobot::builder().powered_on().power_off_fails().build();
        let (robot, mut wallet) = setup(sim).await;
        assert!(!ensure_power_off(&robot, &mut wallet, Duration::from_secs(20)).await);
    }
}
