use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::api::RobotApi;
use crate::error::RobotError;
use crate::lease::Lease;
use crate::model::{PowerRequest, PowerState};
use crate::time_sync::{TimeSync, TimeSyncRequest};

const POWER_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Contents of the application token file, if one was loaded.
    pub app_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("app_token", &self.app_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Session with one robot: the service handle plus the clock estimate used to
/// stamp requests.
pub struct Robot {
    hostname: String,
    api: Arc<dyn RobotApi>,
    time_sync: TimeSync,
}

impl Robot {
    pub fn new(hostname: impl Into<String>, api: Arc<dyn RobotApi>) -> Self {
        Self {
            hostname: hostname.into(),
            api,
            time_sync: TimeSync::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn api(&self) -> &dyn RobotApi {
        self.api.as_ref()
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<(), RobotError> {
        self.api.authenticate(credentials).await?;
        info!(hostname = %self.hostname, user = %credentials.username, "authenticated with robot");
        Ok(())
    }

    /// Exchange time-sync samples until the robot reports a converged estimate.
    /// Returns the estimated clock skew.
    pub async fn wait_for_sync(
        &mut self,
        max_rounds: u32,
        interval: Duration,
    ) -> Result<time::Duration, RobotError> {
        for round in 1..=max_rounds {
            let request = TimeSyncRequest {
                client_tx: OffsetDateTime::now_utc(),
            };
            let response = self.api.time_sync_round(&request).await?;
            self.time_sync
                .record(&request, &response, OffsetDateTime::now_utc());
            if let Some(skew) = self.time_sync.clock_skew() {
                info!(rounds = round, %skew, "time sync established");
                return Ok(skew);
            }
            debug!(round, "time sync needs more samples");
            sleep(interval).await;
        }
        Err(RobotError::TimeSyncFailed { rounds: max_rounds })
    }

    pub fn time_sync(&self) -> &TimeSync {
        &self.time_sync
    }

    pub fn robot_timestamp(&self, local: OffsetDateTime) -> Result<OffsetDateTime, RobotError> {
        self.time_sync.robot_timestamp(local)
    }

    pub async fn is_powered_on(&self) -> Result<bool, RobotError> {
        Ok(self.api.power_state().await?.is_on())
    }

    /// Request motor power and wait for it to come up.
    pub async fn power_on(&self, lease: &Lease, timeout: Duration) -> Result<(), RobotError> {
        self.api.power_command(PowerRequest::On, lease).await?;
        self.wait_for_power(PowerState::On, timeout).await
    }

    /// Request motor power off and wait for it to drop. A graceful request
    /// (`cut_immediately = false`) lets the robot sit down first.
    pub async fn power_off(
        &self,
        cut_immediately: bool,
        lease: &Lease,
        timeout: Duration,
    ) -> Result<(), RobotError> {
        self.api
            .power_command(PowerRequest::Off { cut_immediately }, lease)
            .await?;
        self.wait_for_power(PowerState::Off, timeout).await
    }

    async fn wait_for_power(&self, target: PowerState, timeout: Duration) -> Result<(), RobotError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.api.power_state().await?;
            if state == target {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RobotError::PowerTimeout {
                    target: match target {
                        PowerState::On => "on",
                        _ => "off",
                    },
                    timeout_secs: timeout.as_secs(),
                });
            }
            debug!(?state, ?target, "waiting for power transition");
            sleep(POWER_POLL_INTERVAL).await;
        }
    }
}
