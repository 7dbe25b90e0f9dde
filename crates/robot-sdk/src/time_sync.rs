use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::RobotError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSyncRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub client_tx: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeSyncStatus {
    Ok,
    MoreSamplesNeeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSyncResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub robot_rx: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub robot_tx: OffsetDateTime,
    pub status: TimeSyncStatus,
}

/// Estimate of the offset between the local clock and the robot clock.
///
/// Each exchange yields a skew sample; the sample with the smallest round
/// trip wins. Timestamps sent to the robot must be converted through
/// [`TimeSync::robot_timestamp`], which refuses until the robot has declared
/// the estimate good.
#[derive(Debug, Clone, Default)]
pub struct TimeSync {
    best: Option<Sample>,
    synced: bool,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    round_trip: Duration,
    skew: Duration,
}

impl TimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one exchange into the estimate. `client_rx` is the local time the
    /// response arrived.
    pub fn record(
        &mut self,
        request: &TimeSyncRequest,
        response: &TimeSyncResponse,
        client_rx: OffsetDateTime,
    ) {
        let t0 = request.client_tx;
        let t3 = client_rx;
        let round_trip = (t3 - t0) - (response.robot_tx - response.robot_rx);
        let skew = ((response.robot_rx - t0) + (response.robot_tx - t3)) / 2;
        let better = self
            .best
            .map(|best| round_trip < best.round_trip)
            .unwrap_or(true);
        if better {
            self.best = Some(Sample { round_trip, skew });
        }
        if response.status == TimeSyncStatus::Ok && self.best.is_some() {
            self.synced = true;
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Robot clock minus local clock.
    pub fn clock_skew(&self) -> Option<Duration> {
        self.best.filter(|_| self.synced).map(|sample| sample.skew)
    }

    pub fn round_trip(&self) -> Option<Duration> {
        self.best.map(|sample| sample.round_trip)
    }

    pub fn robot_timestamp(&self, local: OffsetDateTime) -> Result<OffsetDateTime, RobotError> {
        let skew = self.clock_skew().ok_or(RobotError::NotSynced)?;
        local
            .checked_add(skew)
            .ok_or(RobotError::TimestampOutOfRange(local))
    }
}
