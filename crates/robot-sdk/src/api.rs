use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::RobotError;
use crate::lease::Lease;
use crate::model::{
    EdgeSnapshot, EstopLevel, Graph, MissionState, MissionStatus, Node, PowerRequest,
    PowerState, RobotCommand, WaypointSnapshot,
};
use crate::robot::Credentials;
use crate::time_sync::{TimeSyncRequest, TimeSyncResponse};

/// Remote services consumed by a mission replay.
///
/// Every call is a single request/response. Calls that change robot state take
/// the lease revision they act under; timestamps are in robot time.
#[async_trait]
pub trait RobotApi: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), RobotError>;

    async fn time_sync_round(
        &self,
        request: &TimeSyncRequest,
    ) -> Result<TimeSyncResponse, RobotError>;

    async fn acquire_lease(&self, resource: &str) -> Result<Lease, RobotError>;

    async fn return_lease(&self, lease: &Lease) -> Result<(), RobotError>;

    /// Drop the robot's current map and localization.
    async fn clear_graph(&self, lease: &Lease) -> Result<(), RobotError>;

    async fn upload_graph(&self, graph: &Graph, lease: &Lease) -> Result<(), RobotError>;

    async fn upload_waypoint_snapshot(
        &self,
        snapshot: &WaypointSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError>;

    async fn upload_edge_snapshot(
        &self,
        snapshot: &EdgeSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError>;

    async fn load_mission(&self, root: &Node, leases: &[Lease]) -> Result<(), RobotError>;

    async fn mission_state(&self) -> Result<MissionState, RobotError>;

    /// Let the mission run until `pause_time` unless another play arrives first.
    async fn play_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<(), RobotError>;

    async fn restart_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<MissionStatus, RobotError>;

    async fn estop_status(&self) -> Result<EstopLevel, RobotError>;

    async fn power_state(&self) -> Result<PowerState, RobotError>;

    async fn power_command(&self, request: PowerRequest, lease: &Lease) -> Result<(), RobotError>;

    async fn robot_command(&self, command: RobotCommand, lease: &Lease) -> Result<(), RobotError>;
}
