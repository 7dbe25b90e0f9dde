//! Typed client for the robot services a mission replay talks to: lease
//! arbitration, time sync, graph-nav map upload, the mission engine, estop
//! status and motor power.
//!
//! [`RobotApi`] is the seam between callers and the wire. [`HttpRobotClient`]
//! speaks to a real robot; [`sim::SimulatedRobot`] is an in-memory adapter for
//! tests and dry runs.

pub mod api;
pub mod error;
pub mod http;
pub mod lease;
pub mod model;
pub mod robot;
pub mod sim;
pub mod time_sync;

pub use api::RobotApi;
pub use error::RobotError;
pub use http::HttpRobotClient;
pub use lease::{Lease, LeaseOrdering, LeaseWallet, BODY_RESOURCE};
pub use model::{
    Edge, EdgeId, EdgeSnapshot, EstopLevel, Graph, MissionState, MissionStatus, Node,
    PowerRequest, PowerState, Question, RobotCommand, Waypoint, WaypointSnapshot,
};
pub use robot::{Credentials, Robot};
pub use time_sync::{TimeSync, TimeSyncRequest, TimeSyncResponse, TimeSyncStatus};
