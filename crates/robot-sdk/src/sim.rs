//! In-memory robot for tests and dry runs.
//!
//! [`SimulatedRobot`] answers every [`RobotApi`] call from local state, keeps
//! the same lease rules a real robot enforces, and records each call so tests
//! can assert on the exact sequence a caller produced.

use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::RobotApi;
use crate::error::RobotError;
use crate::lease::{Lease, LeaseOrdering};
use crate::model::{
    EdgeSnapshot, EstopLevel, Graph, MissionState, MissionStatus, Node, PowerRequest,
    PowerState, Question, RobotCommand, WaypointSnapshot,
};
use crate::robot::Credentials;
use crate::time_sync::{TimeSyncRequest, TimeSyncResponse, TimeSyncStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum RobotCall {
    Authenticate { username: String },
    TimeSync,
    AcquireLease { resource: String },
    ReturnLease(Lease),
    ClearGraph,
    UploadGraph { waypoints: usize, edges: usize },
    UploadWaypointSnapshot(String),
    UploadEdgeSnapshot(String),
    LoadMission { root: String, nodes: usize },
    MissionState,
    PlayMission { pause_time: OffsetDateTime, lease: Lease },
    RestartMission { pause_time: OffsetDateTime, lease: Lease },
    EstopStatus,
    PowerState,
    PowerCommand(PowerRequest),
    RobotCommand(RobotCommand),
}

#[derive(Debug, Clone)]
struct SimConfig {
    clock_skew: Duration,
    sync_rounds_needed: u32,
    reject_credentials: bool,
    lease_claimed_elsewhere: bool,
    estop: EstopLevel,
    initial_power: PowerState,
    power_on_works: bool,
    power_off_works: bool,
    plays_to_finish: u32,
    outcomes: Vec<MissionStatus>,
    question_after_plays: Option<u32>,
    failing_play: Option<usize>,
    return_lease_works: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clock_skew: Duration::milliseconds(250),
            sync_rounds_needed: 1,
            reject_credentials: false,
            lease_claimed_elsewhere: false,
            estop: EstopLevel::None,
            initial_power: PowerState::Off,
            power_on_works: true,
            power_off_works: true,
            plays_to_finish: 3,
            outcomes: vec![MissionStatus::Success],
            question_after_plays: None,
            failing_play: None,
            return_lease_works: true,
        }
    }
}

#[derive(Debug)]
enum LeaseSlot {
    Free,
    Held(Lease),
}

#[derive(Debug)]
struct SimState {
    calls: Vec<RobotCall>,
    sync_rounds: u32,
    lease: LeaseSlot,
    power: PowerState,
    mission_loaded: bool,
    run_index: usize,
    plays_this_run: u32,
}

pub struct SimulatedRobot {
    config: SimConfig,
    epoch: String,
    state: Mutex<SimState>,
}

#[derive(Debug, Default)]
pub struct SimulatedRobotBuilder {
    config: SimConfig,
}

impl SimulatedRobotBuilder {
    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.config.clock_skew = skew;
        self
    }

    /// Number of time-sync exchanges before the robot reports a converged estimate.
    pub fn sync_rounds_needed(mut self, rounds: u32) -> Self {
        self.config.sync_rounds_needed = rounds.max(1);
        self
    }

    pub fn reject_credentials(mut self) -> Self {
        self.config.reject_credentials = true;
        self
    }

    /// Another client already owns the body lease.
    pub fn lease_claimed_elsewhere(mut self) -> Self {
        self.config.lease_claimed_elsewhere = true;
        self
    }

    pub fn estop(mut self, level: EstopLevel) -> Self {
        self.config.estop = level;
        self
    }

    pub fn powered_on(mut self) -> Self {
        self.config.initial_power = PowerState::On;
        self
    }

    pub fn power_on_fails(mut self) -> Self {
        self.config.power_on_works = false;
        self
    }

    pub fn power_off_fails(mut self) -> Self {
        self.config.power_off_works = false;
        self
    }

    /// Play calls a single run needs before it reaches its outcome.
    pub fn plays_to_finish(mut self, plays: u32) -> Self {
        self.config.plays_to_finish = plays.max(1);
        self
    }

    /// Terminal status of each run, in order. Runs past the end of the list
    /// repeat the last entry.
    pub fn outcomes(mut self, outcomes: impl IntoIterator<Item = MissionStatus>) -> Self {
        let outcomes: Vec<_> = outcomes.into_iter().collect();
        if !outcomes.is_empty() {
            self.config.outcomes = outcomes;
        }
        self
    }

    /// Raise an operator question once a run has received `plays` play calls.
    pub fn question_after_plays(mut self, plays: u32) -> Self {
        self.config.question_after_plays = Some(plays);
        self
    }

    /// Reject the `nth` play call of the session (1-based) with a transport-level fault.
    pub fn play_fails_at(mut self, nth: usize) -> Self {
        self.config.failing_play = Some(nth.max(1));
        self
    }

    /// The lease service refuses every return; the lease stays claimed.
    pub fn return_lease_fails(mut self) -> Self {
        self.config.return_lease_works = false;
        self
    }

    pub fn build(self) -> Arc<SimulatedRobot> {
        Arc::new(SimulatedRobot {
            state: Mutex::new(SimState {
                calls: Vec::new(),
                sync_rounds: 0,
                lease: LeaseSlot::Free,
                power: self.config.initial_power,
                mission_loaded: false,
                run_index: 0,
                plays_this_run: 0,
            }),
            epoch: Uuid::new_v4().to_string(),
            config: self.config,
        })
    }
}

impl SimulatedRobot {
    pub fn builder() -> SimulatedRobotBuilder {
        SimulatedRobotBuilder::default()
    }

    pub async fn calls(&self) -> Vec<RobotCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count_calls(&self, matches: impl Fn(&RobotCall) -> bool) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| matches(call))
            .count()
    }

    pub async fn power(&self) -> PowerState {
        self.state.lock().await.power
    }

    pub async fn lease_held(&self) -> bool {
        matches!(self.state.lock().await.lease, LeaseSlot::Held(_))
    }

    fn status_of(&self, state: &SimState) -> MissionStatus {
        if !state.mission_loaded || state.plays_this_run == 0 {
            MissionStatus::None
        } else if state.plays_this_run < self.config.plays_to_finish {
            MissionStatus::Running
        } else {
            self.config
                .outcomes
                .get(state.run_index)
                .or_else(|| self.config.outcomes.last())
                .copied()
                .unwrap_or(MissionStatus::Success)
        }
    }
}

impl SimState {
    /// Accept `lease` if it is the newest revision seen so far and remember it.
    fn check_lease(&mut self, lease: &Lease) -> Result<(), RobotError> {
        let LeaseSlot::Held(latest) = &mut self.lease else {
            return Err(RobotError::LeaseNotHeld(lease.resource.clone()));
        };
        match lease.compare(latest) {
            LeaseOrdering::Same => Ok(()),
            LeaseOrdering::Newer => {
                *latest = lease.clone();
                Ok(())
            }
            LeaseOrdering::Older => Err(RobotError::LeaseStale {
                resource: lease.resource.clone(),
            }),
            LeaseOrdering::DifferentEpoch | LeaseOrdering::DifferentResource => {
                Err(RobotError::LeaseNotHeld(lease.resource.clone()))
            }
        }
    }

    fn check_leases(&mut self, leases: &[Lease]) -> Result<(), RobotError> {
        if leases.is_empty() {
            return Err(RobotError::Rejected("no lease presented".into()));
        }
        leases.iter().try_for_each(|lease| self.check_lease(lease))
    }
}

#[async_trait]
impl RobotApi for SimulatedRobot {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::Authenticate {
            username: credentials.username.clone(),
        });
        if self.config.reject_credentials {
            return Err(RobotError::Unauthenticated);
        }
        Ok(())
    }

    async fn time_sync_round(
        &self,
        request: &TimeSyncRequest,
    ) -> Result<TimeSyncResponse, RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::TimeSync);
        state.sync_rounds += 1;
        let robot_now = request.client_tx + self.config.clock_skew;
        let status = if state.sync_rounds >= self.config.sync_rounds_needed {
            TimeSyncStatus::Ok
        } else {
            TimeSyncStatus::MoreSamplesNeeded
        };
        Ok(TimeSyncResponse {
            robot_rx: robot_now,
            robot_tx: robot_now,
            status,
        })
    }

    async fn acquire_lease(&self, resource: &str) -> Result<Lease, RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::AcquireLease {
            resource: resource.to_string(),
        });
        if self.config.lease_claimed_elsewhere || matches!(state.lease, LeaseSlot::Held(_)) {
            return Err(RobotError::LeaseUnavailable(resource.to_string()));
        }
        let mut lease = Lease::new(resource, self.epoch.clone());
        lease.client_names.push("mission-replay".into());
        state.lease = LeaseSlot::Held(lease.clone());
        Ok(lease)
    }

    async fn return_lease(&self, lease: &Lease) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::ReturnLease(lease.clone()));
        if !self.config.return_lease_works {
            return Err(RobotError::Rejected("lease service unavailable".into()));
        }
        match &state.lease {
            LeaseSlot::Held(held)
                if held.resource == lease.resource && held.epoch == lease.epoch =>
            {
                state.lease = LeaseSlot::Free;
                Ok(())
            }
            _ => Err(RobotError::LeaseNotHeld(lease.resource.clone())),
        }
    }

    async fn clear_graph(&self, lease: &Lease) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::ClearGraph);
        state.check_lease(lease)
    }

    async fn upload_graph(&self, graph: &Graph, lease: &Lease) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::UploadGraph {
            waypoints: graph.waypoints.len(),
            edges: graph.edges.len(),
        });
        state.check_lease(lease)
    }

    async fn upload_waypoint_snapshot(
        &self,
        snapshot: &WaypointSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RobotCall::UploadWaypointSnapshot(snapshot.id.clone()));
        state.check_lease(lease)
    }

    async fn upload_edge_snapshot(
        &self,
        snapshot: &EdgeSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(RobotCall::UploadEdgeSnapshot(snapshot.id.clone()));
        state.check_lease(lease)
    }

    async fn load_mission(&self, root: &Node, leases: &[Lease]) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::LoadMission {
            root: root.name.clone(),
            nodes: root.node_count(),
        });
        state.check_leases(leases)?;
        state.mission_loaded = true;
        state.run_index = 0;
        state.plays_this_run = 0;
        Ok(())
    }

    async fn mission_state(&self) -> Result<MissionState, RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::MissionState);
        let status = self.status_of(&state);
        let asking = status.is_active()
            && self
                .config
                .question_after_plays
                .is_some_and(|plays| state.plays_this_run >= plays);
        let questions = if asking {
            vec![Question {
                id: 1,
                source: "localization".into(),
                text: "Robot is lost. What should it do?".into(),
                options: vec!["Try again".into(), "Skip".into()],
            }]
        } else {
            Vec::new()
        };
        Ok(MissionState { status, questions })
    }

    async fn play_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::PlayMission {
            pause_time,
            lease: leases.first().cloned().unwrap_or_else(|| Lease::new("", "")),
        });
        let plays = state
            .calls
            .iter()
            .filter(|call| matches!(call, RobotCall::PlayMission { .. }))
            .count();
        if self.config.failing_play == Some(plays) {
            return Err(RobotError::Rejected("mission service unavailable".into()));
        }
        state.check_leases(leases)?;
        if !state.mission_loaded {
            return Err(RobotError::Rejected("no mission loaded".into()));
        }
        if self.status_of(&state).is_active() {
            state.plays_this_run += 1;
        }
        Ok(())
    }

    async fn restart_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<MissionStatus, RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::RestartMission {
            pause_time,
            lease: leases.first().cloned().unwrap_or_else(|| Lease::new("", "")),
        });
        state.check_leases(leases)?;
        if !state.mission_loaded {
            return Err(RobotError::Rejected("no mission loaded".into()));
        }
        state.run_index += 1;
        state.plays_this_run = 0;
        Ok(self.status_of(&state))
    }

    async fn estop_status(&self) -> Result<EstopLevel, RobotError> {
        self.state.lock().await.calls.push(RobotCall::EstopStatus);
        Ok(self.config.estop)
    }

    async fn power_state(&self) -> Result<PowerState, RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::PowerState);
        Ok(state.power)
    }

    async fn power_command(&self, request: PowerRequest, lease: &Lease) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::PowerCommand(request));
        state.check_lease(lease)?;
        match request {
            PowerRequest::On if self.config.estop.is_stopped() => {
                return Err(RobotError::Rejected("robot is estopped".into()));
            }
            PowerRequest::On if self.config.power_on_works => state.power = PowerState::On,
            PowerRequest::Off { .. } if self.config.power_off_works => {
                state.power = PowerState::Off
            }
            _ => {}
        }
        Ok(())
    }

    async fn robot_command(&self, command: RobotCommand, lease: &Lease) -> Result<(), RobotError> {
        let mut state = self.state.lock().await;
        state.calls.push(RobotCall::RobotCommand(command));
        state.check_lease(lease)?;
        if !state.power.is_on() {
            return Err(RobotError::Rejected("motors are not powered".into()));
        }
        Ok(())
    }
}
