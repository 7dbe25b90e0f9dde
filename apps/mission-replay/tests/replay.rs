//! End-to-end replays against the in-memory robot. Time is paused, so the
//! stand settle, power waits and poll sleeps cost nothing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mission_replay::{
    ExecutionMode, MissionOutcome, MissionRunner, ReplayError, RunConfig, Timings,
};
use robot_sdk::sim::{RobotCall, SimulatedRobot};
use robot_sdk::{
    Credentials, EdgeSnapshot, EstopLevel, Graph, Lease, MissionState, MissionStatus, Node,
    PowerRequest, PowerState, RobotApi, RobotCommand, RobotError, TimeSyncRequest,
    TimeSyncResponse, WaypointSnapshot,
};
use serde_json::json;
use tempfile::TempDir;
use time::OffsetDateTime;

fn credentials() -> Credentials {
    Credentials {
        username: "operator".into(),
        password: "password".into(),
        app_token: None,
    }
}

fn write_mission(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        path,
        json!({
            "name": "autowalk",
            "impl": {"type": "sequence"},
            "children": [
                {"name": "goto w1", "impl": {"type": "navigate_to", "waypoint": "w1"}},
                {"name": "goto w2", "impl": {"type": "navigate_to", "waypoint": "w2"}}
            ]
        })
        .to_string(),
    )
    .unwrap();
}

/// Map with two waypoint snapshots, one edge snapshot and the default mission.
fn write_map(dir: &Path) {
    fs::write(
        dir.join("graph"),
        json!({
            "waypoints": [
                {"id": "w1", "snapshot_id": "snap-w1"},
                {"id": "w2", "snapshot_id": "snap-w2"}
            ],
            "edges": [
                {"id": {"from_waypoint": "w1", "to_waypoint": "w2"}, "snapshot_id": "snap-e1"}
            ]
        })
        .to_string(),
    )
    .unwrap();
    fs::create_dir_all(dir.join("waypoint_snapshots")).unwrap();
    fs::create_dir_all(dir.join("edge_snapshots")).unwrap();
    fs::write(dir.join("waypoint_snapshots/snap-w1"), b"cloud-1").unwrap();
    fs::write(dir.join("waypoint_snapshots/snap-w2"), b"cloud-2").unwrap();
    fs::write(dir.join("edge_snapshots/snap-e1"), b"edge-1").unwrap();
    write_mission(&dir.join("missions/autogenerated"));
}

fn map_config(dir: &Path, mode: ExecutionMode) -> RunConfig {
    RunConfig {
        hostname: "sim".into(),
        map_directory: Some(dir.to_path_buf()),
        mission_file: dir.join("missions/autogenerated"),
        mission_timeout: Duration::from_secs(3),
        mode,
        fail_on_question: true,
    }
}

fn mission_only_config(mission_file: PathBuf, mode: ExecutionMode) -> RunConfig {
    RunConfig {
        hostname: "sim".into(),
        map_directory: None,
        mission_file,
        mission_timeout: Duration::from_secs(3),
        mode,
        fail_on_question: false,
    }
}

async fn runner(sim: &Arc<SimulatedRobot>, config: RunConfig) -> MissionRunner {
    MissionRunner::connect(sim.clone(), config, &credentials(), Timings::default())
        .await
        .unwrap()
}

async fn returned_leases(sim: &SimulatedRobot) -> usize {
    sim.count_calls(|c| matches!(c, RobotCall::ReturnLease(_)))
        .await
}

fn map_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_map(dir.path());
    dir
}

#[tokio::test(start_paused = true)]
async fn replays_map_and_mission_in_order() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().plays_to_finish(3).build();
    let report = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, MissionOutcome::Succeeded);
    assert!(!sim.lease_held().await);

    let uploads: Vec<RobotCall> = sim
        .calls()
        .await
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                RobotCall::ClearGraph
                    | RobotCall::UploadGraph { .. }
                    | RobotCall::UploadWaypointSnapshot(_)
                    | RobotCall::UploadEdgeSnapshot(_)
                    | RobotCall::LoadMission { .. }
            )
        })
        .collect();
    assert_eq!(
        uploads,
        vec![
            RobotCall::ClearGraph,
            RobotCall::UploadGraph {
                waypoints: 2,
                edges: 1
            },
            RobotCall::UploadWaypointSnapshot("snap-w1".into()),
            RobotCall::UploadWaypointSnapshot("snap-w2".into()),
            RobotCall::UploadEdgeSnapshot("snap-e1".into()),
            RobotCall::LoadMission {
                root: "autowalk".into(),
                nodes: 3
            },
        ]
    );

    let calls = sim.calls().await;
    let last_play = calls
        .iter()
        .rposition(|c| matches!(c, RobotCall::PlayMission { .. }))
        .unwrap();
    let power_off = calls
        .iter()
        .position(|c| matches!(c, RobotCall::PowerCommand(PowerRequest::Off { .. })))
        .unwrap();
    let returned = calls
        .iter()
        .position(|c| matches!(c, RobotCall::ReturnLease(_)))
        .unwrap();
    assert!(last_play < power_off && power_off < returned);
    assert_eq!(returned, calls.len() - 1);
}

#[tokio::test(start_paused = true)]
async fn without_map_nothing_is_uploaded_and_questions_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mission = dir.path().join("mission");
    write_mission(&mission);
    let sim = SimulatedRobot::builder()
        .plays_to_finish(3)
        .question_after_plays(0)
        .build();

    let report = runner(&sim, mission_only_config(mission, ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, MissionOutcome::Succeeded);
    let graph_calls = sim
        .count_calls(|c| {
            matches!(
                c,
                RobotCall::ClearGraph
                    | RobotCall::UploadGraph { .. }
                    | RobotCall::UploadWaypointSnapshot(_)
                    | RobotCall::UploadEdgeSnapshot(_)
            )
        })
        .await;
    assert_eq!(graph_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn question_with_map_fails_mission_but_releases() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().question_after_plays(0).build();

    let report = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, MissionOutcome::Failed);
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::PlayMission { .. }))
            .await,
        0
    );
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_mission_file_releases_held_lease() {
    let dir = tempfile::tempdir().unwrap();
    let sim = SimulatedRobot::builder().build();

    let err = runner(
        &sim,
        mission_only_config(dir.path().join("absent"), ExecutionMode::Once),
    )
    .await
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, ReplayError::MissingMissionFile(_)));
    let calls = sim.calls().await;
    let acquired = calls
        .iter()
        .position(|c| matches!(c, RobotCall::AcquireLease { .. }))
        .unwrap();
    let returned = calls
        .iter()
        .position(|c| matches!(c, RobotCall::ReturnLease(_)))
        .unwrap();
    assert!(acquired < returned);
    assert_eq!(returned_leases(&sim).await, 1);
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::LoadMission { .. }))
            .await,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn missing_snapshot_aborts_before_graph_upload() {
    let dir = map_dir();
    fs::remove_file(dir.path().join("edge_snapshots/snap-e1")).unwrap();
    let sim = SimulatedRobot::builder().build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    match err {
        ReplayError::MissingInput { path } => assert!(path.ends_with("edge_snapshots/snap-e1")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::UploadGraph { .. }))
            .await,
        0
    );
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_map_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mission = dir.path().join("mission");
    write_mission(&mission);
    let config = RunConfig {
        map_directory: Some(dir.path().join("no-such-map")),
        ..mission_only_config(mission, ExecutionMode::Once)
    };
    let sim = SimulatedRobot::builder().build();

    let err = runner(&sim, config).await.run().await.unwrap_err();
    assert!(matches!(err, ReplayError::MissingMapDirectory(_)));
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn lease_denied_touches_nothing() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().lease_claimed_elsewhere().build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReplayError::LeaseNotAcquired(RobotError::LeaseUnavailable(_))
    ));
    assert_eq!(returned_leases(&sim).await, 0);
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::PowerCommand(_) | RobotCall::ClearGraph))
            .await,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn estop_aborts_before_power_on() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder()
        .estop(EstopLevel::SettleThenCut)
        .build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Estopped));
    assert!(err.to_string().contains("external E-Stop client"));
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::PowerCommand(PowerRequest::On)))
            .await,
        0
    );
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn power_on_failure_is_fatal_and_still_releases() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().power_on_fails().build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::PowerOnFailed));
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::RobotCommand(_)))
            .await,
        0
    );
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn stuck_power_off_still_returns_lease() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().power_off_fails().build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::PowerOffFailed));
    let calls = sim.calls().await;
    assert!(matches!(calls.last(), Some(RobotCall::ReturnLease(_))));
    assert_eq!(returned_leases(&sim).await, 1);
    assert!(!sim.lease_held().await);
}

#[tokio::test(start_paused = true)]
async fn powered_robot_is_not_powered_on_again() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().powered_on().build();

    runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::PowerCommand(PowerRequest::On)))
            .await,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn static_mode_stands_without_playing() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().build();

    let report = runner(&sim, map_config(dir.path(), ExecutionMode::Static))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(report.outcome, MissionOutcome::Skipped);
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::PlayMission { .. }))
            .await,
        0
    );
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::RobotCommand(_)))
            .await,
        1
    );
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn repeat_runs_three_times_in_ten_seconds() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().plays_to_finish(4).build();

    let report = runner(
        &sim,
        map_config(dir.path(), ExecutionMode::RepeatFor(Duration::from_secs(10))),
    )
    .await
    .run()
    .await
    .unwrap();

    assert_eq!(report.outcome, MissionOutcome::Succeeded);
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::RestartMission { .. }))
            .await,
        2
    );
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn repeat_stops_on_failed_iteration() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder()
        .plays_to_finish(2)
        .outcomes([MissionStatus::Success, MissionStatus::Error])
        .build();

    let report = runner(
        &sim,
        map_config(dir.path(), ExecutionMode::RepeatFor(Duration::from_secs(600))),
    )
    .await
    .run()
    .await
    .unwrap();

    assert_eq!(report.outcome, MissionOutcome::Failed);
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::RestartMission { .. }))
            .await,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_fail_before_lease() {
    let sim = SimulatedRobot::builder().reject_credentials().build();
    let config = mission_only_config(PathBuf::from("unused"), ExecutionMode::Once);

    let err = MissionRunner::connect(sim.clone(), config, &credentials(), Timings::default())
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        ReplayError::Robot(RobotError::Unauthenticated)
    ));
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::AcquireLease { .. }))
            .await,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn out_of_range_deadline_still_releases() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().build();
    let config = RunConfig {
        mission_timeout: Duration::from_secs(1_000_000_000_000),
        ..map_config(dir.path(), ExecutionMode::Once)
    };

    let err = runner(&sim, config).await.run().await.unwrap_err();

    assert!(matches!(err, ReplayError::DeadlineOutOfRange(_)));
    assert_eq!(sim.power().await, PowerState::Off);
    assert_eq!(returned_leases(&sim).await, 1);
    assert!(!sim.lease_held().await);
}

#[tokio::test(start_paused = true)]
async fn play_fault_mid_run_still_releases() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder()
        .plays_to_finish(4)
        .play_fails_at(2)
        .build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Robot(RobotError::Rejected(_))));
    assert_eq!(
        sim.count_calls(|c| matches!(c, RobotCall::PlayMission { .. }))
            .await,
        2
    );
    assert_eq!(sim.power().await, PowerState::Off);
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_lease_return_fails_a_successful_run() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().return_lease_fails().build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Robot(RobotError::Rejected(_))));
    assert_eq!(sim.power().await, PowerState::Off);
    assert_eq!(returned_leases(&sim).await, 1);
}

#[tokio::test(start_paused = true)]
async fn earlier_fatal_error_wins_over_failed_lease_return() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder()
        .estop(EstopLevel::Cut)
        .return_lease_fails()
        .build();

    let err = runner(&sim, map_config(dir.path(), ExecutionMode::Once))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ReplayError::Estopped));
    assert_eq!(returned_leases(&sim).await, 1);
}

/// Delegates to the simulator but panics on the first play request.
struct PanicOnPlay(Arc<SimulatedRobot>);

#[async_trait]
impl RobotApi for PanicOnPlay {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), RobotError> {
        self.0.authenticate(credentials).await
    }

    async fn time_sync_round(
        &self,
        request: &TimeSyncRequest,
    ) -> Result<TimeSyncResponse, RobotError> {
        self.0.time_sync_round(request).await
    }

    async fn acquire_lease(&self, resource: &str) -> Result<Lease, RobotError> {
        self.0.acquire_lease(resource).await
    }

    async fn return_lease(&self, lease: &Lease) -> Result<(), RobotError> {
        self.0.return_lease(lease).await
    }

    async fn clear_graph(&self, lease: &Lease) -> Result<(), RobotError> {
        self.0.clear_graph(lease).await
    }

    async fn upload_graph(&self, graph: &Graph, lease: &Lease) -> Result<(), RobotError> {
        self.0.upload_graph(graph, lease).await
    }

    async fn upload_waypoint_snapshot(
        &self,
        snapshot: &WaypointSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError> {
        self.0.upload_waypoint_snapshot(snapshot, lease).await
    }

    async fn upload_edge_snapshot(
        &self,
        snapshot: &EdgeSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError> {
        self.0.upload_edge_snapshot(snapshot, lease).await
    }

    async fn load_mission(&self, root: &Node, leases: &[Lease]) -> Result<(), RobotError> {
        self.0.load_mission(root, leases).await
    }

    async fn mission_state(&self) -> Result<MissionState, RobotError> {
        self.0.mission_state().await
    }

    async fn play_mission(
        &self,
        _pause_time: OffsetDateTime,
        _leases: &[Lease],
    ) -> Result<(), RobotError> {
        panic!("play handler crashed");
    }

    async fn restart_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<MissionStatus, RobotError> {
        self.0.restart_mission(pause_time, leases).await
    }

    async fn estop_status(&self) -> Result<EstopLevel, RobotError> {
        self.0.estop_status().await
    }

    async fn power_state(&self) -> Result<PowerState, RobotError> {
        self.0.power_state().await
    }

    async fn power_command(&self, request: PowerRequest, lease: &Lease) -> Result<(), RobotError> {
        self.0.power_command(request, lease).await
    }

    async fn robot_command(&self, command: RobotCommand, lease: &Lease) -> Result<(), RobotError> {
        self.0.robot_command(command, lease).await
    }
}

#[tokio::test(start_paused = true)]
async fn panic_during_execute_still_releases() {
    let dir = map_dir();
    let sim = SimulatedRobot::builder().build();
    let runner = MissionRunner::connect(
        Arc::new(PanicOnPlay(sim.clone())),
        map_config(dir.path(), ExecutionMode::Once),
        &credentials(),
        Timings::default(),
    )
    .await
    .unwrap();

    let joined = tokio::spawn(async move { runner.run().await }).await;

    assert!(joined.unwrap_err().is_panic());
    assert_eq!(sim.power().await, PowerState::Off);
    assert_eq!(returned_leases(&sim).await, 1);
    assert!(!sim.lease_held().await);
}
