use std::fs;
use std::path::Path;

use robot_sdk::{Lease, Node, Robot};
use tracing::info;

use crate::error::ReplayError;

/// Decode the mission behavior tree stored at `path`.
pub fn load_mission(path: &Path) -> Result<Node, ReplayError> {
    info!(path = %path.display(), "loading mission");
    let bytes = fs::read(path).map_err(|err| ReplayError::read_failed(path, err))?;
    let mission: Node = serde_json::from_slice(&bytes).map_err(|source| ReplayError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    info!(root = %mission.name, nodes = mission.node_count(), "loaded mission");
    Ok(mission)
}

pub async fn upload_mission(robot: &Robot, mission: &Node, lease: &Lease) -> Result<(), ReplayError> {
    info!("uploading the mission to the robot");
    robot
        .api()
        .load_mission(mission, std::slice::from_ref(lease))
        .await?;
    info!("uploaded mission to robot");
    Ok(())
}
