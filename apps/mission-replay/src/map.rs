//! Graph-nav map bundle as recorded on disk:
//!
//! ```text
//! <map>/graph
//! <map>/waypoint_snapshots/<snapshot id>
//! <map>/edge_snapshots/<snapshot id>
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use robot_sdk::{EdgeSnapshot, Graph, Lease, Robot, WaypointSnapshot};
use tracing::{debug, info};

use crate::error::ReplayError;

pub struct GraphBundle {
    pub graph: Graph,
    pub waypoint_snapshots: Vec<WaypointSnapshot>,
    pub edge_snapshots: Vec<EdgeSnapshot>,
}

impl GraphBundle {
    /// Read the graph and every snapshot it references. Nothing is uploaded
    /// until all files have been read.
    pub fn load(dir: &Path) -> Result<Self, ReplayError> {
        let graph_path = dir.join("graph");
        info!(path = %graph_path.display(), "loading graph");
        let bytes = fs::read(&graph_path).map_err(|err| ReplayError::read_failed(&graph_path, err))?;
        let graph: Graph = serde_json::from_slice(&bytes).map_err(|source| ReplayError::Decode {
            path: graph_path.clone(),
            source,
        })?;
        info!(
            waypoints = graph.waypoints.len(),
            edges = graph.edges.len(),
            "loaded graph"
        );

        let waypoint_snapshots = load_snapshots(
            &dir.join("waypoint_snapshots"),
            graph.waypoint_snapshot_ids(),
        )?
        .into_iter()
        .map(|(id, payload)| WaypointSnapshot { id, payload })
        .collect();

        let edge_snapshots = load_snapshots(&dir.join("edge_snapshots"), graph.edge_snapshot_ids())?
            .into_iter()
            .map(|(id, payload)| EdgeSnapshot { id, payload })
            .collect();

        Ok(Self {
            graph,
            waypoint_snapshots,
            edge_snapshots,
        })
    }

    /// Upload the graph, then waypoint snapshots, then edge snapshots.
    pub async fn upload(&self, robot: &Robot, lease: &Lease) -> Result<(), ReplayError> {
        info!("uploading the graph and snapshots to the robot");
        robot.api().upload_graph(&self.graph, lease).await?;
        info!("uploaded graph");

        for snapshot in &self.waypoint_snapshots {
            robot.api().upload_waypoint_snapshot(snapshot, lease).await?;
            info!(id = %snapshot.id, "uploaded waypoint snapshot");
        }
        for snapshot in &self.edge_snapshots {
            robot.api().upload_edge_snapshot(snapshot, lease).await?;
            info!(id = %snapshot.id, "uploaded edge snapshot");
        }
        Ok(())
    }
}

fn load_snapshots<'a>(
    dir: &Path,
    ids: impl Iterator<Item = &'a str>,
) -> Result<Vec<(String, Vec<u8>)>, ReplayError> {
    let mut seen = HashSet::new();
    let mut snapshots = Vec::new();
    for id in ids {
        if !seen.insert(id) {
            continue;
        }
        let path = dir.join(id);
        debug!(path = %path.display(), "loading snapshot");
        let payload = fs::read(&path).map_err(|err| ReplayError::read_failed(&path, err))?;
        snapshots.push((id.to_string(), payload));
    }
    Ok(snapshots)
}
