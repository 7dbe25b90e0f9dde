use serde::{Deserialize, Serialize};

/// Localization graph recorded by graph-nav.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchoring: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: String,
    /// Empty when no snapshot was recorded for this waypoint.
    #[serde(default)]
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId {
    pub from_waypoint: String,
    pub to_waypoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    #[serde(default)]
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

impl Graph {
    /// Snapshot ids referenced by waypoints, in graph order, skipping empty ids.
    pub fn waypoint_snapshot_ids(&self) -> impl Iterator<Item = &str> {
        self.waypoints
            .iter()
            .map(|w| w.snapshot_id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn edge_snapshot_ids(&self) -> impl Iterator<Item = &str> {
        self.edges
            .iter()
            .map(|e| e.snapshot_id.as_str())
            .filter(|id| !id.is_empty())
    }
}

/// Sensor data captured at a waypoint. The payload is opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaypointSnapshot {
    pub id: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub id: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

/// One node of a mission behavior tree. The engine interprets `implementation`;
/// the client only moves the tree around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "impl", default)]
    pub implementation: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    None,
    Running,
    Success,
    Failure,
    Paused,
    Error,
}

impl MissionStatus {
    /// The engine has not reached a terminal state yet.
    pub fn is_active(self) -> bool {
        matches!(self, MissionStatus::None | MissionStatus::Running)
    }

    pub fn is_success(self) -> bool {
        matches!(self, MissionStatus::Success | MissionStatus::Paused)
    }
}

/// Prompt raised by the mission engine that waits for an operator answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    #[serde(default)]
    pub source: String,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionState {
    pub status: MissionStatus,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstopLevel {
    None,
    SettleThenCut,
    Cut,
}

impl EstopLevel {
    pub fn is_stopped(self) -> bool {
        self != EstopLevel::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    Off,
    On,
    PoweringOn,
    PoweringOff,
    Error,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum PowerRequest {
    On,
    Off { cut_immediately: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotCommand {
    Stand,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
