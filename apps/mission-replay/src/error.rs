use std::io;
use std::path::PathBuf;
use std::time::Duration;

use robot_sdk::RobotError;
use thiserror::Error;

/// Conditions that abort a replay. A mission that runs and fails is not an
/// error; see [`crate::MissionOutcome`].
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unable to find mission file: {}", .0.display())]
    MissingMissionFile(PathBuf),
    #[error("unable to find map directory: {}", .0.display())]
    MissingMapDirectory(PathBuf),
    #[error("missing input file: {}", .path.display())]
    MissingInput { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("lease not acquired: {0}")]
    LeaseNotAcquired(#[source] RobotError),
    #[error(
        "Robot is estopped. Please use an external E-Stop client, such as the estop SDK example, to configure E-Stop."
    )]
    Estopped,
    #[error("robot power on failed")]
    PowerOnFailed,
    #[error("robot did not power off; lease was returned")]
    PowerOffFailed,
    #[error("mission deadline {0:?} ahead is out of range")]
    DeadlineOutOfRange(Duration),
    #[error(transparent)]
    Robot(#[from] RobotError),
}

impl ReplayError {
    /// Map a failed read of `path`, separating "not there" from other I/O faults.
    pub fn read_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            ReplayError::MissingInput { path }
        } else {
            ReplayError::Io { path, source }
        }
    }
}
