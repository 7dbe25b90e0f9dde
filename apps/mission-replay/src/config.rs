use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use robot_sdk::Credentials;
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::error::ReplayError;

const DEFAULT_MISSION_PATH: [&str; 2] = ["missions", "autogenerated"];
const DEFAULT_APP_TOKEN_PATH: [&str; 2] = [".bosdyn", "dev.app_token"];
const MAX_MISSION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_REPEAT_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Stand, never play the mission.
    Static,
    Once,
    /// Restart the mission after every success until the duration has elapsed.
    RepeatFor(Duration),
}

/// Everything a replay needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub hostname: String,
    pub map_directory: Option<PathBuf>,
    pub mission_file: PathBuf,
    pub mission_timeout: Duration,
    pub mode: ExecutionMode,
    pub fail_on_question: bool,
}

impl RunConfig {
    pub fn upload_map(&self) -> bool {
        self.map_directory.is_some()
    }
}

impl TryFrom<&Cli> for RunConfig {
    type Error = ReplayError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let mission_file = match (&cli.mission_file, &cli.map_directory) {
            (Some(file), _) => file.clone(),
            (None, Some(dir)) => DEFAULT_MISSION_PATH
                .iter()
                .fold(dir.clone(), |path, part| path.join(part)),
            (None, None) => {
                return Err(ReplayError::Config(
                    "Must specify at least one of --map_directory or --mission".into(),
                ))
            }
        };

        if !cli.timeout.is_finite() || cli.timeout <= 0.0 {
            return Err(ReplayError::Config(format!(
                "--timeout must be a positive number of seconds, got {}",
                cli.timeout
            )));
        }
        if !cli.duration.is_finite() || cli.duration < 0.0 {
            return Err(ReplayError::Config(format!(
                "--time must be zero or a positive number of seconds, got {}",
                cli.duration
            )));
        }

        let mission_timeout = bounded_seconds("--timeout", cli.timeout, MAX_MISSION_TIMEOUT)?;
        let duration = bounded_seconds("--time", cli.duration, MAX_REPEAT_DURATION)?;

        let mode = if cli.static_mode {
            ExecutionMode::Static
        } else if duration.is_zero() {
            ExecutionMode::Once
        } else {
            ExecutionMode::RepeatFor(duration)
        };

        Ok(RunConfig {
            hostname: cli.hostname.clone(),
            map_directory: cli.map_directory.clone(),
            mission_file,
            mission_timeout,
            mode,
            // Autowalk missions ask questions when something went wrong.
            fail_on_question: cli.map_directory.is_some(),
        })
    }
}

fn bounded_seconds(flag: &str, value: f64, max: Duration) -> Result<Duration, ReplayError> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|duration| *duration <= max)
        .ok_or_else(|| {
            ReplayError::Config(format!(
                "{flag} must be at most {} seconds, got {value}",
                max.as_secs()
            ))
        })
}

/// Fixed waits of the replay sequence.
#[derive(Debug, Clone)]
pub struct Timings {
    pub poll_interval: Duration,
    pub stand_settle: Duration,
    pub power_timeout: Duration,
    pub restart_timeout: Duration,
    pub restart_settle: Duration,
    pub sync_rounds: u32,
    pub sync_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stand_settle: Duration::from_secs(5),
            power_timeout: Duration::from_secs(20),
            restart_timeout: Duration::from_secs(3),
            restart_settle: Duration::from_secs(1),
            sync_rounds: 10,
            sync_interval: Duration::from_millis(100),
        }
    }
}

/// Collect credentials from the command line. An app token given explicitly
/// must be readable; the default token file is optional.
pub fn load_credentials(cli: &Cli) -> Result<Credentials, ReplayError> {
    let app_token = match &cli.app_token {
        Some(path) => Some(read_app_token(path)?),
        None => match default_app_token_path() {
            Some(path) if path.is_file() => Some(read_app_token(&path)?),
            Some(path) => {
                if !cli.simulate {
                    warn!(path = %path.display(), "no application token found; continuing without one");
                }
                None
            }
            None => None,
        },
    };

    Ok(Credentials {
        username: cli.username.clone().unwrap_or_default(),
        password: cli.password.clone().unwrap_or_default(),
        app_token,
    })
}

fn default_app_token_path() -> Option<PathBuf> {
    let dirs = BaseDirs::new()?;
    Some(
        DEFAULT_APP_TOKEN_PATH
            .iter()
            .fold(dirs.home_dir().to_path_buf(), |path, part| path.join(part)),
    )
}

fn read_app_token(path: &Path) -> Result<String, ReplayError> {
    let token = fs::read_to_string(path).map_err(|err| ReplayError::read_failed(path, err))?;
    debug!(path = %path.display(), "loaded application token");
    Ok(token.trim().to_string())
}
