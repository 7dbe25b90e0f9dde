use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "mission-replay",
    author,
    version,
    about = "Replay a stored mission, including Autowalk missions, on a robot"
)]
pub struct Cli {
    /// Hostname or address of the robot.
    pub hostname: String,

    /// User name for authenticating with the robot.
    #[arg(
        long,
        env = "ROBOT_USERNAME",
        required_unless_present = "simulate"
    )]
    pub username: Option<String>,

    /// Password for authenticating with the robot.
    #[arg(
        long,
        env = "ROBOT_PASSWORD",
        hide_env_values = true,
        required_unless_present = "simulate"
    )]
    pub password: Option<String>,

    /// Path to the application token file. Defaults to ~/.bosdyn/dev.app_token.
    #[arg(long = "app-token", env = "ROBOT_APP_TOKEN")]
    pub app_token: Option<PathBuf>,

    /// PEM file with the certificate authority that signed the robot's certificate.
    #[arg(long = "ca-cert", env = "ROBOT_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Map directory to upload before the mission. Also makes operator
    /// questions fail the mission.
    #[arg(long = "map_directory", alias = "map-directory")]
    pub map_directory: Option<PathBuf>,

    /// Mission file. Defaults to <map_directory>/missions/autogenerated.
    #[arg(long = "mission")]
    pub mission_file: Option<PathBuf>,

    /// Keep-alive deadline sent with every play request (s).
    #[arg(long, default_value_t = 3.0)]
    pub timeout: f64,

    /// Time to repeat the mission (s). 0 runs it once.
    #[arg(long = "time", default_value_t = 0.0)]
    pub duration: f64,

    /// Stand, but do not run the mission.
    #[arg(long = "static", conflicts_with = "duration")]
    pub static_mode: bool,

    /// Replay against an in-memory simulated robot instead of the network.
    #[arg(long)]
    pub simulate: bool,
}
