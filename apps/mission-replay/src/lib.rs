//! Mission replay: acquire the body lease, upload a recorded graph-nav map and
//! mission, stand the robot up, play the mission (once or repeatedly for a
//! fixed duration) and always power down and hand the lease back.

pub mod cli;
pub mod config;
pub mod error;
pub mod execute;
pub mod map;
pub mod mission;
pub mod preflight;
pub mod runner;
pub mod telemetry;

pub use config::{ExecutionMode, RunConfig, Timings};
pub use error::ReplayError;
pub use runner::{MissionOutcome, MissionRunner, RunReport};
