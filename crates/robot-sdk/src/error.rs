use thiserror::Error;

#[derive(Debug, Error)]
pub enum RobotError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("robot rejected credentials")]
    Unauthenticated,
    #[error("lease for resource '{0}' is held by another client")]
    LeaseUnavailable(String),
    #[error("presented lease for '{resource}' is older than the latest revision")]
    LeaseStale { resource: String },
    #[error("no lease is held for resource '{0}'")]
    LeaseNotHeld(String),
    #[error("lease wallet has no lease for resource '{0}'")]
    NoLeaseForResource(String),
    #[error("clock is not synchronized with the robot")]
    NotSynced,
    #[error("{0} cannot be expressed in robot time")]
    TimestampOutOfRange(time::OffsetDateTime),
    #[error("time sync did not converge after {rounds} rounds")]
    TimeSyncFailed { rounds: u32 },
    #[error("power state did not reach {target} within {timeout_secs}s")]
    PowerTimeout { target: &'static str, timeout_secs: u64 },
    #[error("invalid certificate: {0}")]
    Certificate(String),
    #[error("invalid robot address: {0}")]
    Address(#[from] url::ParseError),
    #[error("request rejected: {0}")]
    Rejected(String),
}
