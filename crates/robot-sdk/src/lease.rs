use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RobotError;

/// Resource name of the robot's actuation subsystem.
pub const BODY_RESOURCE: &str = "body";

/// Exclusive-access token for a robot resource.
///
/// The robot issues a lease with a one-element sequence. Every newer revision
/// increments the last element; the robot rejects commands carrying an older
/// revision than the newest one it has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub resource: String,
    pub epoch: String,
    pub sequence: Vec<u32>,
    #[serde(default)]
    pub client_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOrdering {
    Same,
    Older,
    Newer,
    DifferentResource,
    DifferentEpoch,
}

impl Lease {
    pub fn new(resource: impl Into<String>, epoch: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            epoch: epoch.into(),
            sequence: vec![1],
            client_names: Vec::new(),
        }
    }

    /// Next revision of this lease.
    pub fn create_newer(&self) -> Lease {
        let mut newer = self.clone();
        match newer.sequence.last_mut() {
            Some(last) => *last += 1,
            None => newer.sequence.push(1),
        }
        newer
    }

    /// How `self` relates to `other`. A longer sequence sharing `other`'s full
    /// prefix is a sub-lease and counts as newer.
    pub fn compare(&self, other: &Lease) -> LeaseOrdering {
        if self.resource != other.resource {
            return LeaseOrdering::DifferentResource;
        }
        if self.epoch != other.epoch {
            return LeaseOrdering::DifferentEpoch;
        }
        for (mine, theirs) in self.sequence.iter().zip(other.sequence.iter()) {
            match mine.cmp(theirs) {
                Ordering::Less => return LeaseOrdering::Older,
                Ordering::Greater => return LeaseOrdering::Newer,
                Ordering::Equal => {}
            }
        }
        match self.sequence.len().cmp(&other.sequence.len()) {
            Ordering::Less => LeaseOrdering::Older,
            Ordering::Greater => LeaseOrdering::Newer,
            Ordering::Equal => LeaseOrdering::Same,
        }
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sequence: Vec<String> = self.sequence.iter().map(u32::to_string).collect();
        write!(f, "{}/{}/[{}]", self.resource, self.epoch, sequence.join(","))
    }
}

/// Owns the latest revision of each lease the client holds.
///
/// Callers advance the wallet before every mutating call so the robot always
/// sees a strictly newer revision than the previous command.
#[derive(Debug, Default)]
pub struct LeaseWallet {
    leases: HashMap<String, Lease>,
}

impl LeaseWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, lease: Lease) {
        self.leases.insert(lease.resource.clone(), lease);
    }

    pub fn get(&self, resource: &str) -> Result<&Lease, RobotError> {
        self.leases
            .get(resource)
            .ok_or_else(|| RobotError::NoLeaseForResource(resource.to_string()))
    }

    /// Store and return the next revision for `resource`.
    pub fn advance(&mut self, resource: &str) -> Result<Lease, RobotError> {
        let current = self
            .leases
            .get_mut(resource)
            .ok_or_else(|| RobotError::NoLeaseForResource(resource.to_string()))?;
        *current = current.create_newer();
        Ok(current.clone())
    }

    pub fn remove(&mut self, resource: &str) -> Option<Lease> {
        self.leases.remove(resource)
    }
}
