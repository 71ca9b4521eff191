//! Target set enumeration

use chaff_api::Target;
use chaff_config::{TargetRange, TargetsPolicy};
use rand::Rng;
use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;

/// Upper bound on the number of targets, extras included
pub const MAX_TARGETS: usize = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("target set is empty")]
    Empty,

    #[error("target set has {count} entries (max {max})")]
    TooMany { count: usize, max: usize },
}

/// Ordered, duplicate-free, non-empty list of targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    targets: Vec<Target>,
}

impl TargetSet {
    /// Expand `range` and append `extras`.
    ///
    /// Range targets come first in ascending address order, then extras in
    /// the given order. Later duplicates of an address are dropped.
    pub fn enumerate(
        range: &TargetRange,
        range_port: Option<u16>,
        extras: &[Target],
    ) -> Result<Self, TargetError> {
        let range_targets = range.iter().map(|addr| Target {
            address: IpAddr::V4(addr),
            fixed_port: range_port,
        });

        Self::from_targets(range_targets.chain(extras.iter().copied()))
    }

    pub fn from_policy(policy: &TargetsPolicy) -> Result<Self, TargetError> {
        Self::enumerate(&policy.range, policy.range_port, &policy.extras)
    }

    /// Build from explicit targets, dropping later duplicates
    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Result<Self, TargetError> {
        let mut seen = HashSet::new();
        let targets: Vec<Target> = targets
            .into_iter()
            .filter(|t| seen.insert(t.address))
            .collect();

        if targets.is_empty() {
            return Err(TargetError::Empty);
        }
        if targets.len() > MAX_TARGETS {
            return Err(TargetError::TooMany {
                count: targets.len(),
                max: MAX_TARGETS,
            });
        }

        Ok(Self { targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false for a constructed set
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn as_slice(&self) -> &[Target] {
        &self.targets
    }

    /// One target, uniformly at random
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &Target {
        &self.targets[rng.gen_range(0..self.targets.len())]
    }
}
