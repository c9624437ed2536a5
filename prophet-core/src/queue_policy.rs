//! Queue policies: which stored bundle to evict first when over quota.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::error::PolicyError;
use crate::facade::BundleCore;
use crate::stats::Stats;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QueuePolicy {
    /// Oldest first.
    #[default]
    #[serde(rename = "FIFO")]
    Fifo,
    /// Most forwarded first.
    #[serde(rename = "MOFO")]
    Mofo,
    /// Highest cumulative delivery probability first.
    #[serde(rename = "MOPR")]
    Mopr,
    #[serde(rename = "LINEAR_MOPR")]
    LinearMopr,
    /// Shortest remaining lifetime first.
    #[serde(rename = "SHLI")]
    Shli,
    /// Lowest predictability first, among bundles forwarded often enough.
    #[serde(rename = "LEPR")]
    Lepr,
}

impl QueuePolicy {
    pub const ALL: [QueuePolicy; 6] = [
        QueuePolicy::Fifo,
        QueuePolicy::Mofo,
        QueuePolicy::Mopr,
        QueuePolicy::LinearMopr,
        QueuePolicy::Shli,
        QueuePolicy::Lepr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueuePolicy::Fifo => "FIFO",
            QueuePolicy::Mofo => "MOFO",
            QueuePolicy::Mopr => "MOPR",
            QueuePolicy::LinearMopr => "LINEAR_MOPR",
            QueuePolicy::Shli => "SHLI",
            QueuePolicy::Lepr => "LEPR",
        }
    }
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueuePolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownName(s.to_string()))
    }
}

/// Shared state an eviction order reads from.
#[derive(Clone, Copy)]
pub struct PolicyEnv<'a> {
    pub core: &'a dyn BundleCore,
    pub stats: &'a Stats,
    pub nodes: &'a Table,
}

/// Eviction order. `comp(a, b)` is true when `b` should be evicted before `a`.
#[derive(Clone, Copy)]
pub struct QueueComp<'a> {
    policy: QueuePolicy,
    min_forward: u32,
    core: &'a dyn BundleCore,
    stats: Option<&'a Stats>,
    nodes: Option<&'a Table>,
}

impl<'a> QueueComp<'a> {
    pub fn new(
        policy: QueuePolicy,
        min_forward: u32,
        core: &'a dyn BundleCore,
        stats: Option<&'a Stats>,
        nodes: Option<&'a Table>,
    ) -> Result<Self, PolicyError> {
        match policy {
            QueuePolicy::Mopr | QueuePolicy::LinearMopr if stats.is_none() => {
                return Err(PolicyError::MissingStats(policy.as_str()));
            }
            QueuePolicy::Lepr if min_forward == 0 => {
                return Err(PolicyError::MinForwardZero(policy.as_str()));
            }
            QueuePolicy::Lepr if nodes.is_none() => {
                return Err(PolicyError::MissingTable(policy.as_str()));
            }
            _ => {}
        }
        Ok(Self {
            policy,
            min_forward,
            core,
            stats,
            nodes,
        })
    }

    /// Comparator over a full environment; only `min_forward` can still fail.
    pub fn with_env(policy: QueuePolicy, min_forward: u32, env: PolicyEnv<'a>) -> Result<Self, PolicyError> {
        Self::new(policy, min_forward, env.core, Some(env.stats), Some(env.nodes))
    }

    pub(crate) fn from_env(policy: QueuePolicy, min_forward: u32, env: PolicyEnv<'a>) -> Self {
        Self {
            policy,
            min_forward,
            core: env.core,
            stats: Some(env.stats),
            nodes: Some(env.nodes),
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn min_forward(&self) -> u32 {
        self.min_forward
    }

    pub fn comp(&self, a: &Bundle, b: &Bundle) -> bool {
        match self.policy {
            QueuePolicy::Fifo => b.fifo_cmp(a).is_lt(),
            QueuePolicy::Mofo => a.num_forward < b.num_forward,
            QueuePolicy::Mopr => self.stat(a, Stats::mopr) < self.stat(b, Stats::mopr),
            QueuePolicy::LinearMopr => self.stat(a, Stats::lmopr) < self.stat(b, Stats::lmopr),
            QueuePolicy::Shli => a.expires_at() > b.expires_at(),
            QueuePolicy::Lepr => self.p(b) < self.p(a),
        }
    }

    fn stat(&self, b: &Bundle, f: fn(&Stats, &Bundle) -> f64) -> f64 {
        self.stats.map(|s| f(s, b)).unwrap_or(0.0)
    }

    fn p(&self, b: &Bundle) -> f64 {
        self.nodes
            .map(|t| t.p_value_for(b, self.core))
            .unwrap_or(0.0)
    }

    /// LEPR only evicts bundles forwarded more than `min_forward` times.
    pub fn qualifies(&self, b: &Bundle) -> bool {
        self.policy != QueuePolicy::Lepr || b.num_forward > self.min_forward
    }
}
