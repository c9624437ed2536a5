//! Forwarding strategies: which bundles to offer a neighbor, and in what order.
//!
//! Every strategy starts from GRTR ("greater"): offer a bundle when the
//! neighbor is a better carrier toward its destination than we are. The
//! other predicates add conditions on top; the SORT and MAX variants keep
//! GRTR's predicate and only change the offer order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, Link};
use crate::error::PolicyError;
use crate::facade::BundleCore;
use crate::stats::Stats;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForwardStrategy {
    #[default]
    #[serde(rename = "GRTR")]
    Grtr,
    #[serde(rename = "GTMX")]
    Gtmx,
    #[serde(rename = "GRTR_PLUS")]
    GrtrPlus,
    #[serde(rename = "GTMX_PLUS")]
    GtmxPlus,
    #[serde(rename = "GRTR_SORT")]
    GrtrSort,
    #[serde(rename = "GRTR_MAX")]
    GrtrMax,
}

impl ForwardStrategy {
    pub const ALL: [ForwardStrategy; 6] = [
        ForwardStrategy::Grtr,
        ForwardStrategy::Gtmx,
        ForwardStrategy::GrtrPlus,
        ForwardStrategy::GtmxPlus,
        ForwardStrategy::GrtrSort,
        ForwardStrategy::GrtrMax,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ForwardStrategy::Grtr => "GRTR",
            ForwardStrategy::Gtmx => "GTMX",
            ForwardStrategy::GrtrPlus => "GRTR_PLUS",
            ForwardStrategy::GtmxPlus => "GTMX_PLUS",
            ForwardStrategy::GrtrSort => "GRTR_SORT",
            ForwardStrategy::GrtrMax => "GRTR_MAX",
        }
    }

    fn limits_forwards(self) -> bool {
        matches!(self, ForwardStrategy::Gtmx | ForwardStrategy::GtmxPlus)
    }

    fn uses_p_max(self) -> bool {
        matches!(self, ForwardStrategy::GrtrPlus | ForwardStrategy::GtmxPlus)
    }
}

impl fmt::Display for ForwardStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForwardStrategy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownName(s.to_string()))
    }
}

/// Offer predicate for one link, bound to the tables it reads.
pub struct Decider<'a> {
    strategy: ForwardStrategy,
    link: &'a Link,
    core: &'a dyn BundleCore,
    local: &'a Table,
    remote: &'a Table,
    stats: Option<&'a Stats>,
    max_forward: u32,
    is_relay: bool,
}

impl<'a> Decider<'a> {
    /// `is_relay` is whether the neighbor forwards bundles for others.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: ForwardStrategy,
        link: &'a Link,
        core: &'a dyn BundleCore,
        local: &'a Table,
        remote: &'a Table,
        stats: Option<&'a Stats>,
        max_forward: u32,
        is_relay: bool,
    ) -> Result<Self, PolicyError> {
        if link.remote_eid.is_empty() {
            return Err(PolicyError::EmptyNexthop);
        }
        if strategy.limits_forwards() && max_forward == 0 {
            return Err(PolicyError::MaxForwardZero(strategy.as_str()));
        }
        if strategy.uses_p_max() && stats.is_none() {
            return Err(PolicyError::MissingStats(strategy.as_str()));
        }
        Ok(Self {
            strategy,
            link,
            core,
            local,
            remote,
            stats,
            max_forward,
            is_relay,
        })
    }

    pub fn strategy(&self) -> ForwardStrategy {
        self.strategy
    }

    /// Whether `b` should be offered to the neighbor.
    pub fn accept(&self, b: &Bundle) -> bool {
        if !self.grtr(b) {
            return false;
        }
        if self.strategy.limits_forwards() && !self.forward_count_ok(b) {
            return false;
        }
        if self.strategy.uses_p_max() && !self.p_max_ok(b) {
            return false;
        }
        true
    }

    fn to_destination(&self, b: &Bundle) -> bool {
        self.core.is_route(&b.destination, &self.link.remote_eid)
    }

    fn grtr(&self, b: &Bundle) -> bool {
        if !self.core.should_fwd(b, self.link) {
            return false;
        }
        if self.to_destination(b) {
            return true;
        }
        if !self.is_relay {
            return false;
        }
        let route = self.core.get_route(&b.destination);
        self.local.p_value(&route) < self.remote.p_value(&route)
    }

    fn forward_count_ok(&self, b: &Bundle) -> bool {
        self.to_destination(b) || b.num_forward < self.max_forward
    }

    fn p_max_ok(&self, b: &Bundle) -> bool {
        if self.to_destination(b) {
            return true;
        }
        let p_max = self.stats.map(|s| s.p_max(b)).unwrap_or(0.0);
        p_max < self.remote.p_value_for(b, self.core)
    }
}

/// Offer ordering. `comp(a, b)` is true when `b` should be offered before `a`.
pub struct FwdStrategy<'a> {
    strategy: ForwardStrategy,
    core: &'a dyn BundleCore,
    local: Option<&'a Table>,
    remote: Option<&'a Table>,
}

impl<'a> FwdStrategy<'a> {
    pub fn new(
        strategy: ForwardStrategy,
        core: &'a dyn BundleCore,
        local: Option<&'a Table>,
        remote: Option<&'a Table>,
    ) -> Result<Self, PolicyError> {
        match strategy {
            ForwardStrategy::GrtrSort if local.is_none() || remote.is_none() => {
                Err(PolicyError::MissingTable(strategy.as_str()))
            }
            ForwardStrategy::GrtrMax if remote.is_none() => {
                Err(PolicyError::MissingTable(strategy.as_str()))
            }
            _ => Ok(Self {
                strategy,
                core,
                local,
                remote,
            }),
        }
    }

    pub fn strategy(&self) -> ForwardStrategy {
        self.strategy
    }

    pub fn comp(&self, a: &Bundle, b: &Bundle) -> bool {
        match (self.strategy, self.local, self.remote) {
            (ForwardStrategy::GrtrSort, Some(local), Some(remote)) => {
                let gain = |x: &Bundle| {
                    remote.p_value_for(x, self.core) - local.p_value_for(x, self.core)
                };
                gain(a) < gain(b)
            }
            (ForwardStrategy::GrtrMax, _, Some(remote)) => {
                remote.p_value_for(a, self.core) < remote.p_value_for(b, self.core)
            }
            _ => b.fifo_cmp(a).is_lt(),
        }
    }
}
