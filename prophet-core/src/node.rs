//! Routing-table entry and the three predictability update rules.

use serde::{Deserialize, Serialize};

use crate::error::ParamsError;

pub const DEFAULT_P_ENCOUNTER: f64 = 0.75;
pub const DEFAULT_BETA: f64 = 0.25;
pub const DEFAULT_GAMMA: f64 = 0.99;
/// Milliseconds per aging unit.
pub const DEFAULT_KAPPA: u32 = 100;

pub const DEFAULT_RELAY: bool = true;
pub const DEFAULT_CUSTODY: bool = true;
pub const DEFAULT_INTERNET: bool = false;

/// Weights of the predictability algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeParams {
    pub p_encounter: f64,
    pub beta: f64,
    pub gamma: f64,
    pub kappa: u32,
}

impl Default for NodeParams {
    fn default() -> Self {
        Self {
            p_encounter: DEFAULT_P_ENCOUNTER,
            beta: DEFAULT_BETA,
            gamma: DEFAULT_GAMMA,
            kappa: DEFAULT_KAPPA,
        }
    }
}

impl NodeParams {
    /// `p_encounter`, `beta` and `gamma` all lie in `[0, 1]`, which keeps
    /// every update rule inside the unit interval.
    pub fn validate(&self) -> Result<(), ParamsError> {
        unit("p_encounter", self.p_encounter)?;
        unit("beta", self.beta)?;
        unit("gamma", self.gamma)
    }
}

fn in_unit(x: f64) -> bool {
    (0.0..=1.0).contains(&x)
}

pub(crate) fn unit(name: &'static str, value: f64) -> Result<(), ParamsError> {
    if in_unit(value) {
        Ok(())
    } else {
        Err(ParamsError::OutOfUnitRange { name, value })
    }
}

/// Delivery predictability toward one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) route: String,
    pub(crate) p_value: f64,
    pub(crate) relay: bool,
    pub(crate) custody: bool,
    pub(crate) internet_gateway: bool,
    /// Time of last update, ms.
    pub(crate) age: u64,
    pub(crate) params: NodeParams,
}

impl Node {
    pub fn new(route: impl Into<String>) -> Self {
        Self::with_flags(route, DEFAULT_RELAY, DEFAULT_CUSTODY, DEFAULT_INTERNET)
    }

    pub fn with_flags(route: impl Into<String>, relay: bool, custody: bool, internet: bool) -> Self {
        Self {
            route: route.into(),
            p_value: 0.0,
            relay,
            custody,
            internet_gateway: internet,
            age: 0,
            params: NodeParams::default(),
        }
    }

    /// Rebuild a node from persisted fields.
    pub fn restore(
        route: impl Into<String>,
        p_value: f64,
        relay: bool,
        custody: bool,
        internet: bool,
        age: u64,
    ) -> Self {
        let mut n = Self::with_flags(route, relay, custody, internet);
        n.set_p_value(p_value);
        n.age = age;
        n
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    pub fn relay(&self) -> bool {
        self.relay
    }

    pub fn custody(&self) -> bool {
        self.custody
    }

    pub fn internet_gateway(&self) -> bool {
        self.internet_gateway
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn params(&self) -> &NodeParams {
        &self.params
    }

    pub(crate) fn set_p_value(&mut self, p: f64) {
        if in_unit(p) {
            self.p_value = p;
        }
    }

    pub(crate) fn set_flags(&mut self, relay: bool, custody: bool, internet: bool) {
        self.relay = relay;
        self.custody = custody;
        self.internet_gateway = internet;
    }

    pub(crate) fn set_params(&mut self, params: NodeParams) {
        self.params = params;
    }

    /// Direct contact: `p + (1 - p) * p_encounter`.
    pub fn update_pvalue(&mut self, now_ms: u64) {
        if !in_unit(self.p_value) {
            return;
        }
        self.p_value += (1.0 - self.p_value) * self.params.p_encounter;
        self.age = now_ms;
    }

    /// Transitive: `p * beta + (1 - beta) * ab * bc * p_encounter`, applied
    /// only while `p <= bc`.
    pub fn update_transitive(&mut self, ab: f64, bc: f64, now_ms: u64) {
        if !in_unit(self.p_value) || !in_unit(ab) || !in_unit(bc) {
            return;
        }
        if self.p_value > bc {
            return;
        }
        let beta = self.params.beta;
        self.p_value = self.p_value * beta + (1.0 - beta) * ab * bc * self.params.p_encounter;
        self.age = now_ms;
    }

    /// Aging: `p * gamma^k` with `k = elapsed / kappa`.
    pub fn update_age(&mut self, now_ms: u64) {
        if !in_unit(self.p_value) {
            return;
        }
        let units = self.time_to_units(now_ms.saturating_sub(self.age));
        if units > 0 {
            let exp = i32::try_from(units).unwrap_or(i32::MAX);
            self.p_value *= self.params.gamma.powi(exp);
        }
        self.age = now_ms;
    }

    fn time_to_units(&self, elapsed_ms: u64) -> u64 {
        if self.params.kappa == 0 {
            return 0;
        }
        elapsed_ms / u64::from(self.params.kappa)
    }
}
