//! Router configuration. Every field can be changed at runtime through the
//! Controller's setters.

use serde::{Deserialize, Serialize};

use crate::error::ParamsError;
use crate::node::{unit, NodeParams, DEFAULT_BETA, DEFAULT_GAMMA, DEFAULT_KAPPA, DEFAULT_P_ENCOUNTER};
use crate::queue_policy::QueuePolicy;
use crate::strategy::ForwardStrategy;

/// Hello interval in units of 100 ms.
pub const DEFAULT_HELLO_INTERVAL: u8 = 20;
/// Hello intervals of silence before a neighbor is declared gone.
pub const DEFAULT_HELLO_DEAD: u8 = 20;
pub const DEFAULT_MAX_FORWARD: u32 = 5;
pub const DEFAULT_MIN_FORWARD: u32 = 3;
/// Seconds between aging passes over the route table.
pub const DEFAULT_AGE_PERIOD: u32 = 180;
pub const DEFAULT_MAX_TABLE_SIZE: usize = 1024;
/// Routes below this predictability are dropped.
pub const DEFAULT_EPSILON: f64 = 0.0039;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProphetParams {
    #[serde(default = "default_p_encounter")]
    pub p_encounter: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Milliseconds per aging unit.
    #[serde(default = "default_kappa")]
    pub kappa: u32,
    /// 100 ms units.
    #[serde(default = "default_hello_interval")]
    pub hello_interval: u8,
    #[serde(default = "default_hello_dead")]
    pub hello_dead: u8,
    #[serde(default = "default_max_forward")]
    pub max_forward: u32,
    #[serde(default = "default_min_forward")]
    pub min_forward: u32,
    /// Seconds.
    #[serde(default = "default_age_period")]
    pub age_period: u32,
    /// 0 disables the cap.
    #[serde(default = "default_max_table_size")]
    pub max_table_size: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_true")]
    pub relay_node: bool,
    #[serde(default)]
    pub internet_gw: bool,
    #[serde(default)]
    pub forward_strategy: ForwardStrategy,
    #[serde(default)]
    pub queue_policy: QueuePolicy,
}

fn default_p_encounter() -> f64 {
    DEFAULT_P_ENCOUNTER
}
fn default_beta() -> f64 {
    DEFAULT_BETA
}
fn default_gamma() -> f64 {
    DEFAULT_GAMMA
}
fn default_kappa() -> u32 {
    DEFAULT_KAPPA
}
fn default_hello_interval() -> u8 {
    DEFAULT_HELLO_INTERVAL
}
fn default_hello_dead() -> u8 {
    DEFAULT_HELLO_DEAD
}
fn default_max_forward() -> u32 {
    DEFAULT_MAX_FORWARD
}
fn default_min_forward() -> u32 {
    DEFAULT_MIN_FORWARD
}
fn default_age_period() -> u32 {
    DEFAULT_AGE_PERIOD
}
fn default_max_table_size() -> usize {
    DEFAULT_MAX_TABLE_SIZE
}
fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}
fn default_true() -> bool {
    true
}

impl Default for ProphetParams {
    fn default() -> Self {
        Self {
            p_encounter: default_p_encounter(),
            beta: default_beta(),
            gamma: default_gamma(),
            kappa: default_kappa(),
            hello_interval: default_hello_interval(),
            hello_dead: default_hello_dead(),
            max_forward: default_max_forward(),
            min_forward: default_min_forward(),
            age_period: default_age_period(),
            max_table_size: default_max_table_size(),
            epsilon: default_epsilon(),
            relay_node: true,
            internet_gw: false,
            forward_strategy: ForwardStrategy::default(),
            queue_policy: QueuePolicy::default(),
        }
    }
}

impl ProphetParams {
    /// Predictability weights and `epsilon` lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.node_params().validate()?;
        unit("epsilon", self.epsilon)
    }

    /// Replace the predictability weights and `epsilon` with their defaults.
    pub fn with_default_weights(self) -> Self {
        Self {
            p_encounter: DEFAULT_P_ENCOUNTER,
            beta: DEFAULT_BETA,
            gamma: DEFAULT_GAMMA,
            epsilon: DEFAULT_EPSILON,
            ..self
        }
    }

    /// The predictability weights handed to each Node.
    pub fn node_params(&self) -> NodeParams {
        NodeParams {
            p_encounter: self.p_encounter,
            beta: self.beta,
            gamma: self.gamma,
            kappa: self.kappa,
        }
    }

    /// Session timeout before negotiation.
    pub fn hello_interval_ms(&self) -> u64 {
        u64::from(self.hello_interval) * 100
    }

    /// Silence after which a neighbor is gone.
    pub fn hello_dead_ms(&self) -> u64 {
        u64::from(self.hello_dead) * self.hello_interval_ms()
    }

    pub fn age_period_ms(&self) -> u64 {
        u64::from(self.age_period) * 1000
    }

    /// Lifetime of a control bundle, in seconds.
    pub fn control_expiration(&self) -> u32 {
        u32::from(self.hello_dead) * u32::from(self.hello_interval) / 10
    }
}
