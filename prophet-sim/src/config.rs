//! Load config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use prophet_core::ProphetParams;
use serde::Deserialize;

/// A scheduled link between two nodes, in simulated seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactConfig {
    pub a: String,
    pub b: String,
    pub start: u64,
    pub end: u64,
}

/// A bundle injected at `from` at time `at` (seconds).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageConfig {
    pub from: String,
    pub to: String,
    pub at: u64,
    #[serde(default = "default_message_size")]
    pub size: u64,
    /// Lifetime in seconds.
    #[serde(default = "default_lifetime")]
    pub lifetime: u32,
}

/// Simulation configuration. File: $PROPHET_SIM_CONFIG,
/// ~/.config/prophet-sim/config.toml or /etc/prophet-sim/config.toml.
/// Env overrides: PROPHET_HELLO_INTERVAL, PROPHET_STRATEGY,
/// PROPHET_QUEUE_POLICY, PROPHET_MAX_TABLE_SIZE.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Router parameters shared by every node.
    #[serde(default)]
    pub prophet: ProphetParams,
    /// Node EIDs, e.g. "dtn://a".
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<ContactConfig>,
    #[serde(default)]
    pub messages: Vec<MessageConfig>,
    /// Per-node storage quota in bytes; 0 is unbounded.
    #[serde(default)]
    pub quota: u64,
    /// Simulated seconds to run.
    #[serde(default = "default_duration")]
    pub duration: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_message_size() -> u64 {
    1024
}
fn default_lifetime() -> u32 {
    3600
}
fn default_duration() -> u64 {
    600
}
fn default_seed() -> u64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prophet: ProphetParams::default(),
            nodes: Vec::new(),
            contacts: Vec::new(),
            messages: Vec::new(),
            quota: 0,
            duration: default_duration(),
            seed: default_seed(),
        }
    }
}

impl Config {
    /// Router weights are in range, every contact and message names a
    /// configured node and every contact interval is non-empty.
    pub fn validate(&self) -> Result<()> {
        self.prophet.validate().context("invalid [prophet] parameters")?;
        let known = |eid: &str| self.nodes.iter().any(|n| n == eid);
        for n in &self.nodes {
            if !n.contains("://") {
                bail!("node {n:?} is not an endpoint id");
            }
        }
        for c in &self.contacts {
            if !known(&c.a) || !known(&c.b) {
                bail!("contact {} <-> {} names an unknown node", c.a, c.b);
            }
            if c.a == c.b {
                bail!("contact {} <-> {} is a loop", c.a, c.b);
            }
            if c.end <= c.start {
                bail!("contact {} <-> {} ends before it starts", c.a, c.b);
            }
        }
        for m in &self.messages {
            if !known(&m.from) {
                bail!("message source {} is not a node", m.from);
            }
        }
        Ok(())
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Result<Config> {
    let mut c = match config_paths().into_iter().find(|p| p.exists()) {
        Some(p) => load_file(&p)?,
        None => Config::default(),
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    Ok(c)
}

/// Parse one config file.
pub fn load_file(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let c = toml::from_str::<Config>(&s).with_context(|| format!("parsing {}", path.display()))?;
    tracing::info!(path = %path.display(), nodes = c.nodes.len(), contacts = c.contacts.len(), "loaded config");
    Ok(c)
}

/// Apply overrides from `var`; unparsable values are ignored with a warning.
pub fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PROPHET_HELLO_INTERVAL") {
        match s.parse::<u8>() {
            Ok(v) => c.prophet.hello_interval = v,
            Err(_) => tracing::warn!(value = %s, "ignoring PROPHET_HELLO_INTERVAL"),
        }
    }
    if let Some(s) = var("PROPHET_STRATEGY") {
        match s.parse() {
            Ok(v) => c.prophet.forward_strategy = v,
            Err(_) => tracing::warn!(value = %s, "ignoring PROPHET_STRATEGY"),
        }
    }
    if let Some(s) = var("PROPHET_QUEUE_POLICY") {
        match s.parse() {
            Ok(v) => c.prophet.queue_policy = v,
            Err(_) => tracing::warn!(value = %s, "ignoring PROPHET_QUEUE_POLICY"),
        }
    }
    if let Some(s) = var("PROPHET_MAX_TABLE_SIZE") {
        match s.parse::<usize>() {
            Ok(v) => c.prophet.max_table_size = v,
            Err(_) => tracing::warn!(value = %s, "ignoring PROPHET_MAX_TABLE_SIZE"),
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = std::env::var_os("PROPHET_SIM_CONFIG") {
        out.push(PathBuf::from(p));
    }
    if let Some(h) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(h.join(".config/prophet-sim/config.toml"));
    }
    out.push(PathBuf::from("/etc/prophet-sim/config.toml"));
    out
}
