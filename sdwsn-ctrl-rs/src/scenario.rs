//! Scenario files
//!
//! ```json
//! {
//!   "controller": { "differential": true },
//!   "nodes": [ { "addr": 512, "energy": 900, "drain_per_s": 0.2 } ],
//!   "links": [ { "a": 256, "b": 512, "rssi": -48 } ],
//!   "loss_probability": 0.05
//! }
//! ```
//!
//! Addresses are the raw `u16` link address. The `controller` section is a
//! [`ControllerConfig`]; missing fields take their defaults.

use crate::error::SimError;
use sdwsn_core::{ControllerConfig, Error, LinkAddr, LinkQuality, MAX_NODES};
use serde::Deserialize;
use std::path::Path;

fn default_advertise_interval() -> u64 {
    30_000
}

/// Simulated sensor node
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    /// Link address
    pub addr: LinkAddr,
    /// Initial residual energy
    pub energy: f64,
    /// Energy lost per simulated second
    #[serde(default)]
    pub drain_per_s: f64,
}

/// Simulated radio link
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSpec {
    /// One endpoint
    pub a: LinkAddr,
    /// Other endpoint
    pub b: LinkAddr,
    /// Received signal strength, dBm
    pub rssi: LinkQuality,
}

/// Complete simulation input
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Controller settings
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Sensor nodes (the controller is implicit)
    pub nodes: Vec<NodeSpec>,
    /// Radio links
    pub links: Vec<LinkSpec>,
    /// Per-hop frame loss
    #[serde(default)]
    pub loss_probability: f64,
    /// Neighbor advertisement period (simulated ms)
    #[serde(default = "default_advertise_interval")]
    pub advertise_interval_ms: u64,
}

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        let scenario: Scenario = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), SimError> {
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(SimError::InvalidScenario(format!(
                "loss_probability {} outside [0, 1]",
                self.loss_probability
            )));
        }
        if self.advertise_interval_ms == 0 {
            return Err(SimError::InvalidScenario("advertise_interval_ms must be positive".into()));
        }
        let live = self.nodes.len() + 1;
        if live > MAX_NODES {
            return Err(Error::CapacityExceeded {
                live,
                capacity: MAX_NODES,
            }
            .into());
        }
        let controller = self.controller.controller;
        if self.nodes.iter().any(|n| n.addr == controller) {
            return Err(SimError::InvalidScenario(format!("node {} is the controller", controller)));
        }
        let known = |addr: LinkAddr| addr == controller || self.nodes.iter().any(|n| n.addr == addr);
        for link in &self.links {
            for end in [link.a, link.b] {
                if !known(end) {
                    return Err(SimError::UnknownNode(end));
                }
            }
            if link.a == link.b {
                return Err(SimError::InvalidScenario(format!("self-link at {}", link.a)));
            }
        }
        Ok(())
    }

    /// Built-in mesh used when no scenario file is given
    ///
    /// Two branches below the controller joined by a weak cross link, plus
    /// a leaf that drains quickly and drops out mid-run.
    pub fn demo() -> Self {
        let controller = ControllerConfig::default();
        let ctrl = controller.controller;
        let node = |hi: u8, energy: f64, drain_per_s: f64| NodeSpec {
            addr: LinkAddr::new(hi, 0),
            energy,
            drain_per_s,
        };
        let link = |a: LinkAddr, b: LinkAddr, rssi: LinkQuality| LinkSpec { a, b, rssi };
        let n = |hi: u8| LinkAddr::new(hi, 0);

        Self {
            controller,
            nodes: vec![
                node(2, 900.0, 0.1),
                node(3, 850.0, 0.1),
                node(4, 700.0, 0.2),
                node(5, 950.0, 0.1),
                node(6, 400.0, 1.0),
            ],
            links: vec![
                link(ctrl, n(2), -42),
                link(ctrl, n(3), -55),
                link(n(2), n(4), -50),
                link(n(3), n(5), -47),
                link(n(4), n(5), -80),
                link(n(4), n(6), -60),
                link(n(5), n(6), -65),
            ],
            loss_probability: 0.05,
            advertise_interval_ms: default_advertise_interval(),
        }
    }
}
