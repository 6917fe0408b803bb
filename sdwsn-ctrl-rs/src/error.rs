//! Host error type

use sdwsn_core::LinkAddr;
use thiserror::Error;

/// Errors raised while loading or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scenario parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Controller error: {0}")]
    Core(#[from] sdwsn_core::Error),

    #[error("Link references unknown node {0}")]
    UnknownNode(LinkAddr),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
}
