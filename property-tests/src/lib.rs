//! SD-WSN Property-Based Tests
//!
//! Proptest suite for the controller core's invariants.
//!
//! # Usage
//!
//! ```bash
//! cargo test -p sdwsn-property-tests                      # All property tests
//! cargo test -p sdwsn-property-tests --test prop_edges    # Edge set only
//! PROPTEST_CASES=1000 cargo test -p sdwsn-property-tests  # More cases
//! ```
//!
//! # Test Modules
//!
//! - `prop_edges`: tree size bound, live endpoints, link backing, convergence
//! - `prop_dfs`: next hop is a tree neighbor, repeat queries agree
//! - `prop_routes`: one pair per destination, replacement wins
//! - `prop_wire`: checksum verification, bit flips detected
//! - `prop_dissemination`: attempt bound, fresh sequence numbers, differential skips

// Re-export for convenience in tests
pub use sdwsn_core::*;
