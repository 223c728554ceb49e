//! Test harness for OrangeFS clusters.
//!
//! Provisions a cluster of machines, builds and installs OrangeFS on them,
//! starts its servers and clients, and runs the OrangeFS test categories
//! against the head node, writing one PASS/FAIL line per test.

pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod runner;
pub mod suites;

pub use error::{Error, OfsTestError, Result};
