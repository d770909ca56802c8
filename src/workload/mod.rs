//! Workload Simulation Module
//!
//! Synthetic stand-ins for real extract/transform/load effort.
//!
//! # Components
//!
//! - [`simulator`]: CPU burn and idle delay primitives

pub mod simulator;

pub use simulator::{burn_cpu, find_large_prime, idle, is_prime, Workload};
