//! Policy and neural network wrappers
//!
//! This module provides the actor-critic network trained by PPO, built on
//! tch-rs.

pub mod gaussian;

pub use gaussian::{Activation, GaussianPolicy, NetworkConfig, PolicyEvaluation};
