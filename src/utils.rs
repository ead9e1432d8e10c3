//! Utility functions and helpers

pub mod normalize;
