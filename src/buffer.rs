//! Experience ingestion and processing

pub mod rollout;
