//! Pipewright - declarative streaming pipeline deployer
//!
//! Builds a logical application model from YAML documents, compiles it into
//! a backend-resolved execution plan, and reconciles that plan onto a
//! streaming broker (topics, schemas) and a compute platform (per-agent
//! configuration secrets and workload resources) under tenant isolation.

pub mod agents;
pub mod compute;
pub mod config;
pub mod deployer;
pub mod model;
pub mod parser;
pub mod plan;
pub mod store;
pub mod streaming;
pub mod utils;
