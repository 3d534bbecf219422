//! Test doubles for the orchestrator.
//!
//! Exposed publicly so downstream crates embedding the engine can
//! exercise their own pipelines without live stage services.

mod mocks;

pub use mocks::ScriptedTransport;
