//! Shared helpers for vaultflow integration tests.
//!
//! - `TestVault`: a scratch vault in a temp directory with a ready executor
//! - `ScriptedModelClient`: a model stub that replays queued responses
//! - builders for the models and pipeline configs used across tests

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{CountingStorage, ScriptedModelClient, TestVault};
