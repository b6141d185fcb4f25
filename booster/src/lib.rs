//! Queue and activate validator boosts against the BGT contract.
//!
//! Boosting is a two-step process on-chain. An operator first queues its unboosted BGT behind a
//! validator pubkey (`queueBoost`) and, once `activateBoostDelay` blocks have passed, activates
//! the queued amount (`activateBoost`). This crate automates both steps for every registered
//! validator on a fixed cadence, recording each confirmed transaction so that no boost is queued
//! twice.
//!
//! # Components
//!
//! * [chain]: contract reads, fee suggestion, broadcast and confirmation.
//! * [signer]: turns unsigned intents into signed transactions (remote service or local key).
//! * [store]: validator configuration and boost records.
//! * [orchestrator]: decides and executes the lifecycle for each validator.
//! * [scheduler]: fires ticks on an interval.
//! * [api]: admin HTTP API for validator management.
//!
//! # Status
//!
//! `bgt-booster` moves funds on mainnet. Run [orchestrator::Orchestrator::plan] (`booster plan`)
//! against a new configuration before letting it tick.

pub mod api;
pub mod chain;
pub mod config;
pub mod http;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod signer;
pub mod store;
pub mod telemetry;
pub mod types;
