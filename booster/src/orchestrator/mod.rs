//! Drive every registered validator through the two-phase boost lifecycle.
//!
//! # Overview
//!
//! Each tick walks the validators in store order. For every validator:
//!
//! 1. _Queue_: if no unactivated queue boost is recorded and the operator's unboosted balance
//!    strictly exceeds the validator's threshold, queue the whole balance, wait for the receipt,
//!    and record a [QueueBoost](crate::types::QueueBoost).
//! 2. _Activate_: if the contract holds a queued balance for the pair and more than
//!    `activateBoostDelay` blocks have passed since it was queued, activate it, record an
//!    [ActivateBoost](crate::types::ActivateBoost), and flag the queue boost as activated.
//!
//! The decisions themselves live in [decide_queue], [decide_activate] and [decide_actions] and
//! are free of side effects.
//!
//! # Failure
//!
//! Any error aborts the whole tick. Confirmed transactions are never rolled back. A transaction
//! that confirms but cannot be recorded is reported as [Error::PersistenceGap] so that it can be
//! reconciled by hand.
//!
//! Only one tick runs at a time: [Orchestrator::run_tick] returns [Error::TickInProgress] instead
//! of waiting if another tick holds the lock.

use crate::{chain, signer, store, types::InvalidConfig};
use alloy::primitives::TxHash;
use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

mod decide;
pub use decide::{decide_actions, decide_activate, decide_queue, Action, Observation};
mod engine;
pub use engine::{Orchestrator, Plan};
mod metrics;
pub use metrics::{Metrics, Status};

/// Errors that can abort a tick.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid validator config: {0}")]
    InvalidConfig(#[from] InvalidConfig),
    #[error("chain error: {0}")]
    Chain(#[from] chain::Error),
    #[error("signer error: {0}")]
    Signer(#[from] signer::Error),
    #[error("store error: {0}")]
    Store(#[from] store::Error),
    #[error("transaction {hash} confirmed but not recorded: {source}")]
    PersistenceGap {
        hash: TxHash,
        #[source]
        source: store::Error,
    },
    #[error("another tick is in progress")]
    TickInProgress,
}

/// Summary of a completed tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Validators processed.
    pub validators: usize,
    /// Boosts queued.
    pub queued: usize,
    /// Boosts activated.
    pub activated: usize,
}

/// Something that can run a tick on demand.
pub trait Trigger: Send + Sync + 'static {
    fn trigger(&self) -> BoxFuture<'_, Result<Report, Error>>;
}
