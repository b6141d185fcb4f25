//! Pure boost decisions. Nothing here reads the chain or the store.

use crate::types::{BoostQueue, InvalidConfig, Validator};
use alloy::primitives::{Address, Bytes, U256};
use serde::Serialize;

/// Everything the decisions depend on for one validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Whether the store holds an unactivated queue boost for the validator.
    pub pending_queue_boost: bool,
    /// Operator balance not yet committed to any boost.
    pub unboosted_balance: U256,
    /// Queue entry of the operator/validator pair.
    pub queue: BoostQueue,
    pub current_block: u64,
    /// Blocks required between queue and activation.
    pub activation_delay: u64,
}

/// A contract call the orchestrator should make.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    QueueBoost { pubkey: Bytes, amount: U256 },
    #[serde(rename_all = "camelCase")]
    ActivateBoost { operator: Address, pubkey: Bytes },
}

/// Returns the amount to queue, if any.
///
/// Nothing is queued while a previous boost awaits activation, and the balance must strictly
/// exceed the threshold.
pub fn decide_queue(pending: bool, unboosted_balance: U256, threshold: U256) -> Option<U256> {
    if pending || unboosted_balance <= threshold {
        return None;
    }
    Some(unboosted_balance)
}

/// Whether a queued boost can be activated at `current_block`.
pub fn decide_activate(queue: &BoostQueue, current_block: u64, activation_delay: u64) -> bool {
    !queue.balance.is_zero()
        && current_block.saturating_sub(queue.block_number) > activation_delay
}

/// Returns the calls to make for `validator`, queue first.
///
/// The threshold is only parsed when queueing is possible at all.
pub fn decide_actions(
    validator: &Validator,
    observation: &Observation,
) -> Result<Vec<Action>, InvalidConfig> {
    let operator = validator.operator()?;
    let pubkey = validator.pubkey_bytes()?;
    let mut actions = Vec::new();
    if !observation.pending_queue_boost {
        let threshold = validator.threshold()?;
        if let Some(amount) = decide_queue(false, observation.unboosted_balance, threshold) {
            actions.push(Action::QueueBoost {
                pubkey: pubkey.clone(),
                amount,
            });
        }
    }
    if decide_activate(
        &observation.queue,
        observation.current_block,
        observation.activation_delay,
    ) {
        actions.push(Action::ActivateBoost { operator, pubkey });
    }
    Ok(actions)
}
