//! A simulated node running the BGT contract.
//!
//! Every accepted transaction is mined immediately into its own block. The contract enforces the
//! same rules as the deployed one: `queueBoost` moves unboosted balance into the sender's queue
//! and `activateBoost` succeeds only once more than `activateBoostDelay` blocks have passed.

use super::{contract::BGT, Client, Error, Receipt};
use crate::types::BoostQueue;
use alloy::{
    consensus::{Signed, TxEip1559, TxEnvelope},
    eips::eip2718::Decodable2718,
    primitives::{address, Address, Bytes, TxHash, TxKind, U256},
    sol_types::{SolInterface, SolValue},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Chain id reported by the simulated node.
pub const CHAIN_ID: u64 = 80094;

/// Timestamp of block 0. Block `n` is `n` seconds later.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Gas charged for every transaction.
pub const GAS_USED: u64 = 21_000;

/// Address of the simulated BGT contract.
pub const CONTRACT: Address = address!("656b95E550C07a9ffe548bd4085c72418Ceb1dba");

/// A contract call that was mined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    QueueBoost {
        from: Address,
        pubkey: Bytes,
        amount: U256,
        success: bool,
    },
    ActivateBoost {
        from: Address,
        operator: Address,
        pubkey: Bytes,
        success: bool,
    },
    Other {
        from: Address,
    },
}

struct State {
    block: u64,
    delay: u32,
    gas_price: u128,
    tip: u128,

    unboosted: HashMap<Address, U256>,
    queued: HashMap<(Address, Bytes), BoostQueue>,
    boosted: HashMap<(Address, Bytes), U256>,
    nonces: HashMap<Address, u64>,

    pool: HashMap<TxHash, (Address, Signed<TxEip1559>)>,
    receipts: HashMap<TxHash, Receipt>,
    calls: Vec<Call>,

    failures: u32,
    hold: bool,
    revert: bool,
    broadcasts: usize,
}

impl State {
    fn mine(&mut self, from: Address, signed: &Signed<TxEip1559>) {
        self.block += 1;
        *self.nonces.entry(from).or_default() += 1;
        let tx = signed.tx();
        let success = if self.revert {
            self.revert = false;
            false
        } else {
            let call = self.execute(from, &tx.input);
            let success = match &call {
                Call::QueueBoost { success, .. } | Call::ActivateBoost { success, .. } => *success,
                Call::Other { .. } => false,
            };
            self.calls.push(call);
            success
        };
        let hash = *signed.hash();
        self.receipts.insert(
            hash,
            Receipt {
                hash,
                success,
                block_number: self.block,
                gas_used: GAS_USED,
                effective_gas_price: tx.max_fee_per_gas,
            },
        );
    }

    fn execute(&mut self, from: Address, input: &Bytes) -> Call {
        match BGT::BGTCalls::abi_decode(input) {
            Ok(BGT::BGTCalls::queueBoost(call)) => {
                let available = self.unboosted.entry(from).or_default();
                let success = !call.amount.is_zero() && *available >= call.amount;
                if success {
                    *available -= call.amount;
                    let queue = self
                        .queued
                        .entry((from, call.pubkey.clone()))
                        .or_default();
                    queue.block_number = self.block;
                    queue.balance += call.amount;
                }
                Call::QueueBoost {
                    from,
                    pubkey: call.pubkey,
                    amount: call.amount,
                    success,
                }
            }
            Ok(BGT::BGTCalls::activateBoost(call)) => {
                let key = (call.operator, call.pubkey.clone());
                let queue = self.queued.get(&key).copied().unwrap_or_default();
                let success = !queue.balance.is_zero()
                    && self.block.saturating_sub(queue.block_number) > u64::from(self.delay);
                if success {
                    self.queued.remove(&key);
                    *self.boosted.entry(key).or_default() += queue.balance;
                }
                Call::ActivateBoost {
                    from,
                    operator: call.operator,
                    pubkey: call.pubkey,
                    success,
                }
            }
            _ => Call::Other { from },
        }
    }
}

/// Simulated node implementing [Client].
#[derive(Clone)]
pub struct Chain {
    state: Arc<Mutex<State>>,
}

impl Chain {
    /// Creates a chain at block 0 whose contract enforces `delay` blocks between queue and
    /// activation.
    pub fn new(delay: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                block: 0,
                delay,
                gas_price: 1_000_000_000,
                tip: 1_000_000,
                unboosted: HashMap::new(),
                queued: HashMap::new(),
                boosted: HashMap::new(),
                nonces: HashMap::new(),
                pool: HashMap::new(),
                receipts: HashMap::new(),
                calls: Vec::new(),
                failures: 0,
                hold: false,
                revert: false,
                broadcasts: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes one injected failure, if any.
    fn fault(&self) -> Result<MutexGuard<'_, State>, Error> {
        let mut state = self.state();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(Error::Unavailable("injected failure".into()));
        }
        Ok(state)
    }

    pub fn contract(&self) -> Address {
        CONTRACT
    }

    pub fn set_block(&self, block: u64) {
        self.state().block = block;
    }

    pub fn advance(&self, blocks: u64) {
        self.state().block += blocks;
    }

    pub fn set_delay(&self, delay: u32) {
        self.state().delay = delay;
    }

    pub fn set_fees(&self, gas_price: u128, tip: u128) {
        let mut state = self.state();
        state.gas_price = gas_price;
        state.tip = tip;
    }

    pub fn set_unboosted(&self, operator: Address, balance: U256) {
        self.state().unboosted.insert(operator, balance);
    }

    /// Overrides the queue entry of `(operator, pubkey)`.
    pub fn set_queue(&self, operator: Address, pubkey: &Bytes, block_number: u64, balance: U256) {
        self.state().queued.insert(
            (operator, pubkey.clone()),
            BoostQueue {
                block_number,
                balance,
            },
        );
    }

    /// Fails the next `n` node requests with [Error::Unavailable].
    pub fn fail_next(&self, n: u32) {
        self.state().failures = n;
    }

    pub fn failures_remaining(&self) -> u32 {
        self.state().failures
    }

    /// Makes the next mined transaction revert without touching contract state.
    pub fn revert_next(&self) {
        self.state().revert = true;
    }

    /// Keeps the next broadcast transaction in the pool until it is broadcast again.
    pub fn hold_next_broadcast(&self) {
        self.state().hold = true;
    }

    pub fn unboosted(&self, operator: Address) -> U256 {
        self.state()
            .unboosted
            .get(&operator)
            .copied()
            .unwrap_or_default()
    }

    pub fn queue(&self, operator: Address, pubkey: &Bytes) -> BoostQueue {
        self.state()
            .queued
            .get(&(operator, pubkey.clone()))
            .copied()
            .unwrap_or_default()
    }

    pub fn boosted(&self, operator: Address, pubkey: &Bytes) -> U256 {
        self.state()
            .boosted
            .get(&(operator, pubkey.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Every mined contract call, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn broadcasts(&self) -> usize {
        self.state().broadcasts
    }

    pub fn mined(&self) -> usize {
        self.state().receipts.len()
    }
}

impl Client for Chain {
    async fn block_number(&self) -> Result<u64, Error> {
        Ok(self.fault()?.block)
    }

    async fn block_timestamp(&self, height: u64) -> Result<u64, Error> {
        let state = self.fault()?;
        if height > state.block {
            return Err(Error::BlockMissing(height));
        }
        Ok(GENESIS_TIMESTAMP + height)
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        self.fault()?;
        Ok(CHAIN_ID)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, Error> {
        let state = self.fault()?;
        let mined = state.nonces.get(&address).copied().unwrap_or_default();
        let pending = state
            .pool
            .values()
            .filter(|(from, _)| *from == address)
            .count() as u64;
        Ok(mined + pending)
    }

    async fn gas_price(&self) -> Result<u128, Error> {
        Ok(self.fault()?.gas_price)
    }

    async fn max_priority_fee(&self) -> Result<u128, Error> {
        Ok(self.fault()?.tip)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Error> {
        let state = self.fault()?;
        if to != CONTRACT {
            return Ok(Bytes::new());
        }
        let output = match BGT::BGTCalls::abi_decode(&data) {
            Ok(BGT::BGTCalls::activateBoostDelay(_)) => state.delay.abi_encode(),
            Ok(BGT::BGTCalls::unboostedBalanceOf(call)) => state
                .unboosted
                .get(&call.account)
                .copied()
                .unwrap_or_default()
                .abi_encode(),
            Ok(BGT::BGTCalls::boostedQueue(call)) => {
                let queue = state
                    .queued
                    .get(&(call.operator, call.pubkey))
                    .copied()
                    .unwrap_or_default();
                let block = u32::try_from(queue.block_number).unwrap_or(u32::MAX);
                (block, queue.balance).abi_encode_params()
            }
            _ => Vec::new(),
        };
        Ok(output.into())
    }

    async fn send_raw(&self, raw: Bytes) -> Result<(), Error> {
        let mut state = self.fault()?;
        state.broadcasts += 1;

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| Error::Rejected(e.to_string()))?;
        let TxEnvelope::Eip1559(signed) = envelope else {
            return Err(Error::Rejected("unsupported transaction type".into()));
        };
        let hash = *signed.hash();
        if state.receipts.contains_key(&hash) {
            return Err(Error::AlreadyKnown);
        }
        if let Some((from, signed)) = state.pool.remove(&hash) {
            state.mine(from, &signed);
            return Err(Error::AlreadyKnown);
        }

        let from = signed
            .signature()
            .recover_address_from_prehash(&signed.signature_hash())
            .map_err(|e| Error::Rejected(e.to_string()))?;
        let tx = signed.tx();
        if tx.chain_id != CHAIN_ID {
            return Err(Error::Rejected(format!("invalid chain id {}", tx.chain_id)));
        }
        if tx.to != TxKind::Call(CONTRACT) {
            return Err(Error::Rejected("unexpected recipient".into()));
        }
        let expected = state.nonces.get(&from).copied().unwrap_or_default();
        if tx.nonce != expected {
            return Err(Error::Rejected(format!(
                "invalid nonce {} (expected {expected})",
                tx.nonce
            )));
        }

        if state.hold {
            state.hold = false;
            state.pool.insert(hash, (from, signed));
            return Ok(());
        }
        state.mine(from, &signed);
        Ok(())
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, Error> {
        Ok(self.fault()?.receipts.get(&hash).copied())
    }
}
