//! Reads BGT contract state and submits signed transactions.
//!
//! [Client] is the minimal set of node operations the booster needs. [Gateway] layers the
//! contract ABI, fee suggestion, confirmation polling, and [retry::Policy] on top of it. Every
//! read is retried on its own. Broadcasting is retried as a whole (check receipt, send, wait),
//! which is safe because a signed transaction always has the same hash.

use crate::{
    retry,
    types::{self, BoostQueue, TransactionInfo},
};
use alloy::{
    consensus::{TxEip1559, TxEnvelope},
    eips::eip2718::{Decodable2718, Eip2718Error},
    primitives::{Address, Bytes, TxHash, TxKind, U256},
    sol_types::SolCall,
    transports::TransportError,
};
use chrono::{DateTime, Utc};
use std::{future::Future, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

pub mod contract;
pub mod mocks;
mod rpc;
pub use rpc::Rpc;

use contract::BGT;

/// Errors that can occur when interacting with the chain.
#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc error: {0}")]
    Rpc(#[from] TransportError),
    #[error("node unavailable: {0}")]
    Unavailable(String),
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),
    #[error("block {0} not found")]
    BlockMissing(u64),
    #[error("transaction already known")]
    AlreadyKnown,
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("failed to decode {method} result: {source}")]
    Decode {
        method: &'static str,
        source: alloy::sol_types::Error,
    },
    #[error("invalid signed transaction: {0}")]
    InvalidTransaction(Eip2718Error),
    #[error("transaction {0} not confirmed in time")]
    Unconfirmed(TxHash),
    #[error("transaction {0} failed")]
    TransactionFailed(TxHash),
}

impl Error {
    /// Whether repeating the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc(err) => !err.is_error_resp(),
            Self::Unavailable(_) | Self::BlockMissing(_) | Self::Unconfirmed(_) => true,
            _ => false,
        }
    }
}

fn classify(err: Error) -> retry::Error<Error> {
    if err.is_transient() {
        retry::Error::Transient(err)
    } else {
        retry::Error::Permanent(err)
    }
}

/// Receipt of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub hash: TxHash,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

/// Node operations used by the [Gateway].
pub trait Client: Clone + Send + Sync + 'static {
    /// Height of the latest block.
    fn block_number(&self) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Unix timestamp (seconds) of the block at `height`.
    fn block_timestamp(&self, height: u64) -> impl Future<Output = Result<u64, Error>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Next nonce for `address`, including pending transactions.
    fn pending_nonce(&self, address: Address) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Suggested gas price (used as the max fee per gas).
    fn gas_price(&self) -> impl Future<Output = Result<u128, Error>> + Send;

    /// Suggested priority fee (tip).
    fn max_priority_fee(&self) -> impl Future<Output = Result<u128, Error>> + Send;

    /// Executes a read-only call against the latest block.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes, Error>> + Send;

    /// Broadcasts a signed transaction.
    ///
    /// Returns [Error::AlreadyKnown] if the node already holds the transaction.
    fn send_raw(&self, raw: Bytes) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the receipt of a mined transaction, or `None` if it is not mined yet.
    fn receipt(&self, hash: TxHash) -> impl Future<Output = Result<Option<Receipt>, Error>> + Send;
}

/// An unsigned EIP-1559 transaction, ready to be handed to a signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intent {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

impl Intent {
    pub fn to_eip1559(&self) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            to: TxKind::Call(self.to),
            value: self.value,
            access_list: Default::default(),
            input: self.input.clone(),
        }
    }
}

/// Configuration for the [Gateway].
#[derive(Clone, Debug)]
pub struct Config {
    /// Address of the BGT contract.
    pub contract: Address,
    /// Gas limit set on every transaction.
    pub gas_limit: u64,
    pub policy: retry::Policy,
    /// Delay between receipt polls while waiting for a transaction to be mined.
    pub poll_interval: Duration,
    /// How long to wait for a receipt before broadcasting again.
    pub confirmation_timeout: Duration,
}

/// Contract-aware, retrying view of the chain.
pub struct Gateway<C: Client> {
    client: C,
    cfg: Config,
}

impl<C: Client> Gateway<C> {
    pub fn new(client: C, cfg: Config) -> Self {
        Self { client, cfg }
    }

    pub fn contract(&self) -> Address {
        self.cfg.contract
    }

    async fn retry<T, F, Fut>(&self, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.cfg
            .policy
            .retry(|| {
                let fut = operation();
                async move { fut.await.map_err(classify) }
            })
            .await
    }

    async fn call<T: SolCall>(&self, call: T) -> Result<T::Return, Error> {
        let data = Bytes::from(call.abi_encode());
        let contract = self.cfg.contract;
        let output = self
            .retry(|| self.client.call(contract, data.clone()))
            .await?;
        T::abi_decode_returns(&output).map_err(|source| Error::Decode {
            method: T::SIGNATURE,
            source,
        })
    }

    pub async fn latest_block(&self) -> Result<u64, Error> {
        self.retry(|| self.client.block_number()).await
    }

    pub async fn block_timestamp(&self, height: u64) -> Result<DateTime<Utc>, Error> {
        let seconds = self.retry(|| self.client.block_timestamp(height)).await?;
        i64::try_from(seconds)
            .ok()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .ok_or(Error::BlockMissing(height))
    }

    /// Minimum number of blocks between queueing and activating a boost.
    pub async fn activate_boost_delay(&self) -> Result<u64, Error> {
        let delay = self.call(BGT::activateBoostDelayCall {}).await?;
        Ok(delay.into())
    }

    pub async fn unboosted_balance(&self, operator: Address) -> Result<U256, Error> {
        self.call(BGT::unboostedBalanceOfCall { account: operator })
            .await
    }

    pub async fn boosted_queue(&self, operator: Address, pubkey: &Bytes) -> Result<BoostQueue, Error> {
        let queue = self
            .call(BGT::boostedQueueCall {
                operator,
                pubkey: pubkey.clone(),
            })
            .await?;
        Ok(BoostQueue {
            block_number: queue.blockNumber.into(),
            balance: queue.balance,
        })
    }

    /// Builds an unsigned transaction with a fresh nonce and fee suggestions.
    pub async fn create_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<Intent, Error> {
        let (chain_id, nonce, gas_price, tip) = self
            .retry(|| async move {
                let chain_id = self.client.chain_id().await?;
                let nonce = self.client.pending_nonce(from).await?;
                let gas_price = self.client.gas_price().await?;
                let tip = self.client.max_priority_fee().await?;
                Ok((chain_id, nonce, gas_price, tip))
            })
            .await?;

        // The tip can never exceed the fee cap
        let intent = Intent {
            chain_id,
            nonce,
            gas_limit: self.cfg.gas_limit,
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: tip.min(gas_price),
            to,
            value: U256::ZERO,
            input: data,
        };
        debug!(?from, nonce, gas_price, tip, "created transaction");
        Ok(intent)
    }

    /// Broadcasts a signed transaction and waits until it is mined.
    ///
    /// Fails with [Error::TransactionFailed] (not retried) if the receipt reports a revert.
    pub async fn send_transaction(&self, raw: &Bytes) -> Result<TransactionInfo, Error> {
        let envelope =
            TxEnvelope::decode_2718(&mut raw.as_ref()).map_err(Error::InvalidTransaction)?;
        let hash = *envelope.tx_hash();
        info!(%hash, "sending transaction");
        let receipt = self
            .cfg
            .policy
            .retry(|| async move { self.broadcast(hash, raw).await.map_err(classify) })
            .await?;
        if !receipt.success {
            return Err(Error::TransactionFailed(hash));
        }
        info!(%hash, block = receipt.block_number, "transaction mined");

        let block_timestamp = self.block_timestamp(receipt.block_number).await?;
        Ok(TransactionInfo {
            hash,
            block_number: receipt.block_number,
            block_timestamp,
            fee: types::fee(receipt.gas_used, receipt.effective_gas_price),
        })
    }

    async fn broadcast(&self, hash: TxHash, raw: &Bytes) -> Result<Receipt, Error> {
        // An earlier attempt may have been mined already
        if let Some(receipt) = self.client.receipt(hash).await? {
            return Ok(receipt);
        }
        match self.client.send_raw(raw.clone()).await {
            Ok(()) => {}
            Err(Error::AlreadyKnown) => debug!(%hash, "transaction already known"),
            Err(err) => return Err(err),
        }
        self.confirm(hash).await
    }

    async fn confirm(&self, hash: TxHash) -> Result<Receipt, Error> {
        let deadline = Instant::now() + self.cfg.confirmation_timeout;
        loop {
            if let Some(receipt) = self.client.receipt(hash).await? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(Error::Unconfirmed(hash));
            }
            tokio::time::sleep(self.cfg.poll_interval).await;
        }
    }
}
