use super::{
    decide::{decide_actions, decide_activate, decide_queue, Action, Observation},
    metrics::{Metrics, Status},
    Error, Report, Trigger,
};
use crate::{
    chain::{contract, Client, Gateway},
    signer::Signer,
    store::{self, Store},
    types::{ActivateBoost, QueueBoost, TransactionInfo, Validator},
};
use alloy::primitives::{Address, Bytes, TxHash};
use futures::{future::BoxFuture, FutureExt};
use prometheus_client::registry::Registry;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Planned calls for one validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub pubkey: String,
    pub actions: Vec<Action>,
}

/// Runs ticks against a chain, a store, and a signer.
pub struct Orchestrator<C: Client, S: Store, P: Signer> {
    gateway: Gateway<C>,
    store: S,
    signer: P,
    metrics: Metrics,
    lock: Mutex<()>,
}

impl<C: Client, S: Store, P: Signer> Orchestrator<C, S, P> {
    pub fn new(gateway: Gateway<C>, store: S, signer: P, registry: &mut Registry) -> Self {
        Self {
            gateway,
            store,
            signer,
            metrics: Metrics::init(registry),
            lock: Mutex::new(()),
        }
    }

    /// Processes every validator through both phases.
    pub async fn run_tick(&self) -> Result<Report, Error> {
        let Ok(_guard) = self.lock.try_lock() else {
            self.metrics.tick(Status::Skipped);
            return Err(Error::TickInProgress);
        };
        let result = self.tick().await;
        match &result {
            Ok(report) => {
                self.metrics.tick(Status::Success);
                info!(
                    validators = report.validators,
                    queued = report.queued,
                    activated = report.activated,
                    "tick complete"
                );
            }
            Err(_) => self.metrics.tick(Status::Failure),
        }
        result
    }

    async fn tick(&self) -> Result<Report, Error> {
        let validators = self.store.validators().await?;
        self.metrics.validators.set(validators.len() as i64);
        let mut report = Report {
            validators: validators.len(),
            ..Default::default()
        };
        for validator in &validators {
            if self.queue(validator).await? {
                report.queued += 1;
            }
            if self.activate(validator).await? {
                report.activated += 1;
            }
        }
        Ok(report)
    }

    /// Phase A. Returns whether a boost was queued.
    async fn queue(&self, validator: &Validator) -> Result<bool, Error> {
        if self.store.queue_boost_exists(&validator.pubkey).await? {
            debug!(pubkey = %validator.pubkey, "queue boost pending, skipping queue");
            return Ok(false);
        }
        let operator = validator.operator()?;
        let pubkey = validator.pubkey_bytes()?;
        let unboosted = self.gateway.unboosted_balance(operator).await?;
        let threshold = validator.threshold()?;
        let Some(amount) = decide_queue(false, unboosted, threshold) else {
            debug!(pubkey = %validator.pubkey, %unboosted, %threshold, "below threshold");
            return Ok(false);
        };

        info!(pubkey = %validator.pubkey, %operator, %amount, "queueing boost");
        let tx = self
            .submit(operator, contract::queue_boost(pubkey, amount))
            .await?;
        let record = QueueBoost {
            validator_pubkey: validator.pubkey.clone(),
            operator_address: validator.operator_address.clone(),
            amount: amount.to_string(),
            transaction_hash: tx.hash.to_string(),
            block_number: tx.block_number,
            block_timestamp: tx.block_timestamp,
            fee: tx.fee,
            transaction_from: operator.to_string(),
            to_contract: self.gateway.contract().to_string(),
            activated: false,
        };
        self.store
            .add_queue_boost(record)
            .await
            .map_err(|source| self.gap(tx.hash, source))?;
        self.metrics.queued.inc();
        info!(
            pubkey = %validator.pubkey,
            hash = %tx.hash,
            block = tx.block_number,
            fee = tx.fee,
            "queued boost"
        );
        Ok(true)
    }

    /// Phase B. Returns whether a boost was activated.
    async fn activate(&self, validator: &Validator) -> Result<bool, Error> {
        let operator = validator.operator()?;
        let pubkey = validator.pubkey_bytes()?;
        let queue = self.gateway.boosted_queue(operator, &pubkey).await?;
        if queue.balance.is_zero() {
            self.retire_stale(validator).await?;
            return Ok(false);
        }
        let delay = self.gateway.activate_boost_delay().await?;
        let current = self.gateway.latest_block().await?;
        if !decide_activate(&queue, current, delay) {
            debug!(
                pubkey = %validator.pubkey,
                balance = %queue.balance,
                queued_at = queue.block_number,
                current,
                delay,
                "not ready to activate"
            );
            return Ok(false);
        }
        let pending = self.store.pending_queue_boost(&validator.pubkey).await?;

        info!(pubkey = %validator.pubkey, %operator, balance = %queue.balance, "activating boost");
        let tx = self
            .submit(operator, contract::activate_boost(operator, pubkey))
            .await?;
        let record = ActivateBoost {
            validator_pubkey: validator.pubkey.clone(),
            operator_address: validator.operator_address.clone(),
            amount: queue.balance.to_string(),
            transaction_hash: tx.hash.to_string(),
            block_number: tx.block_number,
            block_timestamp: tx.block_timestamp,
            fee: tx.fee,
            transaction_from: operator.to_string(),
            to_contract: self.gateway.contract().to_string(),
        };
        self.store
            .add_activate_boost(record)
            .await
            .map_err(|source| self.gap(tx.hash, source))?;
        match pending {
            Some(queued) => self
                .store
                .mark_activated(&queued.transaction_hash)
                .await
                .map_err(|source| self.gap(tx.hash, source))?,
            None => warn!(
                pubkey = %validator.pubkey,
                hash = %tx.hash,
                "activated boost has no pending queue boost record"
            ),
        }
        self.metrics.activated.inc();
        info!(
            pubkey = %validator.pubkey,
            hash = %tx.hash,
            block = tx.block_number,
            fee = tx.fee,
            "activated boost"
        );
        Ok(true)
    }

    /// Flags a pending queue boost as activated when the contract no longer holds it.
    ///
    /// The queue was cancelled or activated by someone else. Leaving the record pending would
    /// block every later queue for the validator.
    async fn retire_stale(&self, validator: &Validator) -> Result<(), Error> {
        let Some(stale) = self.store.pending_queue_boost(&validator.pubkey).await? else {
            return Ok(());
        };
        warn!(
            pubkey = %validator.pubkey,
            hash = %stale.transaction_hash,
            amount = %stale.amount,
            "pending queue boost no longer held by contract, retiring record"
        );
        self.store.mark_activated(&stale.transaction_hash).await?;
        self.metrics.stale_records.inc();
        Ok(())
    }

    /// Builds, signs and broadcasts a call to the contract from `from`.
    async fn submit(&self, from: Address, data: Bytes) -> Result<TransactionInfo, Error> {
        let intent = self
            .gateway
            .create_transaction(from, self.gateway.contract(), data)
            .await?;
        let raw = self.signer.sign(from, &intent).await?;
        Ok(self.gateway.send_transaction(&raw).await?)
    }

    fn gap(&self, hash: TxHash, source: store::Error) -> Error {
        self.metrics.persistence_gaps.inc();
        error!(%hash, error = ?source, "confirmed transaction not recorded");
        Error::PersistenceGap { hash, source }
    }

    /// Reads the state the decisions for `validator` depend on.
    pub async fn observe(&self, validator: &Validator) -> Result<Observation, Error> {
        let operator = validator.operator()?;
        let pubkey = validator.pubkey_bytes()?;
        Ok(Observation {
            pending_queue_boost: self.store.queue_boost_exists(&validator.pubkey).await?,
            unboosted_balance: self.gateway.unboosted_balance(operator).await?,
            queue: self.gateway.boosted_queue(operator, &pubkey).await?,
            current_block: self.gateway.latest_block().await?,
            activation_delay: self.gateway.activate_boost_delay().await?,
        })
    }

    /// Returns what a tick would do right now, without signing or sending anything.
    pub async fn plan(&self) -> Result<Vec<Plan>, Error> {
        let mut plans = Vec::new();
        for validator in self.store.validators().await? {
            let observation = self.observe(&validator).await?;
            plans.push(Plan {
                actions: decide_actions(&validator, &observation)?,
                pubkey: validator.pubkey,
            });
        }
        Ok(plans)
    }
}

impl<C: Client, S: Store, P: Signer> Trigger for Orchestrator<C, S, P> {
    fn trigger(&self) -> BoxFuture<'_, Result<Report, Error>> {
        self.run_tick().boxed()
    }
}
