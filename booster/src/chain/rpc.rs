//! [Client] backed by an execution-layer node's JSON-RPC endpoint.

use super::{Client, Error, Receipt};
use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, Bytes, TxHash},
    providers::{Provider, RootProvider},
    rpc::types::TransactionRequest,
    transports::{http::reqwest::Url, TransportError},
};

/// Messages nodes use to reject a transaction that is already in their pool.
const ALREADY_KNOWN: [&str; 3] = ["already known", "known transaction", "already imported"];

fn already_known(err: &TransportError) -> bool {
    err.as_error_resp().is_some_and(|payload| {
        let message = payload.message.to_lowercase();
        ALREADY_KNOWN.iter().any(|known| message.contains(known))
    })
}

/// HTTP JSON-RPC client.
#[derive(Clone)]
pub struct Rpc {
    provider: RootProvider,
}

impl Rpc {
    pub fn new(url: &str) -> Result<Self, Error> {
        let url: Url = url.parse().map_err(|_| Error::InvalidUrl(url.to_string()))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
        })
    }
}

impl Client for Rpc {
    async fn block_number(&self) -> Result<u64, Error> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_timestamp(&self, height: u64) -> Result<u64, Error> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height))
            .await?
            .ok_or(Error::BlockMissing(height))?;
        Ok(block.header.timestamp)
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, Error> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn gas_price(&self) -> Result<u128, Error> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn max_priority_fee(&self) -> Result<u128, Error> {
        Ok(self.provider.get_max_priority_fee_per_gas().await?)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Error> {
        let request = TransactionRequest::default().to(to).input(data.into());
        Ok(self.provider.call(request).await?)
    }

    async fn send_raw(&self, raw: Bytes) -> Result<(), Error> {
        match self.provider.send_raw_transaction(&raw).await {
            Ok(_) => Ok(()),
            Err(err) if already_known(&err) => Err(Error::AlreadyKnown),
            Err(err) => Err(err.into()),
        }
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, Error> {
        let Some(receipt) = self.provider.get_transaction_receipt(hash).await? else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        Ok(Some(Receipt {
            hash,
            success: receipt.status(),
            block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;

    fn error_resp(message: &str) -> TransportError {
        let payload: ErrorPayload =
            serde_json::from_value(serde_json::json!({ "code": -32000, "message": message }))
                .unwrap();
        TransportError::ErrorResp(payload)
    }

    #[test]
    fn test_already_known_detection() {
        assert!(already_known(&error_resp("already known")));
        assert!(already_known(&error_resp("Known transaction: 0xabc")));
        assert!(!already_known(&error_resp("nonce too low")));
        assert!(!already_known(&TransportError::local_usage_str("already known")));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(Rpc::new("not a url"), Err(Error::InvalidUrl(_))));
        assert!(Rpc::new("http://127.0.0.1:8545").is_ok());
    }
}
