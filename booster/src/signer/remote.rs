use super::{recover, Error, Signer};
use crate::{chain::Intent, http};
use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Serialize)]
struct Request {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [Transaction; 1],
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Transaction {
    from: String,
    to: String,
    gas: String,
    max_fee_per_gas: String,
    max_priority_fee_per_gas: String,
    value: String,
    nonce: String,
    /// Hex without a `0x` prefix.
    data: String,
}

impl Transaction {
    fn new(from: Address, intent: &Intent) -> Self {
        Self {
            from: from.to_checksum(None),
            to: intent.to.to_checksum(None),
            gas: format!("{:#x}", intent.gas_limit),
            max_fee_per_gas: format!("{:#x}", intent.max_fee_per_gas),
            max_priority_fee_per_gas: format!("{:#x}", intent.max_priority_fee_per_gas),
            value: format!("{:#x}", intent.value),
            nonce: format!("{:#x}", intent.nonce),
            data: alloy::hex::encode(&intent.input),
        }
    }
}

#[derive(Deserialize)]
struct Response {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Delegates signing to a JSON-RPC service exposing `eth_signTransaction`.
pub struct Remote {
    http: http::Client,
    url: String,
    id: AtomicU64,
}

impl Remote {
    pub fn new(http: http::Client, url: String) -> Self {
        Self {
            http,
            url,
            id: AtomicU64::new(1),
        }
    }
}

impl Signer for Remote {
    async fn sign(&self, from: Address, intent: &Intent) -> Result<Bytes, Error> {
        let request = Request {
            jsonrpc: "2.0",
            id: self.id.fetch_add(1, Ordering::Relaxed),
            method: "eth_signTransaction",
            params: [Transaction::new(from, intent)],
        };
        let body = self.http.post(&self.url, &[], &request).await?;
        let response: Response =
            serde_json::from_slice(&body).map_err(|e| Error::Malformed(e.to_string()))?;
        if let Some(RpcError { code, message }) = response.error {
            return Err(Error::Rpc { code, message });
        }
        let result = response
            .result
            .ok_or_else(|| Error::Malformed("missing result".into()))?;
        let raw = alloy::hex::decode(result.trim()).map_err(|e| Error::Malformed(e.to_string()))?;

        // Never hand the gateway a transaction from the wrong account
        let actual = recover(&raw)?;
        if actual != from {
            return Err(Error::AddressMismatch {
                expected: from,
                actual,
            });
        }
        debug!(%from, nonce = intent.nonce, "signed transaction remotely");
        Ok(raw.into())
    }
}
