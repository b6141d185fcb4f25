//! Turn a [chain::Intent] into a raw signed transaction.
//!
//! Two providers are supported:
//!
//! * [Remote]: forwards the transaction to a JSON-RPC signing service (`eth_signTransaction`).
//! * [Local]: fetches the operator's encrypted key from a [Vault] (normally [Infisical]),
//!   decrypts it, and signs in-process.
//!
//! The provider is picked once at startup (see [Provider]) and never changes while running.

use crate::{chain::Intent, http};
use alloy::{
    consensus::TxEnvelope,
    eips::eip2718::Decodable2718,
    primitives::{Address, Bytes},
};
use std::future::Future;
use thiserror::Error;

mod infisical;
pub use infisical::{Infisical, Settings as InfisicalSettings};
mod local;
pub use local::{Local, Vault};
pub mod mocks;
mod remote;
pub use remote::Remote;

/// Errors that can occur when signing a transaction.
#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("signer error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("no key found for {0}")]
    MissingKey(Address),
    #[error("invalid private key for {0}")]
    InvalidKey(Address),
    #[error("signed by {actual}, expected {expected}")]
    AddressMismatch { expected: Address, actual: Address },
    #[error("signing failed: {0}")]
    Signing(#[from] alloy::signers::Error),
}

/// Signs transactions on behalf of operators.
pub trait Signer: Send + Sync + 'static {
    /// Returns the EIP-2718 encoding of `intent` signed by `from`.
    fn sign(
        &self,
        from: Address,
        intent: &Intent,
    ) -> impl Future<Output = Result<Bytes, Error>> + Send;
}

/// The configured signing provider.
pub enum Provider {
    Remote(Remote),
    Local(Local<Infisical>),
}

impl Signer for Provider {
    async fn sign(&self, from: Address, intent: &Intent) -> Result<Bytes, Error> {
        match self {
            Self::Remote(remote) => remote.sign(from, intent).await,
            Self::Local(local) => local.sign(from, intent).await,
        }
    }
}

/// Recovers the sender of a raw signed transaction.
pub fn recover(raw: &[u8]) -> Result<Address, Error> {
    let mut buf = raw;
    let envelope =
        TxEnvelope::decode_2718(&mut buf).map_err(|e| Error::Malformed(e.to_string()))?;
    let TxEnvelope::Eip1559(signed) = envelope else {
        return Err(Error::Malformed("expected an eip-1559 transaction".into()));
    };
    signed
        .signature()
        .recover_address_from_prehash(&signed.signature_hash())
        .map_err(|e| Error::Malformed(e.to_string()))
}
