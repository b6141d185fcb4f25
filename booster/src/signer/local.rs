use super::{Error, Signer};
use crate::chain::Intent;
use alloy::{
    consensus::{SignableTransaction, TxEnvelope},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Address, Bytes},
    signers::local::PrivateKeySigner,
};
use std::{future::Future, str::FromStr};
use tracing::debug;
use zeroize::Zeroizing;

/// Source of operator private keys.
pub trait Vault: Send + Sync + 'static {
    /// Returns the hex-encoded private key of `address`.
    fn private_key(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Zeroizing<String>, Error>> + Send;
}

/// Signs in-process with keys fetched from a [Vault] on every request.
pub struct Local<V: Vault> {
    vault: V,
}

impl<V: Vault> Local<V> {
    pub fn new(vault: V) -> Self {
        Self { vault }
    }
}

impl<V: Vault> Signer for Local<V> {
    async fn sign(&self, from: Address, intent: &Intent) -> Result<Bytes, Error> {
        let key = self.vault.private_key(from).await?;
        let signer = PrivateKeySigner::from_str(key.trim()).map_err(|_| Error::InvalidKey(from))?;
        drop(key);
        if signer.address() != from {
            return Err(Error::AddressMismatch {
                expected: from,
                actual: signer.address(),
            });
        }

        let mut tx = intent.to_eip1559();
        let signature = signer.sign_transaction_sync(&mut tx)?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        debug!(%from, nonce = intent.nonce, "signed transaction locally");
        Ok(envelope.encoded_2718().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{
        mocks::{address, signer, Keys, OPERATOR_KEY, OTHER_KEY},
        recover,
    };
    use alloy::primitives::U256;

    fn intent() -> Intent {
        Intent {
            chain_id: 1,
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 10,
            max_priority_fee_per_gas: 1,
            to: Address::repeat_byte(0xbe),
            value: U256::ZERO,
            input: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_sign() {
        let from = address(OPERATOR_KEY);
        let raw = signer(&[OPERATOR_KEY]).sign(from, &intent()).await.unwrap();
        assert_eq!(raw[0], 0x02);
        assert_eq!(recover(&raw).unwrap(), from);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let err = signer(&[OTHER_KEY])
            .sign(address(OPERATOR_KEY), &intent())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey(_)));
    }

    #[tokio::test]
    async fn test_key_for_wrong_address() {
        // Vault misfiled the other key under the operator's address
        let from = address(OPERATOR_KEY);
        let keys = Keys::default().with(from, OTHER_KEY);
        let err = Local::new(keys).sign(from, &intent()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::AddressMismatch { expected, actual }
                if expected == from && actual == address(OTHER_KEY)
        ));
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let from = address(OPERATOR_KEY);
        let keys = Keys::default().with(from, "0xnotakey");
        let err = Local::new(keys).sign(from, &intent()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
