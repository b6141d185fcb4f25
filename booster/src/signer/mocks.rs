//! In-memory key material for tests.

use super::{Error, Local, Vault};
use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use std::{collections::HashMap, str::FromStr};
use zeroize::Zeroizing;

/// Well-known development key (address `0xf39F...2266`).
pub const OPERATOR_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Second well-known development key (address `0x7099...79C8`).
pub const OTHER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// Returns the address controlled by `key`.
///
/// # Panics
///
/// Panics if `key` is not a valid private key.
pub fn address(key: &str) -> Address {
    PrivateKeySigner::from_str(key)
        .expect("invalid private key")
        .address()
}

/// A [Vault] holding keys in memory.
#[derive(Clone, Default)]
pub struct Keys {
    keys: HashMap<Address, Zeroizing<String>>,
}

impl Keys {
    /// Stores `key` under `address` (without checking that they match).
    pub fn with(mut self, address: Address, key: &str) -> Self {
        self.keys.insert(address, Zeroizing::new(key.to_string()));
        self
    }
}

impl Vault for Keys {
    async fn private_key(&self, address: Address) -> Result<Zeroizing<String>, Error> {
        self.keys
            .get(&address)
            .cloned()
            .ok_or(Error::MissingKey(address))
    }
}

/// A local signer that knows each of `keys`.
pub fn signer(keys: &[&str]) -> Local<Keys> {
    let keys = keys
        .iter()
        .fold(Keys::default(), |vault, key| vault.with(address(key), key));
    Local::new(keys)
}
