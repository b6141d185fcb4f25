//! Validator configuration, boost records, and on-chain boost state.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// One whole token (10^18 base units). Thresholds below this are rejected at the API boundary.
pub const MIN_BOOST_THRESHOLD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Base units per display unit.
const WEI_PER_TOKEN: u64 = 1_000_000_000_000_000_000;

/// Reasons a [Validator] cannot be acted upon.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("invalid pubkey: {0}")]
    Pubkey(String),
    #[error("invalid operator address: {0}")]
    OperatorAddress(String),
    #[error("invalid boost threshold: {0}")]
    BoostThreshold(String),
    #[error("boost threshold {0} is below the minimum of 10^18")]
    BoostThresholdTooLow(String),
}

/// A validator registered for boosting, as stored by the admin API.
///
/// Fields are kept in their persisted (string) form and parsed at use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    pub pubkey: String,
    pub operator_address: String,
    pub boost_threshold: String,
}

impl Validator {
    /// Decodes the hex-encoded validator pubkey.
    pub fn pubkey_bytes(&self) -> Result<Bytes, InvalidConfig> {
        parse_pubkey(&self.pubkey)
    }

    /// Parses the operator address.
    pub fn operator(&self) -> Result<Address, InvalidConfig> {
        parse_operator(&self.operator_address)
    }

    /// Parses the boost threshold (without enforcing the minimum).
    pub fn threshold(&self) -> Result<U256, InvalidConfig> {
        parse_threshold(&self.boost_threshold)
    }

    /// Checks every field the way the admin API does before accepting a validator.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.pubkey_bytes()?;
        self.operator()?;
        validate_threshold(&self.boost_threshold)?;
        Ok(())
    }
}

/// Decodes a hex pubkey (with or without `0x`). Empty keys are rejected.
pub fn parse_pubkey(pubkey: &str) -> Result<Bytes, InvalidConfig> {
    let bytes = alloy::hex::decode(pubkey).map_err(|_| InvalidConfig::Pubkey(pubkey.into()))?;
    if bytes.is_empty() {
        return Err(InvalidConfig::Pubkey(pubkey.into()));
    }
    Ok(bytes.into())
}

/// Parses a hex address (checksum is not enforced).
pub fn parse_operator(address: &str) -> Result<Address, InvalidConfig> {
    Address::from_str(address.trim()).map_err(|_| InvalidConfig::OperatorAddress(address.into()))
}

/// Parses a non-negative decimal integer of arbitrary size (up to 256 bits).
pub fn parse_threshold(threshold: &str) -> Result<U256, InvalidConfig> {
    if threshold.is_empty() || !threshold.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidConfig::BoostThreshold(threshold.into()));
    }
    U256::from_str_radix(threshold, 10).map_err(|_| InvalidConfig::BoostThreshold(threshold.into()))
}

/// Parses a threshold and enforces the 10^18 floor.
pub fn validate_threshold(threshold: &str) -> Result<U256, InvalidConfig> {
    let value = parse_threshold(threshold)?;
    if value < MIN_BOOST_THRESHOLD {
        return Err(InvalidConfig::BoostThresholdTooLow(threshold.into()));
    }
    Ok(value)
}

/// Audit record of a confirmed `queueBoost` transaction.
///
/// `activated` is the only mutable field and is the source of truth for whether the queued
/// amount has been activated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueBoost {
    pub validator_pubkey: String,
    pub operator_address: String,
    pub amount: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub fee: f64,
    pub transaction_from: String,
    pub to_contract: String,
    pub activated: bool,
}

/// Write-once audit record of a confirmed `activateBoost` transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateBoost {
    pub validator_pubkey: String,
    pub operator_address: String,
    pub amount: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub fee: f64,
    pub transaction_from: String,
    pub to_contract: String,
}

/// The contract's view of a queued, not yet activated boost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoostQueue {
    /// Block at which the boost was queued.
    pub block_number: u64,
    pub balance: U256,
}

/// Outcome of a mined transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionInfo {
    pub hash: TxHash,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    /// Fee in display units (see [fee]).
    pub fee: f64,
}

/// Computes `gas_used * effective_gas_price` and converts it to display units (divided by 10^18).
pub fn fee(gas_used: u64, effective_gas_price: u128) -> f64 {
    to_display(U256::from(gas_used) * U256::from(effective_gas_price))
}

/// Converts an amount of base units to display units.
pub fn to_display(wei: U256) -> f64 {
    let (whole, frac) = wei.div_rem(U256::from(WEI_PER_TOKEN));
    let whole = u128::try_from(whole).unwrap_or(u128::MAX) as f64;
    let frac = u64::try_from(frac).unwrap_or_default() as f64;
    whole + frac / WEI_PER_TOKEN as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(threshold: &str) -> Validator {
        Validator {
            pubkey: "0xaa".into(),
            operator_address: "0x00000000000000000000000000000000000000aa".into(),
            boost_threshold: threshold.into(),
        }
    }

    #[test]
    fn test_fee_conversion() {
        assert_eq!(fee(21_000, 50_000_000_000), 0.00105);
        assert_eq!(fee(0, 50_000_000_000), 0.0);
        assert_eq!(to_display(U256::from(WEI_PER_TOKEN) * U256::from(3u8)), 3.0);
        assert_eq!(to_display(U256::from(1_500_000_000_000_000_000u128)), 1.5);
    }

    #[test]
    fn test_threshold_parsing() {
        assert_eq!(
            parse_threshold("1000000000000000000").unwrap(),
            MIN_BOOST_THRESHOLD
        );
        assert!(parse_threshold("").is_err());
        assert!(parse_threshold("-1").is_err());
        assert!(parse_threshold("1e18").is_err());
        assert!(parse_threshold("0x10").is_err());
        assert!(parse_threshold(" 1").is_err());

        // 2^256 does not fit
        let overflow =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(parse_threshold(overflow).is_err());
    }

    #[test]
    fn test_threshold_floor() {
        assert!(validate_threshold("999999999999999999").is_err());
        assert!(validate_threshold("1000000000000000000").is_ok());
        assert!(validator("1000000000000000000").validate().is_ok());
        assert_eq!(
            validator("5").validate(),
            Err(InvalidConfig::BoostThresholdTooLow("5".into()))
        );
    }

    #[test]
    fn test_validator_fields() {
        let v = validator("1000000000000000000");
        assert_eq!(v.pubkey_bytes().unwrap().as_ref(), &[0xaa]);
        assert_eq!(
            v.operator().unwrap(),
            Address::from_str("0x00000000000000000000000000000000000000aa").unwrap()
        );

        let mut bad = v.clone();
        bad.pubkey = "0xzz".into();
        assert!(matches!(bad.validate(), Err(InvalidConfig::Pubkey(_))));
        bad.pubkey = "0x".into();
        assert!(matches!(bad.validate(), Err(InvalidConfig::Pubkey(_))));

        let mut bad = v;
        bad.operator_address = "0xOP".into();
        assert!(matches!(
            bad.validate(),
            Err(InvalidConfig::OperatorAddress(_))
        ));
    }

    #[test]
    fn test_record_wire_names() {
        let record = QueueBoost {
            validator_pubkey: "0xaa".into(),
            operator_address: "0xop".into(),
            amount: "2000000000000000000".into(),
            transaction_hash: "0x01".into(),
            block_number: 7,
            block_timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            fee: 0.5,
            transaction_from: "0xop".into(),
            to_contract: "0xbgt".into(),
            activated: false,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["validatorPubkey"], "0xaa");
        assert_eq!(json["transactionHash"], "0x01");
        assert_eq!(json["activated"], false);
        assert_eq!(json["toContract"], "0xbgt");
    }
}
