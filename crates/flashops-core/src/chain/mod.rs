//! Chain client abstraction.
//!
//! The console never talks to the network directly; every workflow goes
//! through the [`ChainClient`] trait. The production client (which signs and
//! submits real transactions) is an external integration point. This module
//! provides the trait, the value types crossing it, address/amount helpers,
//! and [`SimulatedChain`], an in-memory implementation used by tests and by
//! the CLI's simulation mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod simulated;

pub use simulated::SimulatedChain;

/// Decimals of the native currency (1 TRX = 1_000_000 sun).
pub const TRX_DECIMALS: u32 = 6;

/// Base58 alphabet used by TRON addresses (no `0`, `O`, `I`, `l`).
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Errors crossing the chain boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// The string is not a well-formed address.
    #[error("invalid address: {address}")]
    InvalidAddress {
        /// The rejected input.
        address: String,
    },

    /// The string is not a well-formed decimal amount.
    #[error("invalid amount '{amount}': {reason}")]
    InvalidAmount {
        /// The rejected input.
        amount: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Network-level failure; safe to retry.
    #[error("transient network error: {message}")]
    Transient {
        /// Underlying failure description.
        message: String,
    },

    /// The contract rejected the call, or the call reverted.
    #[error("contract error: {message}")]
    Contract {
        /// Underlying failure description.
        message: String,
    },

    /// A transaction did not confirm within the bounded polling window.
    #[error("transaction {tx_id} not confirmed after {attempts} attempts")]
    ConfirmationTimeout {
        /// The unconfirmed transaction.
        tx_id: String,
        /// How many polls were made.
        attempts: u32,
    },

    /// The operator account is not available on the client.
    #[error("operator account not configured")]
    NoOperatorAccount,
}

impl ChainError {
    /// Whether a retry of the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A base58 account or contract address.
///
/// Stored as the raw string; [`Address::parse`] is the validating
/// constructor used at input boundaries. Values already inside the persisted
/// document are trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address string.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidAddress`] if the string does not have the
    /// base58 shape of a TRON address.
    pub fn parse(s: &str) -> Result<Self, ChainError> {
        if is_valid_address(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ChainError::InvalidAddress {
                address: s.to_string(),
            })
        }
    }

    /// Wraps a string without validation.
    ///
    /// For values originating from the client itself (deploy results) or the
    /// persisted document.
    #[must_use]
    pub fn unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The raw address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A transaction identifier returned by the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Constructor arguments for a token-style protocol deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorArgs {
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Token decimals.
    pub decimals: u32,
    /// Initial supply in base units (decimal string).
    pub initial_supply: String,
}

/// Resources held by an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResources {
    /// Energy limit.
    pub energy_limit: u64,
    /// Bandwidth (net) limit.
    pub bandwidth_limit: u64,
    /// Frozen native currency backing the resources, in base units.
    pub frozen_trx: u64,
}

/// Resources consumed by a confirmed transaction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Energy consumed.
    pub energy_used: u64,
    /// Bandwidth consumed.
    pub bandwidth_used: u64,
}

/// Confirmation state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet included in a block.
    Pending,
    /// Included and executed successfully.
    Confirmed,
    /// Included but the execution failed.
    Failed {
        /// Failure description reported by the network.
        reason: String,
    },
}

/// The external collaborator surface the console requires.
///
/// Implementations are expected to be blocking; the console runs one workflow
/// at a time and serializes all ledger writes (see the crate docs).
pub trait ChainClient {
    /// The operator (signing) account.
    ///
    /// # Errors
    ///
    /// Returns an error if no account is configured on the client.
    fn operator_account(&self) -> Result<Address, ChainError>;

    /// Native currency balance of an account, in base units.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn trx_balance(&self, address: &Address) -> Result<u64, ChainError>;

    /// Resource holdings of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn account_resources(&self, address: &Address) -> Result<AccountResources, ChainError>;

    /// Deploys a contract and returns its address.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment transaction cannot be created,
    /// signed, or broadcast.
    fn deploy_contract(
        &self,
        interface: &str,
        bytecode: &str,
        constructor: &ConstructorArgs,
    ) -> Result<Address, ChainError>;

    /// Read-only contract call.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the method is unknown.
    fn call_contract(
        &self,
        address: &Address,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ChainError>;

    /// State-changing contract call; returns the transaction id.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be created, signed, or
    /// broadcast.
    fn send_contract(
        &self,
        address: &Address,
        method: &str,
        args: &[Value],
        fee_limit: u64,
    ) -> Result<TxId, ChainError>;

    /// Whether a contract is reachable at the address.
    ///
    /// Probe failures are reported as `false`; the recovery engine only
    /// consumes the boolean.
    fn probe_liveness(&self, address: &Address) -> bool;

    /// Confirmation state of a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query itself fails (distinct from the
    /// transaction having failed, which is a [`TxStatus::Failed`]).
    fn transaction_status(&self, tx_id: &TxId) -> Result<TxStatus, ChainError>;

    /// Resources consumed by a confirmed transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn transaction_usage(&self, tx_id: &TxId) -> Result<ResourceUsage, ChainError>;
}

/// Whether a string has the base58 shape of a TRON address.
#[must_use]
pub fn is_valid_address(s: &str) -> bool {
    s.len() == 34 && s.starts_with('T') && s.chars().all(|c| BASE58_ALPHABET.contains(c))
}

/// Converts a human decimal amount to a base-unit integer string.
///
/// `"1.5"` with 6 decimals becomes `"1500000"`. Arithmetic is done in `u128`
/// so token supplies far beyond `u64` range normalize without loss.
///
/// # Errors
///
/// Returns [`ChainError::InvalidAmount`] for empty input, non-digit
/// characters, more than one decimal point, or a fractional part longer than
/// `decimals`.
pub fn amount_to_base_units(amount: &str, decimals: u32) -> Result<String, ChainError> {
    let invalid = |reason: &str| ChainError::InvalidAmount {
        amount: amount.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = amount.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid("empty amount"));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("integer part contains non-digit characters"));
    }
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("fractional part contains non-digit characters"));
    }
    if frac_part.len() > decimals as usize {
        return Err(invalid("more fractional digits than the token supports"));
    }

    let scale = 10u128
        .checked_pow(decimals)
        .ok_or_else(|| invalid("decimals out of range"))?;

    let int_value: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid("integer overflow"))?
    };

    let frac_value: u128 = if frac_part.is_empty() {
        0
    } else {
        let padded = 10u128
            .checked_pow(decimals - frac_part.len() as u32)
            .ok_or_else(|| invalid("decimals out of range"))?;
        let raw: u128 = frac_part.parse().map_err(|_| invalid("integer overflow"))?;
        raw.checked_mul(padded)
            .ok_or_else(|| invalid("integer overflow"))?
    };

    let total = int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| invalid("integer overflow"))?;

    Ok(total.to_string())
}

/// Converts a base-unit integer string back to a human decimal amount.
///
/// Trailing zeros in the fractional part are trimmed; whole values come back
/// without a decimal point.
///
/// # Errors
///
/// Returns [`ChainError::InvalidAmount`] if the input is not an unsigned
/// integer string.
pub fn base_units_to_amount(units: &str, decimals: u32) -> Result<String, ChainError> {
    let value: u128 = units.parse().map_err(|_| ChainError::InvalidAmount {
        amount: units.to_string(),
        reason: "not an unsigned integer".to_string(),
    })?;

    let scale = 10u128.pow(decimals);
    let whole = value / scale;
    let frac = value % scale;

    if frac == 0 {
        return Ok(whole.to_string());
    }

    let frac_str = format!("{frac:0width$}", width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    Ok(format!("{whole}.{trimmed}"))
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_valid_address_shape() {
        assert!(is_valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        // wrong prefix
        assert!(!is_valid_address("XR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        // wrong length
        assert!(!is_valid_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6"));
        // forbidden base58 characters
        assert!(!is_valid_address("T0000000000000000000000000000000l0"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_address_parse_rejects_malformed() {
        let result = Address::parse("not-an-address");
        assert!(matches!(result, Err(ChainError::InvalidAddress { .. })));
    }

    #[test]
    fn test_amount_to_base_units_whole() {
        assert_eq!(amount_to_base_units("5000", 6).unwrap(), "5000000000");
        assert_eq!(amount_to_base_units("0", 6).unwrap(), "0");
    }

    #[test]
    fn test_amount_to_base_units_fractional() {
        assert_eq!(amount_to_base_units("1.5", 6).unwrap(), "1500000");
        assert_eq!(amount_to_base_units("0.000001", 6).unwrap(), "1");
        assert_eq!(amount_to_base_units(".5", 6).unwrap(), "500000");
    }

    #[test]
    fn test_amount_to_base_units_large_supply() {
        // 27 billion tokens with 6 decimals exceeds u64; must still convert.
        assert_eq!(
            amount_to_base_units("27000000000", 6).unwrap(),
            "27000000000000000"
        );
    }

    #[test]
    fn test_amount_to_base_units_rejects_malformed() {
        for bad in ["", "1.2.3", "abc", "-5", "1,5", "0.1234567"] {
            assert!(
                matches!(
                    amount_to_base_units(bad, 6),
                    Err(ChainError::InvalidAmount { .. })
                ),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_base_units_to_amount() {
        assert_eq!(base_units_to_amount("1500000", 6).unwrap(), "1.5");
        assert_eq!(base_units_to_amount("5000000000", 6).unwrap(), "5000");
        assert_eq!(base_units_to_amount("1", 6).unwrap(), "0.000001");
        assert_eq!(base_units_to_amount("0", 6).unwrap(), "0");
    }

    #[test]
    fn test_amount_round_trip() {
        for amount in ["1.5", "5000", "0.000001", "27000000000"] {
            let units = amount_to_base_units(amount, 6).unwrap();
            assert_eq!(base_units_to_amount(&units, 6).unwrap(), amount);
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Transient {
            message: "timeout".to_string()
        }
        .is_transient());
        assert!(!ChainError::Contract {
            message: "revert".to_string()
        }
        .is_transient());
    }
}
