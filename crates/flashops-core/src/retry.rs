//! Bounded retry for transaction confirmation.
//!
//! Confirmation polling is the one place the console retries: transient
//! network failures and pending transactions are polled with a fixed delay
//! up to a bounded number of attempts. Everything else fails fast.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::{ChainClient, ChainError, TxId, TxStatus};

/// Confirmation polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of status polls before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between polls.
    #[serde(default = "default_delay")]
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

const fn default_max_attempts() -> u32 {
    20
}

const fn default_delay() -> Duration {
    Duration::from_secs(3)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_delay(),
        }
    }
}

/// Polls a transaction until it confirms, fails, or the attempt budget runs
/// out.
///
/// Transient query errors count as attempts and are retried; a reported
/// execution failure is terminal.
///
/// # Errors
///
/// - [`ChainError::Contract`] if the network reports the transaction failed.
/// - [`ChainError::ConfirmationTimeout`] when the attempt budget is
///   exhausted.
/// - Any non-transient query error, unchanged.
pub fn confirm_transaction(
    chain: &dyn ChainClient,
    tx_id: &TxId,
    config: &RetryConfig,
) -> Result<(), ChainError> {
    for attempt in 1..=config.max_attempts {
        match chain.transaction_status(tx_id) {
            Ok(TxStatus::Confirmed) => {
                debug!(tx = %tx_id, attempt, "transaction confirmed");
                return Ok(());
            },
            Ok(TxStatus::Failed { reason }) => {
                return Err(ChainError::Contract {
                    message: format!("transaction {tx_id} failed: {reason}"),
                });
            },
            Ok(TxStatus::Pending) => {
                debug!(tx = %tx_id, attempt, max = config.max_attempts, "awaiting confirmation");
            },
            Err(err) if err.is_transient() => {
                warn!(tx = %tx_id, attempt, error = %err, "transient error while polling");
            },
            Err(err) => return Err(err),
        }

        if attempt < config.max_attempts && !config.delay.is_zero() {
            std::thread::sleep(config.delay);
        }
    }

    Err(ChainError::ConfirmationTimeout {
        tx_id: tx_id.to_string(),
        attempts: config.max_attempts,
    })
}

#[cfg(test)]
mod unit_tests {
    use std::sync::Mutex;

    use super::*;
    use crate::chain::{AccountResources, Address, ConstructorArgs, ResourceUsage};

    /// Replays a scripted sequence of status results.
    struct ScriptedChain {
        script: Mutex<Vec<Result<TxStatus, ChainError>>>,
    }

    impl ScriptedChain {
        fn new(script: Vec<Result<TxStatus, ChainError>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    impl ChainClient for ScriptedChain {
        fn operator_account(&self) -> Result<Address, ChainError> {
            Err(ChainError::NoOperatorAccount)
        }

        fn trx_balance(&self, _address: &Address) -> Result<u64, ChainError> {
            Ok(0)
        }

        fn account_resources(&self, _address: &Address) -> Result<AccountResources, ChainError> {
            Ok(AccountResources::default())
        }

        fn deploy_contract(
            &self,
            _interface: &str,
            _bytecode: &str,
            _constructor: &ConstructorArgs,
        ) -> Result<Address, ChainError> {
            Err(ChainError::NoOperatorAccount)
        }

        fn call_contract(
            &self,
            _address: &Address,
            _method: &str,
            _args: &[serde_json::Value],
        ) -> Result<serde_json::Value, ChainError> {
            Ok(serde_json::Value::Null)
        }

        fn send_contract(
            &self,
            _address: &Address,
            _method: &str,
            _args: &[serde_json::Value],
            _fee_limit: u64,
        ) -> Result<TxId, ChainError> {
            Ok(TxId("tx".to_string()))
        }

        fn probe_liveness(&self, _address: &Address) -> bool {
            true
        }

        fn transaction_status(&self, _tx_id: &TxId) -> Result<TxStatus, ChainError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(TxStatus::Pending)
            } else {
                script.remove(0)
            }
        }

        fn transaction_usage(&self, _tx_id: &TxId) -> Result<ResourceUsage, ChainError> {
            Ok(ResourceUsage::default())
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_confirms_within_budget() {
        let chain = ScriptedChain::new(vec![
            Ok(TxStatus::Pending),
            Err(ChainError::Transient {
                message: "timeout".to_string(),
            }),
            Ok(TxStatus::Confirmed),
        ]);

        confirm_transaction(&chain, &TxId("tx".to_string()), &fast(5)).unwrap();
    }

    #[test]
    fn test_exhausted_budget_times_out() {
        let chain = ScriptedChain::new(vec![]);
        let result = confirm_transaction(&chain, &TxId("tx".to_string()), &fast(3));
        assert!(matches!(
            result,
            Err(ChainError::ConfirmationTimeout { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_execution_failure_is_terminal() {
        let chain = ScriptedChain::new(vec![
            Ok(TxStatus::Pending),
            Ok(TxStatus::Failed {
                reason: "REVERT".to_string(),
            }),
        ]);

        let result = confirm_transaction(&chain, &TxId("tx".to_string()), &fast(10));
        assert!(matches!(result, Err(ChainError::Contract { .. })));
    }

    #[test]
    fn test_non_transient_error_propagates() {
        let chain = ScriptedChain::new(vec![Err(ChainError::Contract {
            message: "bad node".to_string(),
        })]);

        let result = confirm_transaction(&chain, &TxId("tx".to_string()), &fast(10));
        assert!(matches!(result, Err(ChainError::Contract { .. })));
    }
}
