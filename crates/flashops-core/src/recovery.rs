//! Protocol recovery engine.
//!
//! When a protocol's contract becomes unreachable, the chain itself holds no
//! record of what the deployment should look like; the operation ledger is
//! the only source of truth. The engine redeploys the contract from the
//! stored token parameters and replays the surviving virtual-balance
//! configuration onto the new instance.
//!
//! Each protocol under recovery moves through a fixed sequence:
//!
//! ```text
//! detected inactive -> deploying -> replaying config -> recorded
//! ```
//!
//! A deploy failure aborts that protocol atomically (nothing but the error
//! record reaches the ledger) and the batch moves on. Replay failures are
//! counted per target and never abort the batch. The final commit — redeploy
//! history entry, address rewrite, and `REDEPLOY` operation — is a single
//! in-memory mutation followed by one save, so it either lands completely or
//! not at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::chain::{Address, ChainClient, ChainError, ConstructorArgs};
use crate::records::{
    OperationRecord, OperationStatus, OperationType, RecoveredBalance, RecoveryResults,
    RedeployEntry,
};
use crate::retry::{RetryConfig, confirm_transaction};
use crate::store::{LedgerDocument, LedgerStore, StoreError};
use crate::view::{self, ReplayEntry};

/// Default reason stamped into redeploy history entries.
const DEFAULT_REASON: &str = "network restart recovery";

/// Errors that abort an entire recovery batch.
///
/// Per-protocol and per-target failures are accounted inside the
/// [`RecoveryReport`] instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecoveryError {
    /// The ledger could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cooperative cancellation flag for long recovery batches.
///
/// Checked between protocols and between replay targets; a protocol whose
/// commit has not happened yet is left untouched, never half-recorded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal outcome of one protocol's recovery.
#[derive(Debug, Clone)]
pub enum RecoveryOutcome {
    /// The protocol was redeployed and committed.
    Recovered {
        /// Address of the replacement instance.
        new_address: Address,
        /// Replay accounting.
        results: RecoveryResults,
    },
    /// The replacement deployment failed; the protocol is untouched.
    DeployFailed {
        /// The deploy error.
        error: String,
    },
    /// Cancellation hit before this protocol's commit.
    Cancelled,
}

/// Per-protocol entry in a [`RecoveryReport`].
#[derive(Debug, Clone)]
pub struct ProtocolRecovery {
    /// Stable protocol id.
    pub protocol_id: String,
    /// Token symbol, for operator output.
    pub symbol: String,
    /// Address the protocol was unreachable at.
    pub original_address: Address,
    /// What happened.
    pub outcome: RecoveryOutcome,
}

/// Result of one recovery batch.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Protocols recovered and committed.
    pub recovered: u32,
    /// Protocols whose recovery aborted on deploy failure.
    pub failed: u32,
    /// Whether the batch stopped on a cancellation request.
    pub cancelled: bool,
    /// Per-protocol detail.
    pub protocols: Vec<ProtocolRecovery>,
}

/// Restores inactive protocols from ledger history.
pub struct RecoveryEngine<'a> {
    chain: &'a dyn ChainClient,
    store: &'a LedgerStore,
    retry: RetryConfig,
    fee_limit: u64,
    reason: String,
}

impl<'a> RecoveryEngine<'a> {
    /// Creates an engine with default retry policy and fee limit.
    #[must_use]
    pub fn new(chain: &'a dyn ChainClient, store: &'a LedgerStore) -> Self {
        Self {
            chain,
            store,
            retry: RetryConfig::default(),
            fee_limit: 1_000_000_000,
            reason: DEFAULT_REASON.to_string(),
        }
    }

    /// Overrides the confirmation polling policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the fee limit used for replay transactions.
    #[must_use]
    pub const fn with_fee_limit(mut self, fee_limit: u64) -> Self {
        self.fee_limit = fee_limit;
        self
    }

    /// Stable ids of protocols whose current address fails the liveness
    /// probe.
    #[must_use]
    pub fn find_inactive(&self, doc: &LedgerDocument) -> Vec<String> {
        doc.protocols
            .iter()
            .filter(|p| !self.chain.probe_liveness(&p.current_address))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Recovers every inactive protocol, sequentially.
    ///
    /// # Errors
    ///
    /// Returns an error only when the ledger itself cannot be read or
    /// written; chain failures are accounted in the report.
    pub fn recover_all(&self, cancel: &CancelToken) -> Result<RecoveryReport, RecoveryError> {
        let mut doc = self.store.load()?;
        let candidates = self.find_inactive(&doc);
        let mut report = RecoveryReport::default();

        if candidates.is_empty() {
            info!("no inactive protocols detected");
            return Ok(report);
        }
        info!(count = candidates.len(), "starting recovery batch");

        for protocol_id in candidates {
            if cancel.is_cancelled() {
                info!("recovery batch cancelled");
                report.cancelled = true;
                break;
            }

            let Some(protocol) = doc.protocol_by_id(&protocol_id) else {
                continue;
            };
            let original_address = protocol.current_address.clone();
            let symbol = protocol.token_data.symbol.clone();
            let token = protocol.token_data.clone();

            info!(
                protocol = %original_address,
                symbol = %symbol,
                "redeploying inactive protocol"
            );

            let constructor = ConstructorArgs {
                name: token.name.clone(),
                symbol: token.symbol.clone(),
                decimals: token.decimals,
                initial_supply: token.adjusted_initial_supply.clone(),
            };

            let new_address =
                match self
                    .chain
                    .deploy_contract(&token.interface, &token.bytecode, &constructor)
            {
                Ok(address) => address,
                Err(err) => {
                    error!(
                        protocol = %original_address,
                        error = %err,
                        "replacement deploy failed, protocol left untouched"
                    );
                    let mut record = OperationRecord::new(
                        OperationType::RedeployError,
                        OperationStatus::Failed,
                    );
                    record.protocol_address = Some(original_address.clone());
                    record.original_address = Some(original_address.clone());
                    record.error = Some(err.to_string());
                    record.context = Some("recover".to_string());
                    doc.operations.push(record);
                    self.store.save(&mut doc)?;

                    report.failed += 1;
                    report.protocols.push(ProtocolRecovery {
                        protocol_id,
                        symbol,
                        original_address,
                        outcome: RecoveryOutcome::DeployFailed {
                            error: err.to_string(),
                        },
                    });
                    continue;
                },
            };
            info!(new_address = %new_address, "replacement deployed, replaying configuration");

            let entries = view::virtual_balance_set(&doc.operations, &original_address);
            let mut results = RecoveryResults::default();
            let mut interrupted = false;

            for entry in &entries {
                if cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }
                match self.replay_target(&new_address, entry) {
                    Ok(balance) => {
                        results.successful += 1;
                        results.balances.push(balance);
                    },
                    Err(err) => {
                        warn!(
                            target = %entry.target,
                            error = %err,
                            "virtual balance replay failed, continuing with next target"
                        );
                        results.failed += 1;
                    },
                }
            }

            if interrupted {
                info!(
                    protocol = %original_address,
                    "cancelled before commit, protocol left unrecovered"
                );
                report.cancelled = true;
                report.protocols.push(ProtocolRecovery {
                    protocol_id,
                    symbol,
                    original_address,
                    outcome: RecoveryOutcome::Cancelled,
                });
                break;
            }

            // Commit: history entry, address rewrite, and REDEPLOY operation
            // land in one save.
            let now = Utc::now();
            if let Some(protocol) = doc.protocol_by_id_mut(&protocol_id) {
                protocol.redeploy_history.push(RedeployEntry {
                    original_address: original_address.clone(),
                    new_address: new_address.clone(),
                    timestamp: now,
                    reason: self.reason.clone(),
                    recovery_results: results.clone(),
                });
                protocol.current_address = new_address.clone();
            }

            let mut record =
                OperationRecord::new(OperationType::Redeploy, OperationStatus::Completed);
            record.protocol_address = Some(new_address.clone());
            record.original_address = Some(original_address.clone());
            record.new_address = Some(new_address.clone());
            record.recovery_results = Some(results.clone());
            record.description = Some("automatic redeploy after inactivity".to_string());
            doc.operations.push(record);
            self.store.save(&mut doc)?;

            info!(
                protocol = %new_address,
                successful = results.successful,
                failed = results.failed,
                "protocol recovered"
            );
            report.recovered += 1;
            report.protocols.push(ProtocolRecovery {
                protocol_id,
                symbol,
                original_address,
                outcome: RecoveryOutcome::Recovered {
                    new_address,
                    results,
                },
            });
        }

        Ok(report)
    }

    /// Replays one target's virtual balance and verifies it by read-back.
    fn replay_target(
        &self,
        contract: &Address,
        entry: &ReplayEntry,
    ) -> Result<RecoveredBalance, ChainError> {
        info!(target = %entry.target, amount = %entry.amount, "replaying virtual balance");

        let tx = self.chain.send_contract(
            contract,
            "setVirtualBalance",
            &[
                Value::String(entry.target.to_string()),
                Value::String(entry.amount.clone()),
            ],
            self.fee_limit,
        )?;
        confirm_transaction(self.chain, &tx, &self.retry)?;

        let target_arg = [Value::String(entry.target.to_string())];
        let virtual_balance =
            value_to_amount(self.chain.call_contract(contract, "balanceOf", &target_arg)?);
        let actual_balance = value_to_amount(self.chain.call_contract(
            contract,
            "getActualBalance",
            &target_arg,
        )?);

        Ok(RecoveredBalance {
            address: entry.target.clone(),
            expected_amount: entry.amount.clone(),
            recovered: virtual_balance == entry.amount,
            virtual_balance,
            actual_balance,
        })
    }
}

/// Normalizes a contract call result to a decimal string.
fn value_to_amount(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
