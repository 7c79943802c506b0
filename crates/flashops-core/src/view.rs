//! Materialized configuration views.
//!
//! The ledger never stores "current" configuration directly; it is derived
//! from the operation history. These are pure functions over in-memory
//! records so the latest-wins resolution rules are testable without any I/O
//! or chain access.

use chrono::{DateTime, Utc};

use crate::chain::Address;
use crate::records::{
    LimitRecord, OperationRecord, OperationStatus, OperationType, TargetRecord,
};
use crate::store::LedgerDocument;

/// One virtual-balance grant selected for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayEntry {
    /// Target account.
    pub target: Address,
    /// Granted amount, base units.
    pub amount: String,
    /// When the surviving grant was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Everything "current" about one protocol's configuration.
#[derive(Debug)]
pub struct ConfigSnapshot<'a> {
    /// Latest virtual-balance grant per target.
    pub virtual_balances: Vec<ReplayEntry>,
    /// Most recently updated limits, if any were ever configured.
    pub limits: Option<&'a LimitRecord>,
    /// Whitelisted targets.
    pub targets: Vec<&'a TargetRecord>,
}

/// Selects the virtual-balance replay set for a protocol address.
///
/// Only `CONFIGURE_VIRTUAL_BALANCE` records with `completed` status count as
/// ground truth. Grants are deduplicated per target keeping the most recent
/// one: virtual-balance configuration has set semantics, so replaying a
/// superseded grant would resurrect stale state. The result is ordered most
/// recent first.
#[must_use]
pub fn virtual_balance_set(
    operations: &[OperationRecord],
    protocol_address: &Address,
) -> Vec<ReplayEntry> {
    let mut grants: Vec<(usize, &OperationRecord)> = operations
        .iter()
        .enumerate()
        .filter(|(_, op)| {
            op.kind == OperationType::ConfigureVirtualBalance
                && op.status == OperationStatus::Completed
                && op.protocol_address.as_ref() == Some(protocol_address)
                && op.target_address.is_some()
                && op.amount.is_some()
        })
        .collect();

    // Ledger position breaks timestamp ties so the later append wins.
    grants.sort_by_key(|&(index, op)| (op.timestamp, index));

    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();
    for &(_, op) in grants.iter().rev() {
        let (Some(target), Some(amount)) = (op.target_address.as_ref(), op.amount.as_ref())
        else {
            continue;
        };
        if seen.insert(target.clone()) {
            entries.push(ReplayEntry {
                target: target.clone(),
                amount: amount.clone(),
                recorded_at: op.timestamp,
            });
        }
    }
    entries
}

/// The current limits for a protocol: the most recently updated record.
#[must_use]
pub fn current_limits<'a>(
    limits: &'a [LimitRecord],
    protocol_address: &Address,
) -> Option<&'a LimitRecord> {
    limits
        .iter()
        .filter(|l| l.protocol_address == *protocol_address)
        .max_by_key(|l| l.updated_at)
}

/// Whitelisted targets registered for a protocol.
#[must_use]
pub fn whitelisted_targets<'a>(
    targets: &'a [TargetRecord],
    protocol_address: &Address,
) -> Vec<&'a TargetRecord> {
    targets
        .iter()
        .filter(|t| t.protocol_address == *protocol_address && t.is_whitelisted)
        .collect()
}

/// Builds the full configuration snapshot for a protocol address.
#[must_use]
pub fn config_snapshot<'a>(
    doc: &'a LedgerDocument,
    protocol_address: &Address,
) -> ConfigSnapshot<'a> {
    ConfigSnapshot {
        virtual_balances: virtual_balance_set(&doc.operations, protocol_address),
        limits: current_limits(&doc.limits, protocol_address),
        targets: whitelisted_targets(&doc.targets, protocol_address),
    }
}
