//! Operation recorder.
//!
//! All ledger writes funnel through here: appends of new operation records
//! (with protocol derivation for deploys), error records for failed
//! workflows, and the single sanctioned mutation path for existing records,
//! [`OperationRecorder::update_operation`]. Everything else in the document
//! is append-only.

use thiserror::Error;
use tracing::debug;

use crate::chain::Address;
use crate::records::{
    LimitRecord, OperationRecord, OperationStatus, OperationType, ProtocolRecord,
    ResourceSettings, TargetRecord, TransactionInfo, operation_id, timed_id,
};
use crate::store::{LedgerStore, StoreError};

/// Errors from the recorder.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecorderError {
    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A `DEPLOY` operation is missing the payload a protocol record is
    /// derived from.
    #[error("deploy operation missing required field '{field}'")]
    IncompleteDeploy {
        /// The absent field.
        field: &'static str,
    },
}

/// Mutable subset of an operation record, merged by `update_operation`.
///
/// The record id is deliberately not part of the patch.
#[derive(Debug, Clone, Default)]
pub struct OperationPatch {
    /// New lifecycle status.
    pub status: Option<OperationStatus>,
    /// Confirmed transaction reference.
    pub transaction: Option<TransactionInfo>,
    /// Failure message.
    pub error: Option<String>,
    /// Amount, base units.
    pub amount: Option<String>,
    /// Operator description.
    pub description: Option<String>,
}

impl OperationPatch {
    /// Patch that only moves the status.
    #[must_use]
    pub fn status(status: OperationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Adds a transaction reference to the patch.
    #[must_use]
    pub fn with_transaction(mut self, transaction: TransactionInfo) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Adds a failure message to the patch.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// New limits for a protocol, base units.
#[derive(Debug, Clone)]
pub struct LimitsUpdate {
    /// Maximum loan amount.
    pub max_loan_amount: String,
    /// Minimum loan amount.
    pub min_loan_amount: String,
    /// Maximum virtual balance.
    pub max_virtual_balance: String,
}

/// A new operation target registration.
#[derive(Debug, Clone)]
pub struct TargetUpdate {
    /// Target account.
    pub address: Address,
    /// Operator description.
    pub description: Option<String>,
    /// Whether the target is whitelisted.
    pub is_whitelisted: bool,
    /// Per-target resource limits.
    pub resources: ResourceSettings,
}

/// Appends typed events to the ledger and derives protocol state from them.
#[derive(Debug, Clone)]
pub struct OperationRecorder {
    store: LedgerStore,
}

impl OperationRecorder {
    /// Creates a recorder over the given store.
    #[must_use]
    pub const fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// The store this recorder writes through.
    #[must_use]
    pub const fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Appends an operation record, assigning an id if absent.
    ///
    /// A `DEPLOY` operation additionally derives a [`ProtocolRecord`] from
    /// its protocol address and token payload.
    ///
    /// Returns the id of the appended record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, or if a deploy operation lacks
    /// the fields a protocol record needs.
    pub fn record_operation(&self, mut op: OperationRecord) -> Result<String, RecorderError> {
        let mut doc = self.store.load()?;

        if op.id.is_empty() {
            op.id = operation_id(op.kind);
        }

        if op.kind == OperationType::Deploy {
            let address = op
                .protocol_address
                .clone()
                .ok_or(RecorderError::IncompleteDeploy {
                    field: "protocolAddress",
                })?;
            let token_data = op
                .token_data
                .clone()
                .ok_or(RecorderError::IncompleteDeploy { field: "tokenData" })?;

            let mut protocol = ProtocolRecord::new(address, op.timestamp, token_data);
            protocol.deployer = op.deployer.clone();
            protocol.description = op.description.clone();
            doc.protocols.push(protocol);
        }

        let id = op.id.clone();
        debug!(operation = %op.kind, id = %id, "recording operation");
        doc.operations.push(op);
        self.store.save(&mut doc)?;
        Ok(id)
    }

    /// Appends a failed `*_ERROR` record for a workflow boundary failure.
    ///
    /// Returns the id of the appended record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn record_error(
        &self,
        kind: OperationType,
        message: &str,
        stack: Option<String>,
        context: &str,
    ) -> Result<String, RecorderError> {
        let mut record = OperationRecord::new(kind, OperationStatus::Failed);
        record.error = Some(message.to_string());
        record.stack = stack;
        record.context = Some(context.to_string());

        let mut doc = self.store.load()?;
        let id = record.id.clone();
        doc.operations.push(record);
        self.store.save(&mut doc)?;
        Ok(id)
    }

    /// Merges a patch into an existing operation record.
    ///
    /// Returns `Ok(false)` without touching the document when the id is
    /// unknown. The record id never changes; `updatedAt` is stamped on every
    /// successful merge.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn update_operation(&self, id: &str, patch: OperationPatch) -> Result<bool, RecorderError> {
        let mut doc = self.store.load()?;

        let Some(record) = doc.operation_mut(id) else {
            return Ok(false);
        };

        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(transaction) = patch.transaction {
            record.transaction = Some(transaction);
        }
        if let Some(error) = patch.error {
            record.error = Some(error);
        }
        if let Some(amount) = patch.amount {
            record.amount = Some(amount);
        }
        if let Some(description) = patch.description {
            record.description = Some(description);
        }
        record.updated_at = Some(chrono::Utc::now());

        self.store.save(&mut doc)?;
        Ok(true)
    }

    /// Appends a limit record for a protocol along with its
    /// `CONFIGURE_LIMITS` operation, in one save.
    ///
    /// Old limit records are kept; readers resolve the current limits as the
    /// most recently updated record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn record_limits(
        &self,
        protocol_address: &Address,
        limits: LimitsUpdate,
    ) -> Result<String, RecorderError> {
        let mut doc = self.store.load()?;

        let now = chrono::Utc::now();
        doc.limits.push(LimitRecord {
            id: timed_id("limits"),
            protocol_address: protocol_address.clone(),
            max_loan_amount: limits.max_loan_amount.clone(),
            min_loan_amount: limits.min_loan_amount.clone(),
            max_virtual_balance: limits.max_virtual_balance.clone(),
            updated_at: now,
        });

        let mut op =
            OperationRecord::new(OperationType::ConfigureLimits, OperationStatus::Completed);
        op.protocol_address = Some(protocol_address.clone());
        op.amount = Some(limits.max_loan_amount);
        let id = op.id.clone();
        doc.operations.push(op);

        self.store.save(&mut doc)?;
        Ok(id)
    }

    /// Registers an operation target along with its `CONFIGURE_TARGET`
    /// operation, in one save.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn record_target(
        &self,
        protocol_address: &Address,
        target: TargetUpdate,
    ) -> Result<String, RecorderError> {
        let mut doc = self.store.load()?;

        let now = chrono::Utc::now();
        doc.targets.push(TargetRecord {
            id: timed_id("target"),
            address: target.address.clone(),
            description: target.description.clone(),
            is_whitelisted: target.is_whitelisted,
            created_at: now,
            protocol_address: protocol_address.clone(),
            resources: target.resources,
        });

        let mut op =
            OperationRecord::new(OperationType::ConfigureTarget, OperationStatus::Completed);
        op.protocol_address = Some(protocol_address.clone());
        op.target_address = Some(target.address);
        op.description = target.description;
        let id = op.id.clone();
        doc.operations.push(op);

        self.store.save(&mut doc)?;
        Ok(id)
    }
}
