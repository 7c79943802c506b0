//! Typed records persisted in the operation ledger.
//!
//! Field names serialize in camelCase so the on-disk document stays
//! operator-inspectable with the same shape the console has always written.
//! Amounts are decimal base-unit strings throughout; the document never
//! carries a numeric type that JSON cannot represent exactly.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{Address, ResourceUsage, TxId};

/// Lifecycle status of a recorded operation.
///
/// Once a record reaches `Completed` or `Failed` it is immutable evidence of
/// a past action; recovery only trusts `Completed` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Submitted but not yet confirmed.
    Pending,
    /// Confirmed on chain (or finished locally).
    Completed,
    /// Failed; the `error` field carries the reason.
    Failed,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The closed taxonomy of ledger operations.
///
/// Extend by adding cases, never by overloading the meaning of an existing
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Deploy,
    ConfigureVirtualBalance,
    ConfigureTarget,
    ConfigureLimits,
    ConfigureResources,
    FlashLoanVirtual,
    FlashLoanSimple,
    EnergyOperation,
    BandwidthOperation,
    BalanceCheck,
    FullProtocolCheck,
    ResourcesCheck,
    Redeploy,
    DeployError,
    ConfigureError,
    ExecuteError,
    BalanceCheckError,
    RedeployError,
    SystemError,
}

impl OperationType {
    /// Whether this case records a workflow failure.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::DeployError
                | Self::ConfigureError
                | Self::ExecuteError
                | Self::BalanceCheckError
                | Self::RedeployError
                | Self::SystemError
        )
    }

    /// Short prefix used when deriving time-based record ids.
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::ConfigureVirtualBalance => "config_vb",
            Self::ConfigureTarget => "config_target",
            Self::ConfigureLimits => "config_limits",
            Self::ConfigureResources => "config_resources",
            Self::FlashLoanVirtual => "flash_loan_virtual",
            Self::FlashLoanSimple => "flash_loan_simple",
            Self::EnergyOperation => "energy_operation",
            Self::BandwidthOperation => "bandwidth_operation",
            Self::BalanceCheck => "balance_check",
            Self::FullProtocolCheck => "full_check",
            Self::ResourcesCheck => "resources_check",
            Self::Redeploy => "redeploy",
            Self::DeployError => "deploy_error",
            Self::ConfigureError => "config_error",
            Self::ExecuteError => "execute_error",
            Self::BalanceCheckError => "check_error",
            Self::RedeployError => "redeploy_error",
            Self::SystemError => "system_error",
        }
    }
}

impl OperationType {
    /// The wire spelling, identical to the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deploy => "DEPLOY",
            Self::ConfigureVirtualBalance => "CONFIGURE_VIRTUAL_BALANCE",
            Self::ConfigureTarget => "CONFIGURE_TARGET",
            Self::ConfigureLimits => "CONFIGURE_LIMITS",
            Self::ConfigureResources => "CONFIGURE_RESOURCES",
            Self::FlashLoanVirtual => "FLASH_LOAN_VIRTUAL",
            Self::FlashLoanSimple => "FLASH_LOAN_SIMPLE",
            Self::EnergyOperation => "ENERGY_OPERATION",
            Self::BandwidthOperation => "BANDWIDTH_OPERATION",
            Self::BalanceCheck => "BALANCE_CHECK",
            Self::FullProtocolCheck => "FULL_PROTOCOL_CHECK",
            Self::ResourcesCheck => "RESOURCES_CHECK",
            Self::Redeploy => "REDEPLOY",
            Self::DeployError => "DEPLOY_ERROR",
            Self::ConfigureError => "CONFIGURE_ERROR",
            Self::ExecuteError => "EXECUTE_ERROR",
            Self::BalanceCheckError => "BALANCE_CHECK_ERROR",
            Self::RedeployError => "REDEPLOY_ERROR",
            Self::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates a unique, time-derived id with the given prefix.
///
/// The wall-clock millisecond keeps ids sortable by creation time; the random
/// tail keeps them unique when two records land in the same millisecond.
#[must_use]
pub fn timed_id(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let tail = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{millis}_{}", &tail[..8])
}

/// Generates a unique, time-derived operation id.
#[must_use]
pub fn operation_id(kind: OperationType) -> String {
    timed_id(kind.id_prefix())
}

/// A confirmed transaction reference with its resource usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    /// Transaction id on the network.
    pub tx_id: TxId,

    /// Resources the transaction consumed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResourceUsage>,
}

/// Resource settings attached to configuration operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSettings {
    /// Energy limit.
    pub energy_limit: u64,
    /// Bandwidth limit.
    pub bandwidth_limit: u64,
    /// Share of energy paid by the caller, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_energy_percent: Option<u8>,
}

/// A single entry in the append-only operation log.
///
/// Identity is the `id`; everything else is payload specific to the `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Unique, time-derived identifier.
    pub id: String,

    /// Operation case.
    #[serde(rename = "type")]
    pub kind: OperationType,

    /// When the operation was recorded.
    pub timestamp: DateTime<Utc>,

    /// Lifecycle status.
    pub status: OperationStatus,

    /// Protocol the operation acted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_address: Option<Address>,

    /// Target account, for per-address configuration and checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<Address>,

    /// Primary amount in base units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    /// Virtual balance granted alongside a flash loan, in base units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_balance: Option<String>,

    /// Loan amount of a flash-loan operation, in base units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_amount: Option<String>,

    /// Free-form operator description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Account that signed the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,

    /// Token parameters carried by `DEPLOY` operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_data: Option<TokenData>,

    /// Resource settings carried by `CONFIGURE_RESOURCES` operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSettings>,

    /// Primary confirmed transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionInfo>,

    /// Setup transaction of a virtual flash loan (the balance grant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_balance_tx: Option<TransactionInfo>,

    /// Failure message for failed operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error source chain, outermost first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Which workflow produced an error record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Stamped by `update_operation`; absent on untouched records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Address replaced by a `REDEPLOY` operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_address: Option<Address>,

    /// Replacement address of a `REDEPLOY` operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_address: Option<Address>,

    /// Replay accounting of a `REDEPLOY` operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_results: Option<RecoveryResults>,
}

impl OperationRecord {
    /// Creates a record with a fresh id and timestamp and no payload.
    #[must_use]
    pub fn new(kind: OperationType, status: OperationStatus) -> Self {
        Self {
            id: operation_id(kind),
            kind,
            timestamp: Utc::now(),
            status,
            protocol_address: None,
            target_address: None,
            amount: None,
            virtual_balance: None,
            loan_amount: None,
            description: None,
            deployer: None,
            token_data: None,
            resources: None,
            transaction: None,
            virtual_balance_tx: None,
            error: None,
            stack: None,
            context: None,
            updated_at: None,
            original_address: None,
            new_address: None,
            recovery_results: None,
        }
    }
}

/// Token parameters of a deployed protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Token decimals.
    pub decimals: u32,
    /// Supply as entered by the operator (whole tokens).
    pub raw_initial_supply: String,
    /// Supply scaled by `decimals`, in base units.
    pub adjusted_initial_supply: String,
    /// Contract interface (ABI JSON) used for the deployment.
    pub interface: String,
    /// Contract bytecode used for the deployment.
    pub bytecode: String,
    /// Account funded by the initial transfer, if one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_address: Option<Address>,
}

/// One redeployment of a protocol; immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeployEntry {
    /// Address the protocol lived at before the redeploy.
    pub original_address: Address,
    /// Address of the replacement instance.
    pub new_address: Address,
    /// When the redeploy committed.
    pub timestamp: DateTime<Utc>,
    /// Why the redeploy happened.
    pub reason: String,
    /// Replay accounting for the redeploy.
    pub recovery_results: RecoveryResults,
}

/// A protocol under administration.
///
/// `id` is the stable identity; `current_address` is the mutable on-chain
/// location, rewritten by redeploys with the old address preserved in
/// `redeploy_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRecord {
    /// Stable identifier, never changed after creation.
    pub id: String,

    /// Current live deployment address.
    pub current_address: Address,

    /// When the original deployment happened.
    pub deployed_at: DateTime<Utc>,

    /// Account that deployed the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,

    /// Operator description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Token parameters (also the redeploy recipe).
    pub token_data: TokenData,

    /// Audit trail of redeployments, oldest first.
    #[serde(default)]
    pub redeploy_history: Vec<RedeployEntry>,
}

impl ProtocolRecord {
    /// Creates a protocol record with a fresh stable id.
    #[must_use]
    pub fn new(
        current_address: Address,
        deployed_at: DateTime<Utc>,
        token_data: TokenData,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            current_address,
            deployed_at,
            deployer: None,
            description: None,
            token_data,
            redeploy_history: Vec::new(),
        }
    }
}

/// Loan and virtual-balance limits configured for a protocol.
///
/// Old records are never deleted; the current limits are the most recently
/// updated record for the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRecord {
    /// Unique identifier.
    pub id: String,
    /// Protocol these limits apply to.
    pub protocol_address: Address,
    /// Maximum loan amount, base units.
    pub max_loan_amount: String,
    /// Minimum loan amount, base units.
    pub min_loan_amount: String,
    /// Maximum virtual balance, base units.
    pub max_virtual_balance: String,
    /// When this record was written.
    pub updated_at: DateTime<Utc>,
}

/// A registered operation target for a protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    /// Unique identifier.
    pub id: String,
    /// Target account.
    pub address: Address,
    /// Operator description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the target is whitelisted for operations.
    pub is_whitelisted: bool,
    /// When the target was registered.
    pub created_at: DateTime<Utc>,
    /// Protocol the target belongs to.
    pub protocol_address: Address,
    /// Per-target resource limits.
    pub resources: ResourceSettings,
}

/// Accounting of one recovery replay batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResults {
    /// Targets replayed and verified.
    pub successful: u32,
    /// Targets that failed to replay.
    pub failed: u32,
    /// Per-target outcomes.
    #[serde(default)]
    pub balances: Vec<RecoveredBalance>,
}

/// Outcome of replaying one target's virtual balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredBalance {
    /// Target account.
    pub address: Address,
    /// Amount the ledger says the target should hold, base units.
    pub expected_amount: String,
    /// Virtual balance read back from the new contract.
    pub virtual_balance: String,
    /// Actual balance read back from the new contract.
    pub actual_balance: String,
    /// Whether the read-back matched the expectation.
    pub recovered: bool,
}
