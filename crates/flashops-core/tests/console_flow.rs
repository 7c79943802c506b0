//! End-to-end exercises of the ledger, recorder, views, and recovery engine
//! against the simulated chain.

use chrono::{TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use flashops_core::chain::{
    AccountResources, Address, ChainClient, ChainError, ConstructorArgs, ResourceUsage,
    SimulatedChain, TxId, TxStatus, amount_to_base_units,
};
use flashops_core::recorder::OperationRecorder;
use flashops_core::records::{
    OperationRecord, OperationStatus, OperationType, TokenData,
};
use flashops_core::recovery::{CancelToken, RecoveryEngine, RecoveryOutcome};
use flashops_core::retry::RetryConfig;
use flashops_core::store::LedgerStore;
use flashops_core::view;

const T1: &str = "TSimTarget111111111111111111111111";
const T2: &str = "TSimTarget222222222222222222222222";

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        delay: std::time::Duration::ZERO,
    }
}

/// Runs the deploy workflow the way the console does: deploy on chain, then
/// record the operation (which derives the protocol entry).
fn deploy_protocol(chain: &SimulatedChain, recorder: &OperationRecorder) -> Address {
    let decimals = 6;
    let adjusted = amount_to_base_units("1000000", decimals).unwrap();
    let constructor = ConstructorArgs {
        name: "Tether USD".to_string(),
        symbol: "USDT".to_string(),
        decimals,
        initial_supply: adjusted.clone(),
    };
    let address = chain
        .deploy_contract("[]", "6080604052", &constructor)
        .unwrap();

    let mut op = OperationRecord::new(OperationType::Deploy, OperationStatus::Completed);
    op.protocol_address = Some(address.clone());
    op.deployer = Some(chain.operator_account().unwrap());
    op.token_data = Some(TokenData {
        name: constructor.name,
        symbol: constructor.symbol,
        decimals,
        raw_initial_supply: "1000000".to_string(),
        adjusted_initial_supply: adjusted,
        interface: "[]".to_string(),
        bytecode: "6080604052".to_string(),
        transfer_address: None,
    });
    recorder.record_operation(op).unwrap();
    address
}

/// Records a completed virtual-balance grant, both on chain and in the
/// ledger, at a fixed timestamp.
fn grant(
    chain: &SimulatedChain,
    recorder: &OperationRecorder,
    protocol: &Address,
    target: &str,
    amount: &str,
    at_secs: i64,
) {
    let tx = chain
        .send_contract(
            protocol,
            "setVirtualBalance",
            &[
                Value::String(target.to_string()),
                Value::String(amount.to_string()),
            ],
            1_000_000_000,
        )
        .unwrap();

    let mut op = OperationRecord::new(
        OperationType::ConfigureVirtualBalance,
        OperationStatus::Completed,
    );
    op.protocol_address = Some(protocol.clone());
    op.target_address = Some(Address::unchecked(target));
    op.amount = Some(amount.to_string());
    op.timestamp = Utc.timestamp_opt(at_secs, 0).unwrap();
    op.transaction = Some(flashops_core::records::TransactionInfo {
        tx_id: tx,
        usage: None,
    });
    recorder.record_operation(op).unwrap();
}

#[test]
fn full_lifecycle_deploy_configure_fail_recover() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::open(dir.path().join("data")).unwrap();
    let recorder = OperationRecorder::new(store.clone());
    let chain = SimulatedChain::new();

    let p1 = deploy_protocol(&chain, &recorder);
    grant(&chain, &recorder, &p1, T1, "100000000", 1_000);
    grant(&chain, &recorder, &p1, T1, "500000000", 2_000);
    grant(&chain, &recorder, &p1, T2, "300000000", 1_500);

    // The materialized view resolves latest-wins before anything fails.
    let doc = store.load().unwrap();
    let snapshot = view::config_snapshot(&doc, &p1);
    assert_eq!(snapshot.virtual_balances.len(), 2);
    assert_eq!(snapshot.virtual_balances[0].amount, "500000000");

    // The protocol goes dark; recovery replays exactly the surviving grants.
    chain.set_live(&p1, false);
    let engine = RecoveryEngine::new(&chain, &store).with_retry(fast_retry());
    let report = engine.recover_all(&CancelToken::new()).unwrap();

    assert_eq!(report.recovered, 1);
    assert_eq!(report.failed, 0);
    let RecoveryOutcome::Recovered {
        new_address,
        results,
    } = &report.protocols[0].outcome
    else {
        panic!("expected recovery");
    };
    assert_eq!(results.successful, 2);
    assert_eq!(results.failed, 0);
    assert!(results.balances.iter().all(|b| b.recovered));

    // Ledger state after commit: stable id kept, address rewritten, audit
    // trail in place, and the grant history still intact (append-only).
    let doc = store.load().unwrap();
    assert_eq!(doc.protocols.len(), 1);
    let protocol = &doc.protocols[0];
    assert_eq!(protocol.current_address, *new_address);
    assert_eq!(protocol.redeploy_history.len(), 1);
    assert_eq!(protocol.redeploy_history[0].original_address, p1);
    assert_eq!(
        doc.operations
            .iter()
            .filter(|op| op.kind == OperationType::ConfigureVirtualBalance)
            .count(),
        3
    );

    // A second recovery pass finds nothing to do.
    let report = engine.recover_all(&CancelToken::new()).unwrap();
    assert_eq!(report.recovered, 0);
    assert!(report.protocols.is_empty());
}

#[test]
fn ledger_survives_reopen_between_workflows() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");

    let p1 = {
        let store = LedgerStore::open(&data_dir).unwrap();
        let recorder = OperationRecorder::new(store);
        let chain = SimulatedChain::new();
        let p1 = deploy_protocol(&chain, &recorder);
        grant(&chain, &recorder, &p1, T1, "100000000", 1_000);
        p1
    };

    // A fresh store over the same directory sees the same document.
    let store = LedgerStore::open(&data_dir).unwrap();
    let doc = store.load().unwrap();
    assert_eq!(doc.protocols.len(), 1);
    assert_eq!(doc.protocols[0].current_address, p1);
    assert_eq!(view::virtual_balance_set(&doc.operations, &p1).len(), 1);
}

/// Delegates to a [`SimulatedChain`] but requests cancellation on the first
/// replay send, so the batch stops between targets.
struct CancellingChain {
    inner: SimulatedChain,
    cancel: CancelToken,
}

impl ChainClient for CancellingChain {
    fn operator_account(&self) -> Result<Address, ChainError> {
        self.inner.operator_account()
    }

    fn trx_balance(&self, address: &Address) -> Result<u64, ChainError> {
        self.inner.trx_balance(address)
    }

    fn account_resources(&self, address: &Address) -> Result<AccountResources, ChainError> {
        self.inner.account_resources(address)
    }

    fn deploy_contract(
        &self,
        interface: &str,
        bytecode: &str,
        constructor: &ConstructorArgs,
    ) -> Result<Address, ChainError> {
        self.inner.deploy_contract(interface, bytecode, constructor)
    }

    fn call_contract(
        &self,
        address: &Address,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ChainError> {
        self.inner.call_contract(address, method, args)
    }

    fn send_contract(
        &self,
        address: &Address,
        method: &str,
        args: &[Value],
        fee_limit: u64,
    ) -> Result<TxId, ChainError> {
        if method == "setVirtualBalance" {
            self.cancel.cancel();
        }
        self.inner.send_contract(address, method, args, fee_limit)
    }

    fn probe_liveness(&self, address: &Address) -> bool {
        self.inner.probe_liveness(address)
    }

    fn transaction_status(&self, tx_id: &TxId) -> Result<TxStatus, ChainError> {
        self.inner.transaction_status(tx_id)
    }

    fn transaction_usage(&self, tx_id: &TxId) -> Result<ResourceUsage, ChainError> {
        self.inner.transaction_usage(tx_id)
    }
}

#[test]
fn cancellation_mid_replay_never_half_commits() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::open(dir.path().join("data")).unwrap();
    let recorder = OperationRecorder::new(store.clone());
    let chain = SimulatedChain::new();

    let p1 = deploy_protocol(&chain, &recorder);
    grant(&chain, &recorder, &p1, T1, "100000000", 1_000);
    grant(&chain, &recorder, &p1, T2, "300000000", 2_000);
    chain.set_live(&p1, false);

    let cancel = CancelToken::new();
    let cancelling = CancellingChain {
        inner: chain,
        cancel: cancel.clone(),
    };
    let engine = RecoveryEngine::new(&cancelling, &store).with_retry(fast_retry());
    let report = engine.recover_all(&cancel).unwrap();

    assert!(report.cancelled);
    assert_eq!(report.recovered, 0);
    assert!(matches!(
        report.protocols[0].outcome,
        RecoveryOutcome::Cancelled
    ));

    // The commit never happened: address unchanged, no history entry, no
    // REDEPLOY operation in the ledger.
    let doc = store.load().unwrap();
    assert_eq!(doc.protocols[0].current_address, p1);
    assert!(doc.protocols[0].redeploy_history.is_empty());
    assert!(!doc
        .operations
        .iter()
        .any(|op| op.kind == OperationType::Redeploy));
}
