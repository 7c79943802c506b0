//! In-memory chain backend.
//!
//! Emulates just enough of the token-protocol surface for the console to run
//! end-to-end without a network: deployments, virtual balances, flash loans,
//! liveness, and transaction confirmation. Tests use the failure-injection
//! hooks to script deploy errors, per-target send failures, and delayed
//! confirmations.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use super::{
    AccountResources, Address, ChainClient, ChainError, ConstructorArgs, ResourceUsage, TxId,
    TxStatus,
};

/// Default operator funding, in base units (10,000 TRX).
const DEFAULT_OPERATOR_BALANCE: u64 = 10_000_000_000;

#[derive(Debug, Default)]
struct SimContract {
    name: String,
    symbol: String,
    decimals: u32,
    total_supply: u128,
    balances: HashMap<Address, u128>,
    virtual_balances: HashMap<Address, u128>,
    resources: AccountResources,
    live: bool,
}

#[derive(Debug, Default)]
struct SimState {
    contracts: HashMap<Address, SimContract>,
    transactions: HashMap<TxId, (TxStatus, u32)>,
    next_address: u64,
    next_tx: u64,
    confirmation_delay: u32,
    deploy_failure: Option<String>,
    failing_targets: HashSet<Address>,
}

/// An in-memory [`ChainClient`] implementation.
pub struct SimulatedChain {
    /// Per-instance tag baked into generated addresses, so two simulated
    /// chains never hand out the same address.
    instance: String,
    operator: Address,
    operator_balance: Mutex<u64>,
    state: Mutex<SimState>,
}

impl SimulatedChain {
    /// Creates a simulated chain with a funded operator account.
    #[must_use]
    pub fn new() -> Self {
        // Uuid hex never contains 'O', 'I', or 'l'; only '0' needs patching
        // to stay inside the base58 alphabet.
        let instance: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(6)
            .map(|c| if c == '0' { 'x' } else { c })
            .collect();
        let operator = sim_address(&instance, 0);
        Self {
            instance,
            operator,
            operator_balance: Mutex::new(DEFAULT_OPERATOR_BALANCE),
            state: Mutex::new(SimState {
                next_address: 1,
                ..SimState::default()
            }),
        }
    }

    /// Marks a deployed contract live or unreachable.
    ///
    /// Unknown addresses are ignored; a liveness probe against them already
    /// reports `false`.
    pub fn set_live(&self, address: &Address, live: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(contract) = state.contracts.get_mut(address) {
            contract.live = live;
        }
    }

    /// Makes the next `deploy_contract` call fail with the given message.
    pub fn fail_next_deploy(&self, message: impl Into<String>) {
        self.state.lock().unwrap().deploy_failure = Some(message.into());
    }

    /// Makes every `setVirtualBalance` send targeting `target` fail.
    pub fn fail_sends_to(&self, target: Address) {
        self.state.lock().unwrap().failing_targets.insert(target);
    }

    /// Requires `polls` status queries before a new transaction confirms.
    pub fn set_confirmation_delay(&self, polls: u32) {
        self.state.lock().unwrap().confirmation_delay = polls;
    }

    /// Virtual balance currently set on a contract, as a base-unit string.
    #[must_use]
    pub fn virtual_balance_of(&self, contract: &Address, target: &Address) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .contracts
            .get(contract)?
            .virtual_balances
            .get(target)
            .map(u128::to_string)
    }

    fn next_tx(&self, state: &mut SimState) -> TxId {
        let tx = TxId(format!("simtx_{:08}", state.next_tx));
        state.next_tx += 1;
        let status = if state.confirmation_delay == 0 {
            (TxStatus::Confirmed, 0)
        } else {
            (TxStatus::Pending, state.confirmation_delay)
        };
        state.transactions.insert(tx.clone(), status);
        tx
    }
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainClient for SimulatedChain {
    fn operator_account(&self) -> Result<Address, ChainError> {
        Ok(self.operator.clone())
    }

    fn trx_balance(&self, address: &Address) -> Result<u64, ChainError> {
        if *address == self.operator {
            Ok(*self.operator_balance.lock().unwrap())
        } else {
            Ok(0)
        }
    }

    fn account_resources(&self, address: &Address) -> Result<AccountResources, ChainError> {
        let state = self.state.lock().unwrap();
        if let Some(contract) = state.contracts.get(address) {
            return Ok(contract.resources.clone());
        }
        Ok(AccountResources {
            energy_limit: 100_000,
            bandwidth_limit: 5_000,
            frozen_trx: 0,
        })
    }

    fn deploy_contract(
        &self,
        _interface: &str,
        bytecode: &str,
        constructor: &ConstructorArgs,
    ) -> Result<Address, ChainError> {
        let mut state = self.state.lock().unwrap();

        if let Some(message) = state.deploy_failure.take() {
            return Err(ChainError::Contract { message });
        }
        if bytecode.is_empty() {
            return Err(ChainError::Contract {
                message: "empty bytecode".to_string(),
            });
        }

        let supply: u128 =
            constructor
                .initial_supply
                .parse()
                .map_err(|_| ChainError::InvalidAmount {
                    amount: constructor.initial_supply.clone(),
                    reason: "initial supply is not an unsigned integer".to_string(),
                })?;

        let address = sim_address(&self.instance, state.next_address);
        state.next_address += 1;

        let mut balances = HashMap::new();
        balances.insert(self.operator.clone(), supply);

        state.contracts.insert(
            address.clone(),
            SimContract {
                name: constructor.name.clone(),
                symbol: constructor.symbol.clone(),
                decimals: constructor.decimals,
                total_supply: supply,
                balances,
                virtual_balances: HashMap::new(),
                resources: AccountResources {
                    energy_limit: 10_000_000,
                    bandwidth_limit: 1_000_000,
                    frozen_trx: 0,
                },
                live: true,
            },
        );

        Ok(address)
    }

    fn call_contract(
        &self,
        address: &Address,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ChainError> {
        let state = self.state.lock().unwrap();
        let contract = state
            .contracts
            .get(address)
            .filter(|c| c.live)
            .ok_or_else(|| ChainError::Contract {
                message: format!("no contract at {address}"),
            })?;

        match method {
            "name" => Ok(Value::String(contract.name.clone())),
            "symbol" => Ok(Value::String(contract.symbol.clone())),
            "decimals" => Ok(Value::from(contract.decimals)),
            "totalSupply" => Ok(Value::String(contract.total_supply.to_string())),
            "balanceOf" => {
                let target = address_arg(args, 0)?;
                // Flash-token semantics: a configured virtual balance shadows
                // the actual holdings.
                let value = contract
                    .virtual_balances
                    .get(&target)
                    .or_else(|| contract.balances.get(&target))
                    .copied()
                    .unwrap_or(0);
                Ok(Value::String(value.to_string()))
            },
            "getActualBalance" => {
                let target = address_arg(args, 0)?;
                let value = contract.balances.get(&target).copied().unwrap_or(0);
                Ok(Value::String(value.to_string()))
            },
            other => Err(ChainError::Contract {
                message: format!("unknown view method '{other}'"),
            }),
        }
    }

    fn send_contract(
        &self,
        address: &Address,
        method: &str,
        args: &[Value],
        _fee_limit: u64,
    ) -> Result<TxId, ChainError> {
        let mut state = self.state.lock().unwrap();
        let operator = self.operator.clone();

        let SimState {
            contracts,
            failing_targets,
            ..
        } = &mut *state;
        let Some(contract) = contracts.get_mut(address).filter(|c| c.live) else {
            return Err(ChainError::Contract {
                message: format!("no contract at {address}"),
            });
        };

        match method {
            "setVirtualBalance" => {
                let target = address_arg(args, 0)?;
                let amount = amount_arg(args, 1)?;
                if failing_targets.contains(&target) {
                    return Err(ChainError::Contract {
                        message: format!("setVirtualBalance reverted for {target}"),
                    });
                }
                contract.virtual_balances.insert(target, amount);
            },
            "transfer" => {
                let to = address_arg(args, 0)?;
                let amount = amount_arg(args, 1)?;
                let from_balance = contract.balances.get(&operator).copied().unwrap_or(0);
                if from_balance < amount {
                    return Err(ChainError::Contract {
                        message: "insufficient balance".to_string(),
                    });
                }
                contract.balances.insert(operator, from_balance - amount);
                *contract.balances.entry(to).or_insert(0) += amount;
            },
            "executeLoan" => {
                let amount = amount_arg(args, 0)?;
                if amount > contract.total_supply {
                    return Err(ChainError::Contract {
                        message: "loan exceeds total supply".to_string(),
                    });
                }
            },
            "updateResourceLimits" => {
                contract.resources.energy_limit = uint_arg(args, 0)?;
                contract.resources.bandwidth_limit = uint_arg(args, 1)?;
            },
            "freezeBalance" => {
                contract.resources.frozen_trx += uint_arg(args, 0)?;
            },
            other => {
                return Err(ChainError::Contract {
                    message: format!("unknown method '{other}'"),
                });
            },
        }

        Ok(self.next_tx(&mut state))
    }

    fn probe_liveness(&self, address: &Address) -> bool {
        let state = self.state.lock().unwrap();
        state
            .contracts
            .get(address)
            .is_some_and(|contract| contract.live)
    }

    fn transaction_status(&self, tx_id: &TxId) -> Result<TxStatus, ChainError> {
        let mut state = self.state.lock().unwrap();
        let Some((status, remaining)) = state.transactions.get_mut(tx_id) else {
            return Err(ChainError::Transient {
                message: format!("transaction {tx_id} not yet visible"),
            });
        };

        if *status == TxStatus::Pending {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                *status = TxStatus::Confirmed;
            }
        }
        Ok(status.clone())
    }

    fn transaction_usage(&self, tx_id: &TxId) -> Result<ResourceUsage, ChainError> {
        let state = self.state.lock().unwrap();
        if !state.transactions.contains_key(tx_id) {
            return Err(ChainError::Transient {
                message: format!("transaction {tx_id} not yet visible"),
            });
        }
        Ok(ResourceUsage {
            energy_used: 28_000,
            bandwidth_used: 345,
        })
    }
}

/// Base58-shaped address for simulation slot `n` of one chain instance.
fn sim_address(instance: &str, n: u64) -> Address {
    // '0' is not in the base58 alphabet; route every decimal digit through it.
    let alphabet = super::BASE58_ALPHABET.as_bytes();
    let encoded: String = n
        .to_string()
        .bytes()
        .map(|b| char::from(alphabet[usize::from(b - b'0')]))
        .collect();
    Address::unchecked(format!("TSim{instance}{encoded:1>24}"))
}

fn address_arg(args: &[Value], index: usize) -> Result<Address, ChainError> {
    let raw = args
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Contract {
            message: format!("missing address argument at position {index}"),
        })?;
    Ok(Address::unchecked(raw))
}

fn amount_arg(args: &[Value], index: usize) -> Result<u128, ChainError> {
    let raw = args
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Contract {
            message: format!("missing amount argument at position {index}"),
        })?;
    raw.parse().map_err(|_| ChainError::InvalidAmount {
        amount: raw.to_string(),
        reason: "not an unsigned integer".to_string(),
    })
}

fn uint_arg(args: &[Value], index: usize) -> Result<u64, ChainError> {
    args.get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| ChainError::Contract {
            message: format!("missing integer argument at position {index}"),
        })
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::chain::is_valid_address;

    fn deploy(chain: &SimulatedChain) -> Address {
        chain
            .deploy_contract(
                "[]",
                "6080604052",
                &ConstructorArgs {
                    name: "Tether USD".to_string(),
                    symbol: "USDT".to_string(),
                    decimals: 6,
                    initial_supply: "27000000000000000".to_string(),
                },
            )
            .unwrap()
    }

    #[test]
    fn test_sim_addresses_are_well_formed() {
        for n in [0, 1, 9, 10, 1234] {
            let address = sim_address("abcdef", n);
            assert!(
                is_valid_address(address.as_str()),
                "bad shape: {address}"
            );
        }
        assert_ne!(sim_address("abcdef", 1), sim_address("abcdef", 2));
    }

    #[test]
    fn test_instances_never_share_addresses() {
        let a = SimulatedChain::new();
        let b = SimulatedChain::new();
        assert_ne!(
            a.operator_account().unwrap(),
            b.operator_account().unwrap()
        );
        assert!(is_valid_address(a.operator_account().unwrap().as_str()));
    }

    #[test]
    fn test_deploy_and_views() {
        let chain = SimulatedChain::new();
        let address = deploy(&chain);

        assert!(chain.probe_liveness(&address));
        let supply = chain.call_contract(&address, "totalSupply", &[]).unwrap();
        assert_eq!(supply, Value::String("27000000000000000".to_string()));

        let operator = chain.operator_account().unwrap();
        let balance = chain
            .call_contract(
                &address,
                "balanceOf",
                &[Value::String(operator.to_string())],
            )
            .unwrap();
        assert_eq!(balance, Value::String("27000000000000000".to_string()));
    }

    #[test]
    fn test_set_virtual_balance_shadows_actual() {
        let chain = SimulatedChain::new();
        let address = deploy(&chain);
        let target = sim_address("abcdef", 77);

        chain
            .send_contract(
                &address,
                "setVirtualBalance",
                &[
                    Value::String(target.to_string()),
                    Value::String("5000000000".to_string()),
                ],
                1_000_000_000,
            )
            .unwrap();

        let virtual_balance = chain
            .call_contract(&address, "balanceOf", &[Value::String(target.to_string())])
            .unwrap();
        let actual_balance = chain
            .call_contract(
                &address,
                "getActualBalance",
                &[Value::String(target.to_string())],
            )
            .unwrap();

        assert_eq!(virtual_balance, Value::String("5000000000".to_string()));
        assert_eq!(actual_balance, Value::String("0".to_string()));
    }

    #[test]
    fn test_dead_contract_rejects_calls() {
        let chain = SimulatedChain::new();
        let address = deploy(&chain);
        chain.set_live(&address, false);

        assert!(!chain.probe_liveness(&address));
        let result = chain.call_contract(&address, "totalSupply", &[]);
        assert!(matches!(result, Err(ChainError::Contract { .. })));
    }

    #[test]
    fn test_deploy_failure_injection_is_one_shot() {
        let chain = SimulatedChain::new();
        chain.fail_next_deploy("out of energy");

        let constructor = ConstructorArgs {
            name: "T".to_string(),
            symbol: "T".to_string(),
            decimals: 6,
            initial_supply: "1".to_string(),
        };
        assert!(chain.deploy_contract("[]", "60", &constructor).is_err());
        assert!(chain.deploy_contract("[]", "60", &constructor).is_ok());
    }

    #[test]
    fn test_confirmation_delay_counts_down() {
        let chain = SimulatedChain::new();
        let address = deploy(&chain);
        chain.set_confirmation_delay(2);

        let tx = chain
            .send_contract(&address, "executeLoan", &[Value::String("1".to_string())], 0)
            .unwrap();

        assert_eq!(chain.transaction_status(&tx).unwrap(), TxStatus::Pending);
        assert_eq!(chain.transaction_status(&tx).unwrap(), TxStatus::Confirmed);
    }
}
