//! Deploy workflow: preflight the operator account, deploy the contract,
//! optionally make the initial transfer, and record the deployment.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use flashops_core::chain::{
    Address, ConstructorArgs, TRX_DECIMALS, amount_to_base_units,
};
use flashops_core::records::{
    OperationRecord, OperationStatus, OperationType, TokenData, TransactionInfo,
};
use flashops_core::retry::confirm_transaction;
use serde_json::Value;

use super::{Context, display_amount};

/// Arguments for `flashops deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Token name
    #[arg(long, default_value = "Tether USD")]
    pub name: String,

    /// Token symbol
    #[arg(long, default_value = "USDT")]
    pub symbol: String,

    /// Token decimals (0-18)
    #[arg(long, default_value_t = 6)]
    pub decimals: u32,

    /// Initial supply in whole tokens
    #[arg(long, default_value = "27000000000")]
    pub initial_supply: String,

    /// Operator description of the protocol
    #[arg(long)]
    pub description: Option<String>,

    /// Path to the contract ABI (JSON)
    #[arg(long)]
    pub abi_file: PathBuf,

    /// Path to the contract bytecode (hex)
    #[arg(long)]
    pub bytecode_file: PathBuf,

    /// Account to receive the initial supply after the deploy
    #[arg(long)]
    pub transfer_to: Option<Address>,
}

pub fn run(ctx: &Context, args: &DeployArgs) -> Result<()> {
    if args.decimals > 18 {
        bail!("decimals must be between 0 and 18, got {}", args.decimals);
    }

    // Preflight: account, balance, resources.
    let account = ctx.chain.operator_account()?;
    let balance = ctx.chain.trx_balance(&account)?;
    let resources = ctx.chain.account_resources(&account)?;

    println!("Operator account: {account}");
    println!("Balance:          {} TRX", display_amount(&balance.to_string(), TRX_DECIMALS));
    println!("Energy limit:     {}", resources.energy_limit);
    println!("Bandwidth limit:  {}", resources.bandwidth_limit);

    let min_balance = ctx.config.network.min_deploy_balance_trx * 10u64.pow(TRX_DECIMALS);
    if balance < min_balance {
        bail!(
            "insufficient balance for deploy: have {} TRX, need at least {} TRX",
            display_amount(&balance.to_string(), TRX_DECIMALS),
            ctx.config.network.min_deploy_balance_trx
        );
    }

    // Supply adjusted by decimals; the raw figure is kept for the record.
    let adjusted_supply = amount_to_base_units(&args.initial_supply, args.decimals)?;
    println!("Raw supply:       {}", args.initial_supply);
    println!("Adjusted supply:  {adjusted_supply}");

    let interface = fs::read_to_string(&args.abi_file)
        .with_context(|| format!("failed to read ABI from {}", args.abi_file.display()))?;
    let bytecode = fs::read_to_string(&args.bytecode_file)
        .with_context(|| format!("failed to read bytecode from {}", args.bytecode_file.display()))?;
    let bytecode = bytecode.trim().trim_start_matches("0x").to_string();

    let constructor = ConstructorArgs {
        name: args.name.clone(),
        symbol: args.symbol.clone(),
        decimals: args.decimals,
        initial_supply: adjusted_supply.clone(),
    };
    let address = ctx
        .chain
        .deploy_contract(&interface, &bytecode, &constructor)
        .context("deploy failed")?;

    println!("Contract deployed at: {address}");
    println!(
        "Explorer: {}/#/contract/{address}",
        ctx.config.network.explorer
    );

    // Optional initial transfer, verified by read-back. A transfer failure
    // is reported but does not undo the deploy.
    let mut transfer_tx = None;
    if let Some(transfer_to) = &args.transfer_to {
        match initial_transfer(ctx, &address, transfer_to, &adjusted_supply) {
            Ok(tx) => transfer_tx = Some(tx),
            Err(err) => {
                tracing::warn!(error = %err, "initial transfer failed");
                println!("Warning: initial transfer failed: {err:#}");
            },
        }
    }

    let mut op = OperationRecord::new(OperationType::Deploy, OperationStatus::Completed);
    op.protocol_address = Some(address.clone());
    op.deployer = Some(account);
    op.description = args.description.clone();
    op.transaction = transfer_tx;
    op.token_data = Some(TokenData {
        name: args.name.clone(),
        symbol: args.symbol.clone(),
        decimals: args.decimals,
        raw_initial_supply: args.initial_supply.clone(),
        adjusted_initial_supply: adjusted_supply,
        interface,
        bytecode,
        transfer_address: args.transfer_to.clone(),
    });
    ctx.recorder.record_operation(op)?;

    println!("Deploy recorded in the operation ledger");
    Ok(())
}

fn initial_transfer(
    ctx: &Context,
    contract: &Address,
    to: &Address,
    amount: &str,
) -> Result<TransactionInfo> {
    println!("Transferring initial supply to {to}...");
    let tx = ctx.chain.send_contract(
        contract,
        "transfer",
        &[
            Value::String(to.to_string()),
            Value::String(amount.to_string()),
        ],
        ctx.config.network.fee_limit,
    )?;
    confirm_transaction(ctx.chain.as_ref(), &tx, &ctx.config.retry)?;

    let balance = ctx.chain.call_contract(
        contract,
        "balanceOf",
        &[Value::String(to.to_string())],
    )?;
    if let Some(balance) = balance.as_str() {
        println!("Recipient balance after transfer: {balance}");
    }

    let usage = ctx.chain.transaction_usage(&tx).ok();
    Ok(TransactionInfo { tx_id: tx, usage })
}
