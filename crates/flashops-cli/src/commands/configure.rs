//! Configuration workflows for existing protocols.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use flashops_core::chain::{Address, TRX_DECIMALS, amount_to_base_units};
use flashops_core::recorder::{LimitsUpdate, TargetUpdate};
use flashops_core::records::{
    OperationRecord, OperationStatus, OperationType, ResourceSettings, TransactionInfo,
};
use flashops_core::retry::confirm_transaction;
use serde_json::Value;

use super::Context;

/// `flashops configure` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigureCommand {
    /// Set a virtual balance for a target account
    VirtualBalance(VirtualBalanceArgs),

    /// Register an operation target
    Target(TargetArgs),

    /// Set loan and virtual-balance limits
    Limits(LimitsArgs),

    /// Update contract resource limits
    Resources(ResourcesArgs),
}

/// Arguments for `configure virtual-balance`.
#[derive(Args, Debug)]
pub struct VirtualBalanceArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Target account
    #[arg(long)]
    pub target: Address,

    /// Amount in whole TRX
    #[arg(long, default_value = "5000")]
    pub amount: String,
}

/// Arguments for `configure target`.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Target account
    #[arg(long)]
    pub address: Address,

    /// Operator description of the target
    #[arg(long)]
    pub description: Option<String>,

    /// Whitelist the target for operations
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub whitelist: bool,

    /// Energy limit for the target
    #[arg(long, default_value_t = 1_000_000)]
    pub energy_limit: u64,

    /// Bandwidth limit for the target
    #[arg(long, default_value_t = 1_000_000)]
    pub bandwidth_limit: u64,
}

/// Arguments for `configure limits`.
#[derive(Args, Debug)]
pub struct LimitsArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Maximum loan amount in whole TRX
    #[arg(long, default_value = "10000")]
    pub max_loan: String,

    /// Minimum loan amount in whole TRX
    #[arg(long, default_value = "100")]
    pub min_loan: String,

    /// Maximum virtual balance in whole TRX
    #[arg(long, default_value = "50000")]
    pub max_virtual: String,
}

/// Arguments for `configure resources`.
#[derive(Args, Debug)]
pub struct ResourcesArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Contract energy limit
    #[arg(long, default_value_t = 10_000_000)]
    pub energy_limit: u64,

    /// Contract bandwidth limit
    #[arg(long, default_value_t = 10_000_000)]
    pub bandwidth_limit: u64,

    /// Share of energy paid by the caller, in percent
    #[arg(long, default_value_t = 30)]
    pub user_energy_percent: u8,
}

pub fn run(ctx: &Context, command: &ConfigureCommand) -> Result<()> {
    match command {
        ConfigureCommand::VirtualBalance(args) => virtual_balance(ctx, args),
        ConfigureCommand::Target(args) => target(ctx, args),
        ConfigureCommand::Limits(args) => limits(ctx, args),
        ConfigureCommand::Resources(args) => resources(ctx, args),
    }
}

/// Rejects protocol addresses the ledger does not know about before any
/// chain call is made.
fn require_known_protocol(ctx: &Context, protocol: &Address) -> Result<()> {
    let doc = ctx.store.load()?;
    if doc.protocol_by_address(protocol).is_none() {
        bail!("protocol {protocol} is not in the ledger; deploy it first");
    }
    Ok(())
}

fn virtual_balance(ctx: &Context, args: &VirtualBalanceArgs) -> Result<()> {
    require_known_protocol(ctx, &args.protocol)?;
    let amount = amount_to_base_units(&args.amount, TRX_DECIMALS)?;

    println!(
        "Setting virtual balance of {} for {}...",
        args.amount, args.target
    );
    let tx = ctx.chain.send_contract(
        &args.protocol,
        "setVirtualBalance",
        &[
            Value::String(args.target.to_string()),
            Value::String(amount.clone()),
        ],
        ctx.config.network.fee_limit,
    )?;
    confirm_transaction(ctx.chain.as_ref(), &tx, &ctx.config.retry)?;
    let usage = ctx.chain.transaction_usage(&tx).ok();

    let mut op = OperationRecord::new(
        OperationType::ConfigureVirtualBalance,
        OperationStatus::Completed,
    );
    op.protocol_address = Some(args.protocol.clone());
    op.target_address = Some(args.target.clone());
    op.amount = Some(amount);
    op.transaction = Some(TransactionInfo {
        tx_id: tx.clone(),
        usage,
    });
    ctx.recorder.record_operation(op)?;

    println!("Virtual balance configured (tx {tx})");
    Ok(())
}

fn target(ctx: &Context, args: &TargetArgs) -> Result<()> {
    require_known_protocol(ctx, &args.protocol)?;

    ctx.recorder.record_target(
        &args.protocol,
        TargetUpdate {
            address: args.address.clone(),
            description: args.description.clone(),
            is_whitelisted: args.whitelist,
            resources: ResourceSettings {
                energy_limit: args.energy_limit,
                bandwidth_limit: args.bandwidth_limit,
                user_energy_percent: None,
            },
        },
    )?;

    println!("Target {} registered", args.address);
    Ok(())
}

fn limits(ctx: &Context, args: &LimitsArgs) -> Result<()> {
    require_known_protocol(ctx, &args.protocol)?;

    ctx.recorder.record_limits(
        &args.protocol,
        LimitsUpdate {
            max_loan_amount: amount_to_base_units(&args.max_loan, TRX_DECIMALS)?,
            min_loan_amount: amount_to_base_units(&args.min_loan, TRX_DECIMALS)?,
            max_virtual_balance: amount_to_base_units(&args.max_virtual, TRX_DECIMALS)?,
        },
    )?;

    println!("Limits configured for {}", args.protocol);
    Ok(())
}

fn resources(ctx: &Context, args: &ResourcesArgs) -> Result<()> {
    require_known_protocol(ctx, &args.protocol)?;
    if args.user_energy_percent > 100 {
        bail!(
            "user energy percent must be 0-100, got {}",
            args.user_energy_percent
        );
    }

    let tx = ctx.chain.send_contract(
        &args.protocol,
        "updateResourceLimits",
        &[
            Value::from(args.energy_limit),
            Value::from(args.bandwidth_limit),
            Value::from(u64::from(args.user_energy_percent)),
        ],
        ctx.config.network.fee_limit,
    )?;
    confirm_transaction(ctx.chain.as_ref(), &tx, &ctx.config.retry)?;
    let usage = ctx.chain.transaction_usage(&tx).ok();

    let mut op = OperationRecord::new(
        OperationType::ConfigureResources,
        OperationStatus::Completed,
    );
    op.protocol_address = Some(args.protocol.clone());
    op.resources = Some(ResourceSettings {
        energy_limit: args.energy_limit,
        bandwidth_limit: args.bandwidth_limit,
        user_energy_percent: Some(args.user_energy_percent),
    });
    op.transaction = Some(TransactionInfo {
        tx_id: tx.clone(),
        usage,
    });
    ctx.recorder.record_operation(op)?;

    println!("Resource limits updated (tx {tx})");
    Ok(())
}
