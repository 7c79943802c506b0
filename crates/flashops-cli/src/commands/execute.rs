//! Execution workflows: flash loans and resource operations.

use anyhow::Result;
use clap::{Args, Subcommand};
use flashops_core::chain::{Address, TRX_DECIMALS, amount_to_base_units};
use flashops_core::records::{
    OperationRecord, OperationStatus, OperationType, TransactionInfo,
};
use flashops_core::retry::confirm_transaction;
use serde_json::Value;

use super::Context;

/// Freeze amount backing a resource operation, in whole TRX.
const FREEZE_AMOUNT_TRX: u64 = 10;
/// Freeze duration in days.
const FREEZE_DURATION_DAYS: u64 = 3;

/// `flashops execute` subcommands.
#[derive(Subcommand, Debug)]
pub enum ExecuteCommand {
    /// Flash loan backed by a virtual balance
    FlashLoanVirtual(FlashLoanVirtualArgs),

    /// Plain flash loan
    FlashLoanSimple(FlashLoanSimpleArgs),

    /// Freeze balance for energy
    Energy(ResourceOpArgs),

    /// Freeze balance for bandwidth
    Bandwidth(ResourceOpArgs),
}

/// Arguments for `execute flash-loan-virtual`.
#[derive(Args, Debug)]
pub struct FlashLoanVirtualArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Target account for the virtual balance
    #[arg(long)]
    pub target: Address,

    /// Virtual balance in whole TRX
    #[arg(long, default_value = "5000")]
    pub virtual_balance: String,

    /// Loan amount in whole TRX
    #[arg(long, default_value = "1000")]
    pub loan_amount: String,
}

/// Arguments for `execute flash-loan-simple`.
#[derive(Args, Debug)]
pub struct FlashLoanSimpleArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Loan amount in whole TRX
    #[arg(long, default_value = "1000")]
    pub amount: String,
}

/// Arguments for the energy and bandwidth operations.
#[derive(Args, Debug)]
pub struct ResourceOpArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Resource amount to use
    #[arg(long, default_value = "1000000")]
    pub amount: String,
}

pub fn run(ctx: &Context, command: &ExecuteCommand) -> Result<()> {
    match command {
        ExecuteCommand::FlashLoanVirtual(args) => flash_loan_virtual(ctx, args),
        ExecuteCommand::FlashLoanSimple(args) => flash_loan_simple(ctx, args),
        ExecuteCommand::Energy(args) => {
            resource_operation(ctx, args, OperationType::EnergyOperation)
        },
        ExecuteCommand::Bandwidth(args) => {
            resource_operation(ctx, args, OperationType::BandwidthOperation)
        },
    }
}

fn send_confirmed(
    ctx: &Context,
    protocol: &Address,
    method: &str,
    args: &[Value],
) -> Result<TransactionInfo> {
    let tx = ctx
        .chain
        .send_contract(protocol, method, args, ctx.config.network.fee_limit)?;
    confirm_transaction(ctx.chain.as_ref(), &tx, &ctx.config.retry)?;
    let usage = ctx.chain.transaction_usage(&tx).ok();
    Ok(TransactionInfo { tx_id: tx, usage })
}

fn flash_loan_virtual(ctx: &Context, args: &FlashLoanVirtualArgs) -> Result<()> {
    let account = ctx.chain.operator_account()?;
    let resources = ctx.chain.account_resources(&account)?;
    println!("Energy available:    {}", resources.energy_limit);
    println!("Bandwidth available: {}", resources.bandwidth_limit);

    let virtual_amount = amount_to_base_units(&args.virtual_balance, TRX_DECIMALS)?;
    let loan_amount = amount_to_base_units(&args.loan_amount, TRX_DECIMALS)?;

    println!("Setting up virtual balance for {}...", args.target);
    let virtual_tx = send_confirmed(
        ctx,
        &args.protocol,
        "setVirtualBalance",
        &[
            Value::String(args.target.to_string()),
            Value::String(virtual_amount.clone()),
        ],
    )?;

    println!("Executing flash loan of {} TRX...", args.loan_amount);
    let loan_tx = send_confirmed(
        ctx,
        &args.protocol,
        "executeLoan",
        &[Value::String(loan_amount.clone())],
    )?;

    let mut op = OperationRecord::new(OperationType::FlashLoanVirtual, OperationStatus::Completed);
    op.protocol_address = Some(args.protocol.clone());
    op.target_address = Some(args.target.clone());
    op.virtual_balance = Some(virtual_amount);
    op.loan_amount = Some(loan_amount);
    op.virtual_balance_tx = Some(virtual_tx.clone());
    op.transaction = Some(loan_tx.clone());
    ctx.recorder.record_operation(op)?;

    println!("Virtual balance tx: {}", virtual_tx.tx_id);
    println!("Flash loan tx:      {}", loan_tx.tx_id);
    Ok(())
}

fn flash_loan_simple(ctx: &Context, args: &FlashLoanSimpleArgs) -> Result<()> {
    let amount = amount_to_base_units(&args.amount, TRX_DECIMALS)?;

    println!("Executing flash loan of {} TRX...", args.amount);
    let tx = send_confirmed(
        ctx,
        &args.protocol,
        "executeLoan",
        &[Value::String(amount.clone())],
    )?;

    let mut op = OperationRecord::new(OperationType::FlashLoanSimple, OperationStatus::Completed);
    op.protocol_address = Some(args.protocol.clone());
    op.amount = Some(amount);
    op.transaction = Some(tx.clone());
    ctx.recorder.record_operation(op)?;

    println!("Flash loan executed (tx {})", tx.tx_id);
    Ok(())
}

fn resource_operation(ctx: &Context, args: &ResourceOpArgs, kind: OperationType) -> Result<()> {
    // Resource type selector on the contract: 0 = bandwidth, 1 = energy.
    let resource_kind = u64::from(kind == OperationType::EnergyOperation);
    let freeze_amount = FREEZE_AMOUNT_TRX * 10u64.pow(TRX_DECIMALS);

    let tx = send_confirmed(
        ctx,
        &args.protocol,
        "freezeBalance",
        &[
            Value::from(freeze_amount),
            Value::from(FREEZE_DURATION_DAYS),
            Value::from(resource_kind),
        ],
    )?;

    let mut op = OperationRecord::new(kind, OperationStatus::Completed);
    op.protocol_address = Some(args.protocol.clone());
    op.amount = Some(args.amount.clone());
    op.transaction = Some(tx.clone());
    ctx.recorder.record_operation(op)?;

    println!("{kind} executed (tx {})", tx.tx_id);
    Ok(())
}
