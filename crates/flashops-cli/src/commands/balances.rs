//! Balance and resource checks, each recorded in the ledger.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use flashops_core::chain::Address;
use flashops_core::records::{OperationRecord, OperationStatus, OperationType};
use flashops_core::view;
use serde_json::Value;

use super::{Context, display_amount};

/// `flashops balances` subcommands.
#[derive(Subcommand, Debug)]
pub enum BalancesCommand {
    /// Check one account's balances on a protocol
    Check(CheckArgs),

    /// Check every known target of a protocol
    Targets(ProtocolArgs),

    /// Full protocol check: token state, limits, and virtual balances
    Full(ProtocolArgs),

    /// Check a protocol's resource holdings
    Resources(ProtocolArgs),
}

/// Arguments for `balances check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,

    /// Account to check
    #[arg(long)]
    pub address: Address,
}

/// Arguments taking just a protocol address.
#[derive(Args, Debug)]
pub struct ProtocolArgs {
    /// Protocol address
    #[arg(long)]
    pub protocol: Address,
}

pub fn run(ctx: &Context, command: &BalancesCommand) -> Result<()> {
    match command {
        BalancesCommand::Check(args) => check(ctx, args),
        BalancesCommand::Targets(args) => targets(ctx, args),
        BalancesCommand::Full(args) => full(ctx, args),
        BalancesCommand::Resources(args) => resources(ctx, args),
    }
}

fn token_decimals(ctx: &Context, protocol: &Address) -> u32 {
    ctx.store
        .load()
        .ok()
        .and_then(|doc| doc.protocol_by_address(protocol).map(|p| p.token_data.decimals))
        .unwrap_or(flashops_core::chain::TRX_DECIMALS)
}

fn print_account(ctx: &Context, protocol: &Address, address: &Address, decimals: u32) -> Result<()> {
    let target_arg = [Value::String(address.to_string())];
    let virtual_balance = ctx
        .chain
        .call_contract(protocol, "balanceOf", &target_arg)?;
    let actual_balance = ctx
        .chain
        .call_contract(protocol, "getActualBalance", &target_arg)?;

    println!("Account: {address}");
    if let Some(balance) = virtual_balance.as_str() {
        println!("  Virtual balance: {}", display_amount(balance, decimals));
    }
    if let Some(balance) = actual_balance.as_str() {
        println!("  Actual balance:  {}", display_amount(balance, decimals));
    }
    Ok(())
}

fn record_check(ctx: &Context, kind: OperationType, protocol: &Address, target: Option<&Address>) -> Result<()> {
    let mut op = OperationRecord::new(kind, OperationStatus::Completed);
    op.protocol_address = Some(protocol.clone());
    op.target_address = target.cloned();
    ctx.recorder.record_operation(op)?;
    Ok(())
}

fn check(ctx: &Context, args: &CheckArgs) -> Result<()> {
    let decimals = token_decimals(ctx, &args.protocol);
    print_account(ctx, &args.protocol, &args.address, decimals)?;
    record_check(
        ctx,
        OperationType::BalanceCheck,
        &args.protocol,
        Some(&args.address),
    )
}

fn targets(ctx: &Context, args: &ProtocolArgs) -> Result<()> {
    let doc = ctx.store.load()?;
    let snapshot = view::config_snapshot(&doc, &args.protocol);
    let decimals = token_decimals(ctx, &args.protocol);

    // Every address the ledger knows for this protocol, deduplicated:
    // whitelisted targets plus the targets of surviving grants.
    let mut addresses: Vec<Address> = snapshot
        .targets
        .iter()
        .map(|t| t.address.clone())
        .chain(snapshot.virtual_balances.iter().map(|e| e.target.clone()))
        .collect();
    addresses.sort();
    addresses.dedup();

    if addresses.is_empty() {
        println!("No targets known for {}", args.protocol);
    }
    for address in &addresses {
        print_account(ctx, &args.protocol, address, decimals)?;
    }
    record_check(ctx, OperationType::BalanceCheck, &args.protocol, None)
}

fn full(ctx: &Context, args: &ProtocolArgs) -> Result<()> {
    if !ctx.chain.probe_liveness(&args.protocol) {
        bail!("protocol {} is not reachable on chain", args.protocol);
    }

    let name = ctx.chain.call_contract(&args.protocol, "name", &[])?;
    let symbol = ctx.chain.call_contract(&args.protocol, "symbol", &[])?;
    let supply = ctx
        .chain
        .call_contract(&args.protocol, "totalSupply", &[])?;
    let decimals = token_decimals(ctx, &args.protocol);

    println!("Protocol: {}", args.protocol);
    println!("  Name:         {}", name.as_str().unwrap_or("?"));
    println!("  Symbol:       {}", symbol.as_str().unwrap_or("?"));
    if let Some(supply) = supply.as_str() {
        println!("  Total supply: {}", display_amount(supply, decimals));
    }

    let doc = ctx.store.load()?;
    let snapshot = view::config_snapshot(&doc, &args.protocol);
    if let Some(limits) = snapshot.limits {
        println!("  Limits:");
        println!(
            "    Max loan:        {} TRX",
            display_amount(&limits.max_loan_amount, flashops_core::chain::TRX_DECIMALS)
        );
        println!(
            "    Min loan:        {} TRX",
            display_amount(&limits.min_loan_amount, flashops_core::chain::TRX_DECIMALS)
        );
        println!(
            "    Max virtual:     {} TRX",
            display_amount(
                &limits.max_virtual_balance,
                flashops_core::chain::TRX_DECIMALS
            )
        );
    }
    if !snapshot.virtual_balances.is_empty() {
        println!("  Configured virtual balances:");
        for entry in &snapshot.virtual_balances {
            println!(
                "    {} = {}",
                entry.target,
                display_amount(&entry.amount, decimals)
            );
        }
    }

    record_check(ctx, OperationType::FullProtocolCheck, &args.protocol, None)
}

fn resources(ctx: &Context, args: &ProtocolArgs) -> Result<()> {
    let resources = ctx.chain.account_resources(&args.protocol)?;

    println!("Protocol: {}", args.protocol);
    println!("  Energy limit:    {}", resources.energy_limit);
    println!("  Bandwidth limit: {}", resources.bandwidth_limit);
    println!(
        "  Frozen TRX:      {}",
        display_amount(
            &resources.frozen_trx.to_string(),
            flashops_core::chain::TRX_DECIMALS
        )
    );

    record_check(ctx, OperationType::ResourcesCheck, &args.protocol, None)
}
