//! Operation ledger inspection and export.

use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use flashops_core::chain::Address;
use flashops_core::records::{OperationRecord, OperationStatus, OperationType};
use serde_json::json;

use super::Context;

/// `flashops operations` subcommands.
#[derive(Subcommand, Debug)]
pub enum OperationsCommand {
    /// List recorded operations
    List(ListArgs),

    /// Write a timestamped JSON export of the operation log
    Export,
}

/// Filters for `operations list`.
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only operations on this protocol
    #[arg(long)]
    pub protocol: Option<Address>,

    /// Only operations of this type (e.g. CONFIGURE_VIRTUAL_BALANCE)
    #[arg(long = "type")]
    pub kind: Option<String>,

    /// Only operations with this status (pending, completed, failed)
    #[arg(long)]
    pub status: Option<String>,

    /// Only operations from the last 24 hours
    #[arg(long)]
    pub recent: bool,
}

pub fn run(ctx: &Context, command: &OperationsCommand) -> Result<()> {
    match command {
        OperationsCommand::List(args) => list(ctx, args),
        OperationsCommand::Export => export(ctx),
    }
}

/// Applies the list filters to the operation log.
fn filter<'a>(
    operations: &'a [OperationRecord],
    args: &ListArgs,
    kind: Option<OperationType>,
    status: Option<OperationStatus>,
) -> Vec<&'a OperationRecord> {
    let cutoff = Utc::now() - Duration::hours(24);
    operations
        .iter()
        .filter(|op| {
            args.protocol
                .as_ref()
                .is_none_or(|p| op.protocol_address.as_ref() == Some(p))
        })
        .filter(|op| kind.is_none_or(|k| op.kind == k))
        .filter(|op| status.is_none_or(|s| op.status == s))
        .filter(|op| !args.recent || op.timestamp >= cutoff)
        .collect()
}

fn parse_kind(raw: &str) -> Result<OperationType> {
    match serde_json::from_value(serde_json::Value::String(raw.to_uppercase())) {
        Ok(kind) => Ok(kind),
        Err(_) => bail!("unknown operation type '{raw}'"),
    }
}

fn parse_status(raw: &str) -> Result<OperationStatus> {
    match serde_json::from_value(serde_json::Value::String(raw.to_lowercase())) {
        Ok(status) => Ok(status),
        Err(_) => bail!("unknown status '{raw}' (expected pending, completed, or failed)"),
    }
}

fn list(ctx: &Context, args: &ListArgs) -> Result<()> {
    let kind = args.kind.as_deref().map(parse_kind).transpose()?;
    let status = args.status.as_deref().map(parse_status).transpose()?;

    let doc = ctx.store.load()?;
    let selected = filter(&doc.operations, args, kind, status);

    if selected.is_empty() {
        println!("No operations match.");
        return Ok(());
    }

    println!("{} operation(s):", selected.len());
    for op in selected {
        println!();
        println!("  ID:        {}", op.id);
        println!("  Type:      {}", op.kind);
        println!("  Timestamp: {}", op.timestamp.to_rfc3339());
        println!("  Status:    {}", op.status);
        if let Some(protocol) = &op.protocol_address {
            println!("  Protocol:  {protocol}");
        }
        if let Some(target) = &op.target_address {
            println!("  Target:    {target}");
        }
        if let Some(amount) = &op.amount {
            println!("  Amount:    {amount}");
        }
        if let Some(tx) = &op.transaction {
            println!("  TX:        {}", tx.tx_id);
            if let Some(usage) = &tx.usage {
                println!("  Energy:    {}", usage.energy_used);
                println!("  Bandwidth: {}", usage.bandwidth_used);
            }
        }
        if let Some(error) = &op.error {
            println!("  Error:     {error}");
        }
    }
    Ok(())
}

fn export(ctx: &Context) -> Result<()> {
    let doc = ctx.store.load()?;
    let export = json!({
        "timestamp": Utc::now(),
        "network": ctx.config.network.name,
        "totalOperations": doc.operations.len(),
        "operations": doc.operations,
    });

    let path = ctx.store.write_report("operations_export", &export)?;
    println!("Operations exported to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn op(kind: OperationType, status: OperationStatus, protocol: &str) -> OperationRecord {
        let mut op = OperationRecord::new(kind, status);
        op.protocol_address = Some(Address::unchecked(protocol));
        op
    }

    #[test]
    fn test_filter_by_protocol_and_status() {
        let operations = vec![
            op(
                OperationType::BalanceCheck,
                OperationStatus::Completed,
                "P1",
            ),
            op(OperationType::BalanceCheck, OperationStatus::Failed, "P1"),
            op(
                OperationType::BalanceCheck,
                OperationStatus::Completed,
                "P2",
            ),
        ];

        let args = ListArgs {
            protocol: Some(Address::unchecked("P1")),
            ..ListArgs::default()
        };
        let selected = filter(&operations, &args, None, Some(OperationStatus::Completed));
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_filter_by_kind() {
        let operations = vec![
            op(OperationType::Deploy, OperationStatus::Completed, "P1"),
            op(
                OperationType::ConfigureVirtualBalance,
                OperationStatus::Completed,
                "P1",
            ),
        ];

        let selected = filter(
            &operations,
            &ListArgs::default(),
            Some(OperationType::Deploy),
            None,
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind, OperationType::Deploy);
    }

    #[test]
    fn test_parse_kind_is_case_insensitive() {
        assert_eq!(
            parse_kind("configure_virtual_balance").unwrap(),
            OperationType::ConfigureVirtualBalance
        );
        assert!(parse_kind("NOT_A_TYPE").is_err());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("Completed").unwrap(), OperationStatus::Completed);
        assert!(parse_status("done").is_err());
    }
}
