//! Recovery workflow: redeploy inactive protocols and replay their
//! configuration from ledger history.

use anyhow::Result;
use clap::Args;
use flashops_core::recovery::{CancelToken, RecoveryEngine, RecoveryOutcome};

use super::Context;

/// Arguments for `flashops recover`.
#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Only report which protocols are inactive; do not redeploy
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(ctx: &Context, args: &RecoverArgs) -> Result<()> {
    let engine = RecoveryEngine::new(ctx.chain.as_ref(), &ctx.store)
        .with_retry(ctx.config.retry.clone())
        .with_fee_limit(ctx.config.network.fee_limit);

    if args.dry_run {
        let doc = ctx.store.load()?;
        let inactive = engine.find_inactive(&doc);
        if inactive.is_empty() {
            println!("All protocols are reachable.");
            return Ok(());
        }
        println!("{} inactive protocol(s):", inactive.len());
        for id in inactive {
            if let Some(protocol) = doc.protocol_by_id(&id) {
                println!(
                    "  {} ({})",
                    protocol.current_address, protocol.token_data.symbol
                );
            }
        }
        return Ok(());
    }

    let report = engine.recover_all(&CancelToken::new())?;

    if report.protocols.is_empty() {
        println!("All protocols are reachable; nothing to recover.");
        return Ok(());
    }

    for recovery in &report.protocols {
        match &recovery.outcome {
            RecoveryOutcome::Recovered {
                new_address,
                results,
            } => {
                println!(
                    "{} ({}): recovered at {new_address}, {} balance(s) replayed, {} failed",
                    recovery.original_address,
                    recovery.symbol,
                    results.successful,
                    results.failed,
                );
            },
            RecoveryOutcome::DeployFailed { error } => {
                println!(
                    "{} ({}): redeploy failed: {error}",
                    recovery.original_address, recovery.symbol,
                );
            },
            RecoveryOutcome::Cancelled => {
                println!(
                    "{} ({}): cancelled before commit",
                    recovery.original_address, recovery.symbol,
                );
            },
        }
    }
    println!(
        "Recovery finished: {} recovered, {} failed{}",
        report.recovered,
        report.failed,
        if report.cancelled { ", cancelled" } else { "" },
    );
    Ok(())
}
