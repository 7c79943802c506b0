//! Deployed-token inspection and reporting.

use anyhow::Result;
use clap::Subcommand;
use chrono::Utc;
use flashops_core::view;
use serde_json::{Value, json};

use super::{Context, display_amount};

/// `flashops tokens` subcommands.
#[derive(Subcommand, Debug)]
pub enum TokensCommand {
    /// List every deployed token with registered and live state
    List,

    /// Write a timestamped JSON token report
    Report,
}

pub fn run(ctx: &Context, command: &TokensCommand) -> Result<()> {
    match command {
        TokensCommand::List => list(ctx),
        TokensCommand::Report => report(ctx),
    }
}

fn list(ctx: &Context) -> Result<()> {
    let doc = ctx.store.load()?;
    if doc.protocols.is_empty() {
        println!("No tokens deployed yet.");
        return Ok(());
    }

    let mut inactive = 0u32;
    for (index, protocol) in doc.protocols.iter().enumerate() {
        let token = &protocol.token_data;
        println!("Token #{}", index + 1);
        println!("  Name:      {}", token.name);
        println!("  Symbol:    {}", token.symbol);
        println!("  Decimals:  {}", token.decimals);
        println!(
            "  Supply:    {}",
            display_amount(&token.adjusted_initial_supply, token.decimals)
        );
        println!("  Address:   {}", protocol.current_address);
        println!("  Deployed:  {}", protocol.deployed_at.to_rfc3339());
        if let Some(deployer) = &protocol.deployer {
            println!("  Deployer:  {deployer}");
        }

        let live = ctx.chain.probe_liveness(&protocol.current_address);
        println!("  Active:    {}", if live { "yes" } else { "no" });
        if !live {
            inactive += 1;
        }

        if live {
            if let Ok(supply) = ctx
                .chain
                .call_contract(&protocol.current_address, "totalSupply", &[])
            {
                if let Some(supply) = supply.as_str() {
                    println!(
                        "  Live supply: {}",
                        display_amount(supply, token.decimals)
                    );
                }
            }

            let snapshot = view::config_snapshot(&doc, &protocol.current_address);
            if !snapshot.virtual_balances.is_empty() {
                println!("  Virtual balances:");
                for entry in &snapshot.virtual_balances {
                    println!(
                        "    {} = {}",
                        entry.target,
                        display_amount(&entry.amount, token.decimals)
                    );
                }
            }
            if let Some(limits) = snapshot.limits {
                println!(
                    "  Limits: max loan {} TRX, min loan {} TRX, max virtual {} TRX",
                    display_amount(&limits.max_loan_amount, flashops_core::chain::TRX_DECIMALS),
                    display_amount(&limits.min_loan_amount, flashops_core::chain::TRX_DECIMALS),
                    display_amount(
                        &limits.max_virtual_balance,
                        flashops_core::chain::TRX_DECIMALS
                    ),
                );
            }
        }

        if !protocol.redeploy_history.is_empty() {
            println!("  Redeploy history:");
            for (n, entry) in protocol.redeploy_history.iter().enumerate() {
                println!(
                    "    #{} {} -> {} ({}) successful={} failed={}",
                    n + 1,
                    entry.original_address,
                    entry.new_address,
                    entry.reason,
                    entry.recovery_results.successful,
                    entry.recovery_results.failed,
                );
            }
        }
        println!();
    }

    if inactive > 0 {
        println!("{inactive} inactive token(s); run `flashops recover` to redeploy them.");
    }
    Ok(())
}

fn report(ctx: &Context) -> Result<()> {
    let doc = ctx.store.load()?;

    let tokens: Vec<Value> = doc
        .protocols
        .iter()
        .map(|protocol| {
            let live = ctx.chain.probe_liveness(&protocol.current_address);
            let mut entry = json!({
                "registered": protocol.token_data,
                "address": protocol.current_address,
                "deployedAt": protocol.deployed_at,
                "isDeployed": live,
                "redeployHistory": protocol.redeploy_history,
            });

            if live {
                let supply = ctx
                    .chain
                    .call_contract(&protocol.current_address, "totalSupply", &[])
                    .ok();
                let resources = ctx.chain.account_resources(&protocol.current_address).ok();
                entry["current"] = json!({
                    "totalSupply": supply,
                    "resources": resources,
                });
            }
            entry
        })
        .collect();

    let report = json!({
        "timestamp": Utc::now(),
        "totalTokens": doc.protocols.len(),
        "network": ctx.config.network.name,
        "tokens": tokens,
    });

    let path = ctx.store.write_report("tokens_report", &report)?;
    println!("Token report written to {}", path.display());
    Ok(())
}
