//! Ledger maintenance: backups and full-document exports.

use anyhow::Result;

use super::Context;

pub fn backup(ctx: &Context) -> Result<()> {
    let path = ctx.store.backup()?;
    println!("Backup written to {}", path.display());
    Ok(())
}

pub fn export(ctx: &Context) -> Result<()> {
    let doc = ctx.store.load()?;
    let path = ctx.store.export(&doc)?;
    println!("Ledger exported to {}", path.display());
    Ok(())
}
