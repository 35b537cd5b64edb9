use anyhow::Context;

use super::types::CommandContext;

pub(crate) async fn handle_whoami(ctx: &CommandContext<'_>) -> anyhow::Result<()> {
    let store = &ctx.stack.store;
    store.initialise().await;
    let session = store.snapshot();
    let user = session
        .user
        .filter(|_| session.is_authenticated)
        .ok_or_else(|| anyhow::anyhow!("not logged in to {}", ctx.addr))?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub(crate) fn handle_status(ctx: &CommandContext<'_>) -> anyhow::Result<()> {
    let session = ctx.stack.store.snapshot();
    let body = serde_json::to_string_pretty(&session).context("encode session")?;
    println!("{body}");
    Ok(())
}
