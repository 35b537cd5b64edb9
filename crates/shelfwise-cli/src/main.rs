use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;

mod cli_args;
mod cli_command;
mod modules;

use crate::cli_args::*;
use crate::cli_command::handle_command;
use crate::modules::system::{
    client_config, ensure_secure_addr, handle_config_command, load_config, resolve_addr,
    save_config, state_path, CommandContext,
};
use shelfwise_session::{FileStorage, MemoryStorage, SessionStack, SessionStorage};
use tracing_subscriber::EnvFilter;

pub(crate) const DEFAULT_ADDR: &str = "https://127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let mut config = load_config()?;

    let command = match cli.command {
        Command::Config(args) => {
            handle_config_command(args, &mut config)?;
            save_config(&config)?;
            return Ok(());
        }
        command => command,
    };

    let addr = resolve_addr(cli.addr, &config);
    ensure_secure_addr(&addr, cli.insecure)?;

    // Every invocation is a fresh page load: durable state comes from disk,
    // session-scoped state starts empty.
    let storage = SessionStorage::new(
        Arc::new(FileStorage::new(state_path()?)),
        Arc::new(MemoryStorage::new()),
    );
    let stack = SessionStack::connect(&client_config(&addr, &config, cli.insecure), storage)?;
    let ctx = CommandContext {
        stack: &stack,
        addr: &addr,
    };

    handle_command(command, &ctx).await?;
    Ok(())
}

fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter)?)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

pub(crate) fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    if password.trim().is_empty() {
        anyhow::bail!("password is required");
    }
    Ok(password)
}
