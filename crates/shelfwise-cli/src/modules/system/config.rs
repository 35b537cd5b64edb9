use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shelfwise_session::ClientConfig;

use super::types::CliConfig;
use crate::cli_args::{ConfigArgs, ConfigCommand};
use crate::DEFAULT_ADDR;

pub(crate) fn handle_config_command(
    args: ConfigArgs,
    config: &mut CliConfig,
) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::SetAddr(args) => {
            let addr = args.addr.trim().trim_end_matches('/').to_string();
            if addr.is_empty() {
                anyhow::bail!("address must not be empty");
            }
            config.addr = Some(addr);
        }
        ConfigCommand::SetTimeout(args) => {
            if args.seconds == 0 {
                anyhow::bail!("timeout must be at least one second");
            }
            config.timeout_seconds = Some(args.seconds);
        }
        ConfigCommand::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

fn base_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(".shelfwise"))
}

fn config_path() -> anyhow::Result<PathBuf> {
    Ok(base_dir()?.join("config.json"))
}

/// Durable session state: the session record and the credential jar.
pub(crate) fn state_path() -> anyhow::Result<PathBuf> {
    Ok(base_dir()?.join("state.json"))
}

pub(crate) fn load_config() -> anyhow::Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let config = serde_json::from_str(&contents)?;
    Ok(config)
}

pub(crate) fn save_config(config: &CliConfig) -> anyhow::Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub(crate) fn resolve_addr(addr_arg: Option<String>, config: &CliConfig) -> String {
    addr_arg
        .or_else(|| config.addr.clone())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

pub(crate) fn ensure_secure_addr(addr: &str, allow_insecure: bool) -> anyhow::Result<()> {
    if addr.starts_with("http://") && !allow_insecure {
        anyhow::bail!("refusing to use http:// without --insecure");
    }
    Ok(())
}

pub(crate) fn client_config(addr: &str, config: &CliConfig, insecure: bool) -> ClientConfig {
    let mut client = ClientConfig::new(addr);
    if let Some(seconds) = config.timeout_seconds {
        client.timeout = Duration::from_secs(seconds);
    }
    client.accept_invalid_certs = insecure;
    client
}
