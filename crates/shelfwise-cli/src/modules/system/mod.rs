mod actions;
pub(crate) mod args;
pub(crate) mod config;
pub(crate) mod types;

pub(crate) use actions::{handle_status, handle_whoami};
pub(crate) use config::{
    client_config, ensure_secure_addr, handle_config_command, load_config, resolve_addr,
    save_config, state_path,
};
pub(crate) use types::CommandContext;
