use clap::{Args, Subcommand};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Set the default server address")]
    SetAddr(SetAddrArgs),
    #[command(about = "Set the request timeout in seconds")]
    SetTimeout(SetTimeoutArgs),
    #[command(about = "Print the current configuration")]
    Show,
}

#[derive(Args)]
pub struct SetAddrArgs {
    #[arg(help = "Server base URL")]
    pub addr: String,
}

#[derive(Args)]
pub struct SetTimeoutArgs {
    #[arg(help = "Timeout in seconds")]
    pub seconds: u64,
}
