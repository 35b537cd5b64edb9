use clap::{ArgAction, Parser, Subcommand};

pub use crate::modules::auth::args::*;
pub use crate::modules::requests::args::*;
pub use crate::modules::system::args::*;

#[derive(Parser)]
#[command(name = "shelfwise")]
#[command(about = "Shelfwise inventory CLI")]
pub struct Cli {
    #[arg(long, env = "SHELFWISE_ADDR")]
    pub addr: Option<String>,
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
    #[arg(long, help = "Allow http:// and invalid TLS certificates")]
    pub insecure: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "Sign in and start a session")]
    Login(LoginArgs),
    #[command(about = "End the session, locally and on the server")]
    Logout,
    #[command(about = "Create an account")]
    Register(RegisterArgs),
    #[command(about = "Resume the saved session and print the signed-in user")]
    Whoami,
    #[command(about = "Print the saved session record")]
    Status,
    #[command(about = "GET an API path through the session")]
    Get(GetArgs),
    Config(ConfigArgs),
}
