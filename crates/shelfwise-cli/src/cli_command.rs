use crate::cli_args::*;
use crate::modules::auth::{handle_login, handle_logout, handle_register};
use crate::modules::requests::handle_get;
use crate::modules::system::{handle_status, handle_whoami, CommandContext};

pub(crate) async fn handle_command(
    command: Command,
    ctx: &CommandContext<'_>,
) -> anyhow::Result<()> {
    match command {
        Command::Login(args) => handle_login(args, ctx).await?,
        Command::Logout => handle_logout(ctx).await?,
        Command::Register(args) => handle_register(args, ctx).await?,
        Command::Whoami => handle_whoami(ctx).await?,
        Command::Status => handle_status(ctx)?,
        Command::Get(args) => handle_get(args, ctx).await?,
        Command::Config(_) => {
            unreachable!()
        }
    }

    Ok(())
}
