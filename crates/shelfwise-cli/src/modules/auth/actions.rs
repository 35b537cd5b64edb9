use shelfwise_core::{LoginCredentials, RegisterRequest};
use tracing::info;

use crate::cli_args::{LoginArgs, RegisterArgs};
use crate::modules::system::CommandContext;
use crate::prompt_password;

pub(crate) async fn handle_login(args: LoginArgs, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt_password("Password: ")?,
    };
    let mut credentials = LoginCredentials::new(args.email, password).remember(args.remember);
    if let Some(username) = args.username {
        credentials = credentials.username(username);
    }

    let session = ctx.stack.store.login(&credentials).await?;
    match session.user.as_ref().filter(|_| session.is_authenticated) {
        Some(user) => println!("Logged in as {}", user.display_name()),
        None => println!("Logged in to {}", ctx.addr),
    }
    if session.remembering {
        info!("session will be remembered");
    }
    Ok(())
}

pub(crate) async fn handle_logout(ctx: &CommandContext<'_>) -> anyhow::Result<()> {
    ctx.stack.store.logout().await;
    println!("Logged out");
    Ok(())
}

pub(crate) async fn handle_register(
    args: RegisterArgs,
    ctx: &CommandContext<'_>,
) -> anyhow::Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => prompt_password("Password: ")?,
    };
    let request = RegisterRequest::new(&args.username, &args.email, &password);
    ctx.stack.store.register(&request).await?;
    println!(
        "Registered {}; run `shelfwise login --email {}` to sign in",
        request.username, request.email
    );
    Ok(())
}
