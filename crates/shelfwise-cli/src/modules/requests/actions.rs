use shelfwise_session::ApiRequest;

use crate::cli_args::GetArgs;
use crate::modules::system::CommandContext;

pub(crate) async fn handle_get(args: GetArgs, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
    let path = normalize_path(&args.path);
    let response = ctx.stack.client.send(&ApiRequest::get(path)).await?;
    match response.json::<serde_json::Value>() {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') || path.contains("://") {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
