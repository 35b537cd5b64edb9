use clap::Args;

#[derive(Args)]
pub struct GetArgs {
    #[arg(help = "API path, e.g. /api/items/")]
    pub path: String,
}
