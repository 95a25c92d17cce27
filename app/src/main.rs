use clap::Parser;
use roster_app::{init_tracing, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    run(cli).await?;
    Ok(())
}
