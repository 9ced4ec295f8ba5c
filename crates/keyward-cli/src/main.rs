use clap::Parser;
use keyward_cli::{CliArgs, KeywardCli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let cli = KeywardCli::from_args(&args)?;
    cli.run(args).await?;
    Ok(())
}
