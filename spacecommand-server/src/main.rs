//! SpaceCommand sensor server.

use spacecommand_server::{ServerArgs, ServerConfig, ServerRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfig::load(&args.config)?;

    let runner = ServerRunner::new(config, Some(&args)).await?;
    runner.run().await?;

    Ok(())
}
