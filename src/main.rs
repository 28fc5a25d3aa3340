use anyhow::Result;
use clap::Parser;

use deepflow_rs::cli::{self, Args};
use deepflow_rs::graph::WorkflowContext;
use deepflow_rs::logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let command = args.command.clone();
    let config = args.into_config()?;
    logging::init(config.verbose);
    config.validate()?;

    let context = WorkflowContext::new(config)?;
    cli::execute(command, &context).await
}
