mod args;
mod render;
mod repl;

use anyhow::Context;
use args::{Cli, Command};
use chrono::Utc;
use clap::Parser;
use cosmos_search_core::{CosmosSession, SearchRequest};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();

    let mut session = CosmosSession::connect(&settings).context("failed to open search session")?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        database = %settings.cosmos.database,
        "cosmos-search boot"
    );

    match cli.command {
        Command::Search { mode, index, text } => {
            let request = SearchRequest::new(mode.into(), text, index.into());
            let report = session
                .submit(request)
                .await
                .map(render::report)
                .map_err(|error| anyhow::anyhow!(error.user_message()));
            session.shutdown();
            print!("{}", report?);
        }
        Command::Interactive => {
            let outcome = repl::run(&mut session).await;
            session.shutdown();
            outcome?;
        }
    }

    Ok(())
}
