use clap::Parser;
use subtrack::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = cli::load_config(&cli)?;
    cli::init_logger_from(&cli, &settings)?;

    tracing::debug!(
        version = subtrack::pkg_version(),
        app = %settings.application.name,
        "Starting"
    );

    cli::execute_command(&cli, settings).await?;
    Ok(())
}
