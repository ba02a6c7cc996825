//! fleetota node entry point.
//!
//! ```text
//! fleetota-node [--config <path>] [run | pull]
//! ```

mod app;
mod config;
mod updater;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    Pull,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<(Option<PathBuf>, Command)> {
    let mut config = None;
    let mut command = Command::Run;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
                config = Some(PathBuf::from(path));
            }
            "run" => command = Command::Run,
            "pull" => command = Command::Pull,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok((config, command))
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config_path, command) = parse_args(std::env::args().skip(1))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting fleetota node");

    let config = config::Config::load(config_path.as_deref())?;
    tracing::info!(
        name = %config.name,
        image = %config.image_path.display(),
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    match command {
        Command::Run => rt.block_on(app::run(config))?,
        Command::Pull => rt.block_on(app::pull(config))?,
    }

    tracing::info!("node shut down cleanly");
    Ok(())
}
