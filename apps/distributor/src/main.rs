//! fleetota distributor entry point.
//!
//! ```text
//! fleetota-distributor [--config <path>] [serve | notify | generate [<path>] [<size>]]
//! ```

mod app;
mod config;
mod generate;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Serve,
    Notify,
    Generate {
        path: Option<PathBuf>,
        size: usize,
    },
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<(Option<PathBuf>, Command)> {
    let mut config = None;
    let mut command = Command::Serve;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
                config = Some(PathBuf::from(path));
            }
            "serve" => command = Command::Serve,
            "notify" => command = Command::Notify,
            "generate" => {
                let path = args.next().map(PathBuf::from);
                let size = match args.next() {
                    Some(s) => s
                        .parse()
                        .map_err(|_| anyhow::anyhow!("invalid image size: {s}"))?,
                    None => generate::SAMPLE_IMAGE_SIZE,
                };
                command = Command::Generate { path, size };
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok((config, command))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config_path, command) = parse_args(std::env::args().skip(1))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting fleetota distributor");

    let config = config::Config::load(config_path.as_deref())?;

    match command {
        Command::Generate { path, size } => {
            let path = path.unwrap_or_else(|| config.image_path.clone());
            let digest = generate::write_sample_image(&path, size)?;
            println!("{digest}");
        }
        Command::Notify => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::notify(&config));
        }
        Command::Serve => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(app::serve(config))?;
            tracing::info!("distributor shut down cleanly");
        }
    }
    Ok(())
}
