pub mod chair;
pub mod config;
pub mod controller;
pub mod effects;
pub mod mapping;
pub mod output;
#[cfg(test)]
mod testing;

use crate::chair::{ChairHandle, ChairSink, NullChair};
use crate::config::{default_config_path, ensure_default_config, AppConfig, ConfigFormat};
use crate::controller::keyboard::platform_key_state;
use crate::controller::GilrsSource;
use crate::mapping::{EngineDevices, EngineError, EngineHandle};
use crate::output::gamepad::{GamepadError, GamepadSink, TracingGamepad};
use crate::output::haptic::TracingHapticSink;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Bridges joysticks, keyboard and mouse to a haptic vest, a virtual gamepad
/// and a motion chair
#[derive(Parser, Debug)]
#[command(name = "tactbridge", version, about)]
struct Cli {
    /// Configuration file (.toml or .json), defaults to the user config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    if cli.print_default {
        print!("{}", AppConfig::sample().to_text(ConfigFormat::Toml)?);
        return Ok(());
    }

    // Konfiguration laden, beim ersten Start Standarddatei anlegen
    let path = match cli.config {
        Some(path) => path,
        None => {
            let path = default_config_path()?;
            ensure_default_config(&path).await?;
            path
        }
    };
    let config = AppConfig::load(&path)
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", path.display(), e))?;

    let input = GilrsSource::create().map_err(EngineError::from)?;

    let chair: Box<dyn ChairSink> = if config.chair.enabled {
        Box::new(ChairHandle::spawn(config.chair.clone()))
    } else {
        info!("Motion chair disabled in configuration");
        Box::new(NullChair)
    };

    let devices = EngineDevices {
        input: Box::new(input),
        keys: platform_key_state(),
        haptics: Box::new(TracingHapticSink::new()),
        chair,
    };
    let open_pad = || -> Result<Box<dyn GamepadSink>, GamepadError> {
        Ok(Box::new(TracingGamepad::new()))
    };

    let mut engine = EngineHandle::start(&config, open_pad, devices)?;
    info!("Bridge running with {}, press Ctrl+C to stop", path.display());

    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");

    let stats = engine.stop().await?;
    info!(
        "Bridge stopped: {} transitions, {} actions fired",
        stats.transitions, stats.fired
    );
    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", if verbose { "debug" } else { "info" })
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
